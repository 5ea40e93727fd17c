//! Client runtime facade
//!
//! Wires the media manager, recorder, scheduler, pipeline and store into
//! one configurable core. The UI layer talks to this and nothing below it.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::capture::segment::CHUNK_INTERVAL;
use crate::config::ClientConfig;
use crate::media::traits::MediaConstraints;
use crate::media::{MediaResourceManager, MediaBackend, MediaSession};
use crate::onboarding::{complete_onboarding, OnboardingConfig, OnboardingStore, RawAnswers};
use crate::recorder::machine::{arm_auto_stop, RecordingEvent, RecordingStateMachine, AUTO_STOP_DELAY};
use crate::recorder::state::RecordingState;
use crate::scheduler::AnalysisScheduler;
use crate::transcript::{local_reply, Transcript};
use crate::upload::normalize::AnalysisResult;
use crate::upload::pipeline::{UploadPipeline, Uploader};
use crate::utils::error::{ClientError, ClientResult};

/// The client-resident runtime
pub struct ReflectClient {
    config: ClientConfig,
    manager: MediaResourceManager,
    uploader: Arc<dyn Uploader>,
    scheduler: AnalysisScheduler,
    recorder: Arc<tokio::sync::Mutex<RecordingStateMachine>>,
    store: OnboardingStore,
    transcript: Transcript,
    session: Option<Arc<Mutex<MediaSession>>>,
    chunk_pump: Option<JoinHandle<()>>,
}

impl ReflectClient {
    /// Build a client against the real HTTP pipeline
    pub fn new(config: ClientConfig, backend: Arc<dyn MediaBackend>) -> ClientResult<Self> {
        let uploader: Arc<dyn Uploader> = Arc::new(UploadPipeline::new(&config.base_url)?);
        Ok(Self::with_uploader(config, backend, uploader))
    }

    /// Build a client with a custom transport (used by tests and embedders)
    pub fn with_uploader(
        config: ClientConfig,
        backend: Arc<dyn MediaBackend>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        let scheduler = AnalysisScheduler::new(uploader.clone(), &config.user_id);
        let auto_stop = config.auto_stop.then_some(AUTO_STOP_DELAY);
        let recorder = Arc::new(tokio::sync::Mutex::new(RecordingStateMachine::new(
            uploader.clone(),
            config.features,
            &config.user_id,
            auto_stop,
        )));
        let store = OnboardingStore::new(&config.storage_dir);

        Self {
            manager: MediaResourceManager::new(backend),
            uploader,
            scheduler,
            recorder,
            store,
            transcript: Transcript::default(),
            session: None,
            chunk_pump: None,
            config,
        }
    }

    /// Acquire devices and start the enabled background features
    ///
    /// Surfacing a `PermissionDenied`/`DeviceUnavailable` error to the user
    /// is the caller's job; no devices are left open on failure.
    pub async fn start_session(&mut self) -> ClientResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let constraints = MediaConstraints {
            video: self.config.features.needs_video(),
            audio: self.config.features.audio,
            width: self.config.width,
            height: self.config.height,
        };
        let session = Arc::new(Mutex::new(self.manager.acquire(&constraints).await?));

        if self.config.features.polling {
            self.scheduler.start_polling(Arc::clone(&session));
        }

        self.session = Some(session);
        Ok(())
    }

    /// Stop polling, abort any open recording, and release all devices
    ///
    /// Safe to call repeatedly and from teardown paths.
    pub async fn stop_session(&mut self) {
        self.scheduler.stop_polling();

        if let Some(pump) = self.chunk_pump.take() {
            pump.abort();
        }

        if let Some(session) = self.session.take() {
            let mut recorder = self.recorder.lock().await;
            if recorder.state() != RecordingState::Idle {
                if let Err(err) = recorder.stop().await {
                    tracing::warn!("Final recording upload failed during teardown: {}", err);
                }
            }
            drop(recorder);

            let mut guard = session.lock();
            self.manager.release(&mut guard);
        }
    }

    /// Start a recording session; returns `false` if one is already open
    pub async fn start_recording(&mut self) -> ClientResult<bool> {
        let Some(session) = &self.session else {
            return Err(ClientError::Recording(
                "no active media session".to_string(),
            ));
        };

        let mut recorder = self.recorder.lock().await;
        let started = recorder.start(Arc::clone(session))?;
        if !started {
            return Ok(false);
        }

        if let Some(delay) = recorder.auto_stop_after() {
            let handle = arm_auto_stop(&self.recorder, delay, recorder.epoch());
            recorder.set_auto_stop_handle(handle);
        }
        drop(recorder);

        self.chunk_pump = Some(spawn_chunk_pump(Arc::clone(&self.recorder)));
        Ok(true)
    }

    /// Stop the recording and upload its payload
    ///
    /// The extracted reply (or the local fallback) is appended to the
    /// transcript. Upload failures are surfaced; the machine is back to
    /// Idle either way.
    pub async fn stop_recording(&mut self) -> ClientResult<Option<String>> {
        if let Some(pump) = self.chunk_pump.take() {
            pump.abort();
        }

        let mut recorder = self.recorder.lock().await;
        let was_recording = recorder.state() == RecordingState::Recording;
        let reply = recorder.stop().await?;
        drop(recorder);

        if was_recording {
            let text = match &reply {
                Some(text) => text.clone(),
                None => {
                    let emotion = self
                        .scheduler
                        .latest()
                        .map(|r| r.emotion)
                        .unwrap_or_default();
                    local_reply(&emotion).to_string()
                }
            };
            self.transcript.push_assistant(&text);
            return Ok(Some(text));
        }

        Ok(reply)
    }

    /// Trigger one live-feedback sample outside the timer
    pub async fn force_sample(&self) -> Option<AnalysisResult> {
        match self.scheduler.force_sample().await {
            crate::scheduler::SampleOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }

    /// Run the onboarding answer mapping and persistence flow
    pub async fn complete_onboarding(&self, raw: RawAnswers) -> OnboardingConfig {
        complete_onboarding(raw, &self.store, self.uploader.clone()).await
    }

    /// Whether onboarding should be shown
    pub fn needs_onboarding(&self) -> bool {
        self.store.needs_onboarding()
    }

    pub fn scheduler(&self) -> &AnalysisScheduler {
        &self.scheduler
    }

    pub fn transcript(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    /// Subscribe to recording lifecycle events
    pub async fn recording_events(&self) -> broadcast::Receiver<RecordingEvent> {
        self.recorder.lock().await.subscribe()
    }

    pub async fn recording_state(&self) -> RecordingState {
        self.recorder.lock().await.state()
    }
}

impl Drop for ReflectClient {
    fn drop(&mut self) {
        // Abnormal teardown must still stop device tracks; MediaSession's
        // own Drop handles the actual track stop.
        self.scheduler.stop_polling();
        if let Some(pump) = self.chunk_pump.take() {
            pump.abort();
        }
        if let Some(session) = self.session.take() {
            let mut guard = session.lock();
            self.manager.release(&mut guard);
        }
    }
}

/// Drain encoded chunks from the live tracks into the open segments on the
/// recording primitive's cadence. Self-terminating once the machine leaves
/// the Recording state.
fn spawn_chunk_pump(recorder: Arc<tokio::sync::Mutex<RecordingStateMachine>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CHUNK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let mut machine = recorder.lock().await;
            if machine.state() != RecordingState::Recording {
                break;
            }
            machine.pump_chunks();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::segment::MediaBlob;
    use crate::config::FeatureFlags;
    use crate::media::traits::{AudioTrack, Facing, RawFrame, VideoTrack};
    use crate::upload::pipeline::AnalyzePayload;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    struct LoopVideoTrack;

    impl VideoTrack for LoopVideoTrack {
        fn dimensions(&self) -> Option<(u32, u32)> {
            Some((4, 4))
        }

        fn read_frame(&mut self) -> Option<RawFrame> {
            Some(RawFrame {
                width: 4,
                height: 4,
                rgb: vec![60; 48],
            })
        }

        fn read_chunk(&mut self) -> Option<Vec<u8>> {
            None
        }

        fn facing(&self) -> Facing {
            Facing::Front
        }

        fn stop(&mut self) {}
    }

    struct LoopAudioTrack {
        remaining: usize,
    }

    impl AudioTrack for LoopAudioTrack {
        fn read_chunk(&mut self) -> Option<Vec<u8>> {
            if self.remaining == 0 {
                return None;
            }
            self.remaining -= 1;
            Some(vec![0x5A; 16])
        }

        fn stop(&mut self) {}
    }

    struct LoopBackend;

    #[async_trait]
    impl crate::media::traits::MediaBackend for LoopBackend {
        async fn open_video(
            &self,
            _width: u32,
            _height: u32,
        ) -> ClientResult<Box<dyn VideoTrack>> {
            Ok(Box::new(LoopVideoTrack))
        }

        async fn open_audio(&self) -> ClientResult<Box<dyn AudioTrack>> {
            Ok(Box::new(LoopAudioTrack { remaining: 4 }))
        }
    }

    struct CountingUploader {
        analyze_calls: AtomicUsize,
    }

    #[async_trait]
    impl Uploader for CountingUploader {
        async fn analyze(&self, _payload: AnalyzePayload) -> ClientResult<Value> {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "emotion": "happy", "therapist_reply": "Keep going!" }))
        }

        async fn upload_video(
            &self,
            _video: MediaBlob,
            _timestamp: chrono::DateTime<chrono::Utc>,
        ) -> ClientResult<Value> {
            Ok(json!({}))
        }

        async fn submit_config(&self, _config: &OnboardingConfig) -> ClientResult<()> {
            Ok(())
        }
    }

    fn test_client(features: FeatureFlags, dir: &std::path::Path) -> (ReflectClient, Arc<CountingUploader>) {
        let uploader = Arc::new(CountingUploader {
            analyze_calls: AtomicUsize::new(0),
        });
        let mut config = ClientConfig::new("http://localhost:8000", "user-1", dir.to_path_buf());
        config.features = features;
        let client = ReflectClient::with_uploader(config, Arc::new(LoopBackend), uploader.clone());
        (client, uploader)
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_stop_appends_reply() {
        let dir = tempdir().unwrap();
        let (mut client, uploader) = test_client(FeatureFlags::audio_only(), dir.path());

        client.start_session().await.unwrap();
        assert!(client.start_recording().await.unwrap());

        // Let the chunk pump collect a couple of chunks
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let reply = client.stop_recording().await.unwrap();
        assert_eq!(reply.as_deref(), Some("Keep going!"));
        assert_eq!(uploader.analyze_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.transcript().messages().len(), 1);
        assert_eq!(client.recording_state().await, RecordingState::Idle);

        client.stop_session().await;
    }

    #[tokio::test]
    async fn test_start_recording_without_session_errors() {
        let dir = tempdir().unwrap();
        let (mut client, _) = test_client(FeatureFlags::audio_only(), dir.path());

        let result = client.start_recording().await;
        assert!(matches!(result, Err(ClientError::Recording(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_fills_history() {
        let dir = tempdir().unwrap();
        let (mut client, uploader) = test_client(FeatureFlags::live_feedback(), dir.path());

        client.start_session().await.unwrap();
        tokio::time::sleep(Duration::from_secs(7)).await;
        client.stop_session().await;

        assert!(uploader.analyze_calls.load(Ordering::SeqCst) >= 2);
        let history = client.scheduler().history();
        assert!(!history.is_empty());
        assert!(history.iter().all(|r| r.emotion == "happy"));
    }

    #[tokio::test]
    async fn test_stop_session_is_idempotent() {
        let dir = tempdir().unwrap();
        let (mut client, _) = test_client(FeatureFlags::live_feedback(), dir.path());

        client.start_session().await.unwrap();
        client.stop_session().await;
        client.stop_session().await;
    }

    #[tokio::test]
    async fn test_onboarding_flow_persists() {
        let dir = tempdir().unwrap();
        let (client, _) = test_client(FeatureFlags::audio_only(), dir.path());

        assert!(client.needs_onboarding());

        let mut raw = RawAnswers::new();
        raw.insert("q1".to_string(), "Manage stress".to_string());
        let config = client.complete_onboarding(raw).await;

        assert_eq!(config.mode, "stress_management");
        assert!(!client.needs_onboarding());
    }
}
