//! Background analysis scheduler
//!
//! Samples the live video track on a fixed cadence for continuous emotion
//! feedback, independent of explicit user recording. A single boolean
//! in-flight guard keeps at most one analyze request outstanding: a tick
//! that finds the guard set is dropped, not queued. That skip is the
//! intended backpressure mechanism.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::capture::frame::{capture_frame, FrameCapture};
use crate::media::MediaSession;
use crate::upload::normalize::{normalize_analysis, AnalysisResult};
use crate::upload::pipeline::{AnalyzePayload, Uploader};

/// Fixed polling cadence
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Bounded history capacity
pub const HISTORY_CAPACITY: usize = 10;

/// Locally synthesized results used when the service is unreachable, so
/// the live-feedback display never stalls
const FALLBACK_EMOTIONS: &[&str] = &["neutral", "calm", "focused"];

/// Outcome of one sampling attempt
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// A result (real or fallback) was appended to the history
    Completed(AnalysisResult),
    /// A previous sample is still outstanding; nothing was done
    InFlight,
    /// The video track produced no usable frame; cycle skipped
    EmptyFrame,
    /// No media session is bound
    NoSession,
    /// Polling was stopped while the request was outstanding; the late
    /// response was discarded
    Stale,
}

/// Fixed-capacity FIFO of analysis results
///
/// Append-only from the caller's perspective; evicts the oldest entry past
/// capacity and never reorders.
#[derive(Debug, Default)]
pub struct EmotionHistory {
    entries: VecDeque<AnalysisResult>,
}

impl EmotionHistory {
    pub fn push(&mut self, result: AnalysisResult) {
        if self.entries.len() == HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&AnalysisResult> {
        self.entries.back()
    }

    pub fn snapshot(&self) -> Vec<AnalysisResult> {
        self.entries.iter().cloned().collect()
    }
}

struct SchedulerInner {
    uploader: Arc<dyn Uploader>,
    user_id: String,
    session: Mutex<Option<Arc<Mutex<MediaSession>>>>,
    /// The in-flight guard: the sole concurrency primitive here
    in_flight: AtomicBool,
    /// Bumped by stop_polling(); samples completing against an older
    /// generation discard their result instead of applying it
    generation: AtomicU64,
    /// Monotonic count of completed detections, for observability
    detections: AtomicU64,
    history: Mutex<EmotionHistory>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

/// Periodic background sampler with overlap prevention
#[derive(Clone)]
pub struct AnalysisScheduler {
    inner: Arc<SchedulerInner>,
}

impl AnalysisScheduler {
    pub fn new(uploader: Arc<dyn Uploader>, user_id: &str) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                uploader,
                user_id: user_id.to_string(),
                session: Mutex::new(None),
                in_flight: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                detections: AtomicU64::new(0),
                history: Mutex::new(EmotionHistory::default()),
                poll_task: Mutex::new(None),
            }),
        }
    }

    /// Bind the media session sampled by subsequent ticks
    pub fn bind(&self, session: Arc<Mutex<MediaSession>>) {
        *self.inner.session.lock() = Some(session);
    }

    /// Arm the repeating poll timer
    ///
    /// Does nothing if polling is already active. Missed ticks are skipped,
    /// never queued.
    pub fn start_polling(&self, session: Arc<Mutex<MediaSession>>) {
        let mut task_slot = self.inner.poll_task.lock();
        if task_slot.is_some() {
            tracing::debug!("start_polling() ignored; poll already active");
            return;
        }

        self.bind(session);

        let scheduler = self.clone();
        *task_slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                scheduler.sample_once().await;
            }
        }));

        tracing::info!("Emotion polling started ({:?} cadence)", POLL_INTERVAL);
    }

    /// Cancel the poll timer and clear the guard
    ///
    /// Safe to call when no poll is active. A response still in flight for
    /// this session is discarded when it lands.
    pub fn stop_polling(&self) {
        if let Some(task) = self.inner.poll_task.lock().take() {
            task.abort();
            tracing::info!("Emotion polling stopped");
        }
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.in_flight.store(false, Ordering::SeqCst);
        *self.inner.session.lock() = None;
    }

    /// Sample immediately, bypassing the timer
    ///
    /// Still respects the in-flight guard: never produces two overlapping
    /// server calls.
    pub async fn force_sample(&self) -> SampleOutcome {
        self.sample_once().await
    }

    /// One sampling cycle: guard check, frame capture, upload, normalize,
    /// append
    pub async fn sample_once(&self) -> SampleOutcome {
        let inner = &self.inner;

        if inner.in_flight.swap(true, Ordering::SeqCst) {
            tracing::trace!("Tick skipped; analysis still in flight");
            return SampleOutcome::InFlight;
        }

        let generation = inner.generation.load(Ordering::SeqCst);

        let Some(session) = inner.session.lock().clone() else {
            inner.in_flight.store(false, Ordering::SeqCst);
            return SampleOutcome::NoSession;
        };

        let frame = {
            let mut guard = session.lock();
            capture_frame(&mut guard)
        };
        let FrameCapture::Frame(frame) = frame else {
            inner.in_flight.store(false, Ordering::SeqCst);
            return SampleOutcome::EmptyFrame;
        };

        let payload = AnalyzePayload::frame_only(frame, inner.user_id.clone());
        let result = match inner.uploader.analyze(payload).await {
            Ok(raw) => normalize_analysis(&raw),
            Err(err) => {
                tracing::debug!("Analyze failed, substituting fallback: {}", err);
                self.fallback_result()
            }
        };

        if inner.generation.load(Ordering::SeqCst) != generation {
            // Polling stopped while we were in flight; the session state is
            // stale and the result must not be applied
            inner.in_flight.store(false, Ordering::SeqCst);
            return SampleOutcome::Stale;
        }

        inner.history.lock().push(result.clone());
        inner.detections.fetch_add(1, Ordering::SeqCst);
        inner.in_flight.store(false, Ordering::SeqCst);

        SampleOutcome::Completed(result)
    }

    /// Number of completed detections since construction
    pub fn detections(&self) -> u64 {
        self.inner.detections.load(Ordering::SeqCst)
    }

    /// Copy of the bounded result history, oldest first
    pub fn history(&self) -> Vec<AnalysisResult> {
        self.inner.history.lock().snapshot()
    }

    /// Most recent result, if any
    pub fn latest(&self) -> Option<AnalysisResult> {
        self.inner.history.lock().latest().cloned()
    }

    fn fallback_result(&self) -> AnalysisResult {
        let index = self.inner.detections.load(Ordering::SeqCst) as usize % FALLBACK_EMOTIONS.len();
        AnalysisResult::fallback(FALLBACK_EMOTIONS[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::traits::{Facing, RawFrame, VideoTrack};
    use crate::utils::error::{ClientError, ClientResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;

    struct SteadyVideoTrack;

    impl VideoTrack for SteadyVideoTrack {
        fn dimensions(&self) -> Option<(u32, u32)> {
            Some((4, 4))
        }

        fn read_frame(&mut self) -> Option<RawFrame> {
            Some(RawFrame {
                width: 4,
                height: 4,
                rgb: vec![10; 48],
            })
        }

        fn read_chunk(&mut self) -> Option<Vec<u8>> {
            None
        }

        fn facing(&self) -> Facing {
            Facing::Back
        }

        fn stop(&mut self) {}
    }

    struct BlankVideoTrack;

    impl VideoTrack for BlankVideoTrack {
        fn dimensions(&self) -> Option<(u32, u32)> {
            None
        }

        fn read_frame(&mut self) -> Option<RawFrame> {
            None
        }

        fn read_chunk(&mut self) -> Option<Vec<u8>> {
            None
        }

        fn facing(&self) -> Facing {
            Facing::Unknown
        }

        fn stop(&mut self) {}
    }

    fn video_session(track: Box<dyn VideoTrack>) -> Arc<Mutex<MediaSession>> {
        Arc::new(Mutex::new(MediaSession::new(Some(track), None)))
    }

    /// Uploader that holds each request open for a fixed virtual duration
    /// and tracks how many are pending at once.
    struct SlowUploader {
        delay: Duration,
        pending: AtomicUsize,
        max_pending: AtomicUsize,
        emotion: &'static str,
    }

    impl SlowUploader {
        fn new(delay: Duration, emotion: &'static str) -> Arc<Self> {
            Arc::new(Self {
                delay,
                pending: AtomicUsize::new(0),
                max_pending: AtomicUsize::new(0),
                emotion,
            })
        }
    }

    #[async_trait]
    impl Uploader for SlowUploader {
        async fn analyze(&self, _payload: AnalyzePayload) -> ClientResult<Value> {
            let now = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_pending.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.pending.fetch_sub(1, Ordering::SeqCst);
            Ok(json!({ "emotion": self.emotion }))
        }

        async fn upload_video(
            &self,
            _video: crate::capture::segment::MediaBlob,
            _timestamp: chrono::DateTime<chrono::Utc>,
        ) -> ClientResult<Value> {
            unreachable!("scheduler never uploads video")
        }

        async fn submit_config(
            &self,
            _config: &crate::onboarding::OnboardingConfig,
        ) -> ClientResult<()> {
            Ok(())
        }
    }

    struct FailingUploader;

    #[async_trait]
    impl Uploader for FailingUploader {
        async fn analyze(&self, _payload: AnalyzePayload) -> ClientResult<Value> {
            Err(ClientError::Network("unreachable".to_string()))
        }

        async fn upload_video(
            &self,
            _video: crate::capture::segment::MediaBlob,
            _timestamp: chrono::DateTime<chrono::Utc>,
        ) -> ClientResult<Value> {
            unreachable!()
        }

        async fn submit_config(
            &self,
            _config: &crate::onboarding::OnboardingConfig,
        ) -> ClientResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_history_evicts_oldest_past_capacity() {
        let mut history = EmotionHistory::default();
        for i in 0..11 {
            history.push(AnalysisResult::fallback(&format!("e{}", i)));
        }
        assert_eq!(history.len(), 10);
        let snapshot = history.snapshot();
        assert_eq!(snapshot[0].emotion, "e1");
        assert_eq!(snapshot[9].emotion, "e10");
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_request_in_flight() {
        // Each request takes 5s against a 2s cadence; overlapping ticks
        // must be dropped, never stacked.
        let uploader = SlowUploader::new(Duration::from_secs(5), "happy");
        let scheduler = AnalysisScheduler::new(uploader.clone(), "user-1");

        scheduler.start_polling(video_session(Box::new(SteadyVideoTrack)));
        tokio::time::sleep(Duration::from_secs(21)).await;
        scheduler.stop_polling();

        assert_eq!(uploader.max_pending.load(Ordering::SeqCst), 1);
        assert!(scheduler.detections() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_sample_respects_guard() {
        let uploader = SlowUploader::new(Duration::from_secs(5), "happy");
        let scheduler = AnalysisScheduler::new(uploader.clone(), "user-1");
        scheduler.bind(video_session(Box::new(SteadyVideoTrack)));

        let background = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.sample_once().await })
        };
        // Let the background sample set the guard
        tokio::time::sleep(Duration::from_secs(1)).await;

        let outcome = scheduler.force_sample().await;
        assert_eq!(outcome, SampleOutcome::InFlight);

        let first = background.await.unwrap();
        assert!(matches!(first, SampleOutcome::Completed(_)));
        assert_eq!(uploader.max_pending.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_frame_skips_cycle() {
        let uploader = SlowUploader::new(Duration::from_millis(1), "happy");
        let scheduler = AnalysisScheduler::new(uploader, "user-1");
        scheduler.bind(video_session(Box::new(BlankVideoTrack)));

        let outcome = scheduler.sample_once().await;
        assert_eq!(outcome, SampleOutcome::EmptyFrame);
        assert!(scheduler.history().is_empty());
        assert_eq!(scheduler.detections(), 0);

        // Guard must be released so the next tick can try again
        let outcome = scheduler.sample_once().await;
        assert_eq!(outcome, SampleOutcome::EmptyFrame);
    }

    #[tokio::test]
    async fn test_network_failure_substitutes_fallback() {
        let scheduler = AnalysisScheduler::new(Arc::new(FailingUploader), "user-1");
        scheduler.bind(video_session(Box::new(SteadyVideoTrack)));

        let outcome = scheduler.sample_once().await;
        let SampleOutcome::Completed(result) = outcome else {
            panic!("expected a fallback result");
        };
        assert!(FALLBACK_EMOTIONS.contains(&result.emotion.as_str()));
        assert_eq!(scheduler.detections(), 1);

        // And the guard was released
        let outcome = scheduler.sample_once().await;
        assert!(matches!(outcome, SampleOutcome::Completed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_discarded_after_stop() {
        let uploader = SlowUploader::new(Duration::from_secs(5), "happy");
        let scheduler = AnalysisScheduler::new(uploader, "user-1");
        scheduler.bind(video_session(Box::new(SteadyVideoTrack)));

        let sample = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.sample_once().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        scheduler.stop_polling();

        let outcome = sample.await.unwrap();
        assert_eq!(outcome, SampleOutcome::Stale);
        assert!(scheduler.history().is_empty());
        assert_eq!(scheduler.detections(), 0);
    }

    #[tokio::test]
    async fn test_stop_polling_without_poll_is_safe() {
        let uploader = SlowUploader::new(Duration::from_millis(1), "happy");
        let scheduler = AnalysisScheduler::new(uploader, "user-1");
        scheduler.stop_polling();
        scheduler.stop_polling();
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_order_preserved_under_polling() {
        let uploader = SlowUploader::new(Duration::from_millis(10), "happy");
        let scheduler = AnalysisScheduler::new(uploader, "user-1");

        scheduler.start_polling(video_session(Box::new(SteadyVideoTrack)));
        tokio::time::sleep(Duration::from_secs(30)).await;
        scheduler.stop_polling();

        let history = scheduler.history();
        assert!(history.len() <= HISTORY_CAPACITY);
        assert!(history.iter().all(|r| r.emotion == "happy"));
    }
}
