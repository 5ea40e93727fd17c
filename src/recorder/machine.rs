//! Recording state machine
//!
//! Drives the idle -> recording -> stopping -> uploading lifecycle for a
//! capture session. stop() fully closes segments before the upload begins,
//! invokes the pipeline exactly once, and returns to Idle whether the
//! upload succeeds or fails.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::state::{RecordingSession, RecordingState};
use crate::capture::frame::{capture_frame, FrameCapture};
use crate::capture::segment::{ClosedSegment, MediaBlob, MediaKind};
use crate::config::FeatureFlags;
use crate::media::MediaSession;
use crate::upload::normalize::{extract_reply, extract_video_analysis};
use crate::upload::pipeline::{AnalyzePayload, Uploader};
use crate::utils::error::{ClientError, ClientResult};

/// Delay before the auto-stop timer fires
pub const AUTO_STOP_DELAY: Duration = Duration::from_secs(3);

/// Events emitted during the recording lifecycle
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// A recording session opened
    Started,
    /// The session closed; segments are flushed
    Stopped,
    /// Upload finished, carrying the extracted reply if any
    Uploaded(Option<String>),
    /// Capture start or upload failed
    Error(String),
}

/// Governs the discrete recording lifecycle
///
/// At most one RecordingSession is open at any time. Misuse is a no-op:
/// start() while not Idle returns `false`, stop() while not Recording
/// returns `None` without touching the pipeline.
pub struct RecordingStateMachine {
    state: RecordingState,
    session_seq: usize,
    /// Bumped on every start and stop; a pending auto-stop timer armed for
    /// an older epoch does nothing when it fires
    epoch: u64,
    session: Option<RecordingSession>,
    media: Option<Arc<Mutex<MediaSession>>>,
    auto_stop: Option<JoinHandle<()>>,
    auto_stop_after: Option<Duration>,
    uploader: Arc<dyn Uploader>,
    features: FeatureFlags,
    user_id: String,
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingStateMachine {
    pub fn new(
        uploader: Arc<dyn Uploader>,
        features: FeatureFlags,
        user_id: &str,
        auto_stop_after: Option<Duration>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            state: RecordingState::Idle,
            session_seq: 0,
            epoch: 0,
            session: None,
            media: None,
            auto_stop: None,
            auto_stop_after,
            uploader,
            features,
            user_id: user_id.to_string(),
            event_tx,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn auto_stop_after(&self) -> Option<Duration> {
        self.auto_stop_after
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// Store the handle of the armed auto-stop timer
    pub fn set_auto_stop_handle(&mut self, handle: JoinHandle<()>) {
        self.auto_stop = Some(handle);
    }

    /// Start a new recording session
    ///
    /// Returns `Ok(false)` when a session is already open. Requires an
    /// active media session; an inactive one is the Idle -> Error -> Idle
    /// path.
    pub fn start(&mut self, media: Arc<Mutex<MediaSession>>) -> ClientResult<bool> {
        if self.state != RecordingState::Idle {
            tracing::debug!("start() ignored while {:?}", self.state);
            return Ok(false);
        }

        if !media.lock().is_active() {
            self.state = RecordingState::Error;
            let _ = self
                .event_tx
                .send(RecordingEvent::Error("media session is not active".to_string()));
            self.state = RecordingState::Idle;
            return Err(ClientError::Recording(
                "media session is not active".to_string(),
            ));
        }

        self.epoch += 1;
        let index = self.session_seq;
        self.session_seq += 1;
        self.session = Some(RecordingSession::new(
            index,
            self.features.audio,
            self.features.video,
        ));
        self.media = Some(media);
        self.state = RecordingState::Recording;
        let _ = self.event_tx.send(RecordingEvent::Started);

        tracing::info!("Recording session {} started", index);
        Ok(true)
    }

    /// Drain buffered chunks from the live tracks into the open segments
    ///
    /// Does nothing outside the Recording state, so chunks arriving after
    /// stop() are never included.
    pub fn pump_chunks(&mut self) {
        if self.state != RecordingState::Recording {
            return;
        }
        let Some(media) = self.media.clone() else {
            return;
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let mut guard = media.lock();
        if let Some(track) = guard.audio_track() {
            while let Some(chunk) = track.read_chunk() {
                session.append_chunk(MediaKind::Audio, chunk);
            }
        }
        if let Some(track) = guard.video_track() {
            while let Some(chunk) = track.read_chunk() {
                session.append_chunk(MediaKind::Video, chunk);
            }
        }
    }

    /// Stop the current session and upload its payload
    ///
    /// No-op while Idle. Cancels a pending auto-stop timer so it cannot
    /// double-stop.
    pub async fn stop(&mut self) -> ClientResult<Option<String>> {
        if let Some(handle) = self.auto_stop.take() {
            handle.abort();
        }
        self.stop_inner().await
    }

    /// Entry point for the auto-stop timer
    ///
    /// Ignored when the epoch moved on (manual stop or a newer session) or
    /// the machine is no longer recording.
    pub(crate) async fn auto_stop(&mut self, epoch: u64) {
        if self.epoch != epoch || self.state != RecordingState::Recording {
            return;
        }
        // This task's own handle; drop without abort
        self.auto_stop = None;
        tracing::debug!("Auto-stop timer fired");
        if let Err(err) = self.stop_inner().await {
            tracing::warn!("Auto-stop upload failed: {}", err);
        }
    }

    async fn stop_inner(&mut self) -> ClientResult<Option<String>> {
        if self.state != RecordingState::Recording {
            tracing::debug!("stop() ignored while {:?}", self.state);
            return Ok(None);
        }

        self.state = RecordingState::Stopping;
        self.epoch += 1;

        let session = self.session.take();
        let media = self.media.take();

        let (audio, video) = match session {
            Some(session) => {
                tracing::info!(
                    "Stopping recording session {} ({} chunks)",
                    session.index(),
                    session.chunk_count()
                );
                session.close()
            }
            None => (None, None),
        };
        let audio = audio.and_then(blob_of);
        let video = video.and_then(blob_of);

        // The analyze flow sends a still frame captured at stop time
        let frame = if video.is_none() {
            media.and_then(|media| {
                let mut guard = media.lock();
                match capture_frame(&mut guard) {
                    FrameCapture::Frame(frame) => Some(frame),
                    FrameCapture::Empty => None,
                }
            })
        } else {
            None
        };

        if audio.is_none() && video.is_none() && frame.is_none() {
            // Nothing captured; skip the upload cycle
            self.state = RecordingState::Idle;
            let _ = self.event_tx.send(RecordingEvent::Stopped);
            return Ok(None);
        }

        self.state = RecordingState::Uploading;
        let _ = self.event_tx.send(RecordingEvent::Stopped);

        let result = match video {
            Some(blob) => self
                .uploader
                .upload_video(blob, Utc::now())
                .await
                .map(|raw| extract_video_analysis(&raw)),
            None => self
                .uploader
                .analyze(AnalyzePayload {
                    frame,
                    audio,
                    user_id: self.user_id.clone(),
                })
                .await
                .map(|raw| extract_reply(&raw)),
        };

        // Back to Idle regardless of outcome; the next start() is a fresh
        // attempt
        self.state = RecordingState::Idle;

        match result {
            Ok(reply) => {
                let _ = self.event_tx.send(RecordingEvent::Uploaded(reply.clone()));
                Ok(reply)
            }
            Err(err) => {
                let _ = self.event_tx.send(RecordingEvent::Error(err.to_string()));
                Err(err)
            }
        }
    }
}

fn blob_of(segment: ClosedSegment) -> Option<MediaBlob> {
    match segment {
        ClosedSegment::Blob(blob) => Some(blob),
        ClosedSegment::Empty => None,
    }
}

/// Arm the fixed-duration auto-stop timer
///
/// The spawned task re-checks the machine's epoch under the lock, so a
/// manual stop() or a newer session makes the timer a no-op.
pub fn arm_auto_stop(
    machine: &Arc<tokio::sync::Mutex<RecordingStateMachine>>,
    delay: Duration,
    epoch: u64,
) -> JoinHandle<()> {
    let machine = Arc::clone(machine);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let mut guard = machine.lock().await;
        guard.auto_stop(epoch).await;
    })
}
