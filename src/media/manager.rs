//! Media session acquisition and release
//!
//! MediaResourceManager is the only component allowed to start or stop
//! device tracks. Everything else borrows them for at most one operation.

use std::sync::Arc;

use uuid::Uuid;

use super::traits::{AudioTrack, MediaBackend, MediaConstraints, VideoTrack};
use crate::utils::error::{ClientError, ClientResult};

/// A live camera/microphone session
///
/// Owns zero-or-one video track and zero-or-one audio track. Tracks are
/// stopped on explicit release and again (harmlessly) on drop, so the
/// device indicator never stays lit after teardown.
pub struct MediaSession {
    id: Uuid,
    active: bool,
    video: Option<Box<dyn VideoTrack>>,
    audio: Option<Box<dyn AudioTrack>>,
}

impl MediaSession {
    pub(crate) fn new(video: Option<Box<dyn VideoTrack>>, audio: Option<Box<dyn AudioTrack>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            active: true,
            video,
            audio,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Video track, if the session is active and has one
    pub fn video_track(&mut self) -> Option<&mut (dyn VideoTrack + 'static)> {
        if !self.active {
            return None;
        }
        self.video.as_deref_mut()
    }

    /// Audio track, if the session is active and has one
    pub fn audio_track(&mut self) -> Option<&mut (dyn AudioTrack + 'static)> {
        if !self.active {
            return None;
        }
        self.audio.as_deref_mut()
    }

    /// Stop all tracks. Idempotent.
    pub(crate) fn close(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        if let Some(mut track) = self.video.take() {
            track.stop();
        }
        if let Some(mut track) = self.audio.take() {
            track.stop();
        }

        tracing::debug!("Media session {} released", self.id);
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Acquires and releases camera/microphone sessions
pub struct MediaResourceManager {
    backend: Arc<dyn MediaBackend>,
}

impl MediaResourceManager {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }

    /// Acquire a session for the requested tracks
    ///
    /// Fails with `PermissionDenied` or `DeviceUnavailable`; the caller is
    /// responsible for surfacing that to the user. A partially opened
    /// session is torn down before the error is returned.
    pub async fn acquire(&self, constraints: &MediaConstraints) -> ClientResult<MediaSession> {
        if !constraints.video && !constraints.audio {
            return Err(ClientError::DeviceUnavailable(
                "no tracks requested".to_string(),
            ));
        }

        let video = if constraints.video {
            Some(
                self.backend
                    .open_video(constraints.width, constraints.height)
                    .await?,
            )
        } else {
            None
        };

        let audio = if constraints.audio {
            match self.backend.open_audio().await {
                Ok(track) => Some(track),
                Err(err) => {
                    // Don't leak the camera when the microphone fails
                    if let Some(mut track) = video {
                        track.stop();
                    }
                    return Err(err);
                }
            }
        } else {
            None
        };

        let session = MediaSession::new(video, audio);
        tracing::info!(
            "Acquired media session {} (video: {}, audio: {})",
            session.id(),
            constraints.video,
            constraints.audio
        );
        Ok(session)
    }

    /// Release a session, stopping its tracks
    ///
    /// Releasing an already-released session is a no-op, never an error.
    pub fn release(&self, session: &mut MediaSession) {
        session.close();
    }
}
