//! Device seam trait definitions
//!
//! Device-agnostic traits for live capture sources. Concrete backends
//! (browser media APIs, native capture, test fakes) live behind these.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::error::ClientResult;

/// Orientation of a video source relative to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// Front-facing (selfie) camera; previews are mirrored
    Front,
    /// Rear or external camera
    Back,
    /// Orientation not reported by the device
    Unknown,
}

/// A single uncompressed frame as delivered by a video track
///
/// Pixel data is tightly packed RGB8, row-major.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// A live video track handle
pub trait VideoTrack: Send {
    /// Frame dimensions, or `None` until the device starts producing frames
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Read the most recent frame, if one is available
    fn read_frame(&mut self) -> Option<RawFrame>;

    /// Read the next buffered encoded video chunk, if any
    fn read_chunk(&mut self) -> Option<Vec<u8>>;

    /// Which way the camera faces
    fn facing(&self) -> Facing;

    /// Stop the track and release the device
    fn stop(&mut self);
}

/// A live audio track handle
pub trait AudioTrack: Send {
    /// Read the next buffered encoded audio chunk, if any
    fn read_chunk(&mut self) -> Option<Vec<u8>>;

    /// Stop the track and release the device
    fn stop(&mut self);
}

/// Requested tracks and target resolution for an acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
    pub width: u32,
    pub height: u32,
}

impl MediaConstraints {
    pub fn video_only(width: u32, height: u32) -> Self {
        Self {
            video: true,
            audio: false,
            width,
            height,
        }
    }

    pub fn audio_only() -> Self {
        Self {
            video: false,
            audio: true,
            width: 0,
            height: 0,
        }
    }

    pub fn audio_video(width: u32, height: u32) -> Self {
        Self {
            video: true,
            audio: true,
            width,
            height,
        }
    }
}

/// Backend that opens device tracks
///
/// Opening is the acquisition suspension point; it fails with
/// `PermissionDenied` or `DeviceUnavailable`.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn open_video(&self, width: u32, height: u32) -> ClientResult<Box<dyn VideoTrack>>;

    async fn open_audio(&self) -> ClientResult<Box<dyn AudioTrack>>;
}
