//! Media device layer
//!
//! This module owns camera and microphone handles:
//! - Device-agnostic traits for video/audio tracks (`traits`)
//! - MediaResourceManager for acquiring and releasing sessions (`manager`)

pub mod manager;
pub mod traits;

pub use manager::{MediaResourceManager, MediaSession};
pub use traits::{AudioTrack, Facing, MediaBackend, MediaConstraints, RawFrame, VideoTrack};
