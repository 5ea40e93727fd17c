//! Runtime configuration
//!
//! One configurable core replaces the per-variant capture/analysis flows:
//! which media kinds are recorded and whether background polling runs are
//! feature flags, not separate implementations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which capture/analysis features are enabled
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    /// Record video segments during a capture session
    pub video: bool,
    /// Record audio segments during a capture session
    pub audio: bool,
    /// Run the periodic live emotion poll
    pub polling: bool,
}

impl FeatureFlags {
    /// Audio-only recording, no live feedback
    pub fn audio_only() -> Self {
        Self {
            video: false,
            audio: true,
            polling: false,
        }
    }

    /// Combined audio+video recording
    pub fn audio_video() -> Self {
        Self {
            video: true,
            audio: true,
            polling: false,
        }
    }

    /// Audio recording with live emotion polling
    pub fn live_feedback() -> Self {
        Self {
            video: false,
            audio: true,
            polling: true,
        }
    }

    /// Whether a video track is needed (recording or frame polling)
    pub fn needs_video(&self) -> bool {
        self.video || self.polling
    }
}

/// Client runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Base URL of the inference service, e.g. `http://localhost:8000`
    pub base_url: String,
    /// Identifier sent with every analyze request
    pub user_id: String,
    /// Directory for the local key/value store
    pub storage_dir: PathBuf,
    /// Enabled capture/analysis features
    pub features: FeatureFlags,
    /// Target capture resolution
    pub width: u32,
    pub height: u32,
    /// Schedule stop() automatically after a fixed delay
    pub auto_stop: bool,
}

impl ClientConfig {
    pub fn new(base_url: &str, user_id: &str, storage_dir: PathBuf) -> Self {
        Self {
            base_url: base_url.to_string(),
            user_id: user_id.to_string(),
            storage_dir,
            features: FeatureFlags::live_feedback(),
            width: 640,
            height: 480,
            auto_stop: false,
        }
    }
}
