//! ReflectAI client runtime
//!
//! Client-resident capture and emotion-analysis runtime: acquires camera
//! and microphone sessions, drives the discrete recording lifecycle,
//! polls the inference service on a fixed cadence with overlap prevention,
//! and normalizes the service's inconsistent response shapes into one
//! canonical result.

pub mod capture;
pub mod client;
pub mod config;
pub mod media;
pub mod onboarding;
pub mod recorder;
pub mod scheduler;
pub mod transcript;
pub mod upload;
pub mod utils;

pub use client::ReflectClient;
pub use config::{ClientConfig, FeatureFlags};
pub use utils::error::{ClientError, ClientResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for embedding applications
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reflect_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
