//! Upload pipeline
//!
//! Packages frame/audio/video payloads, performs the multipart network
//! call, and returns the raw JSON response. No retries happen here: the
//! scheduler substitutes a fallback, the recording flow surfaces the error.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::capture::frame::CaptureFrame;
use crate::capture::segment::MediaBlob;
use crate::onboarding::OnboardingConfig;
use crate::utils::error::{ClientError, ClientResult};

/// Fixed timeout for the combined frame+audio flow
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// What a single analyze round-trip carries
#[derive(Debug)]
pub struct AnalyzePayload {
    pub frame: Option<CaptureFrame>,
    pub audio: Option<MediaBlob>,
    pub user_id: String,
}

impl AnalyzePayload {
    pub fn frame_only(frame: CaptureFrame, user_id: String) -> Self {
        Self {
            frame: Some(frame),
            audio: None,
            user_id,
        }
    }
}

/// Transport seam for everything that talks to the analysis service
///
/// The recorder and scheduler depend on this trait so tests can drive them
/// against in-memory fakes.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// POST `/api/analyze`, multipart. One round-trip, no retries.
    async fn analyze(&self, payload: AnalyzePayload) -> ClientResult<Value>;

    /// POST `/api/upload-video`, multipart.
    async fn upload_video(&self, video: MediaBlob, timestamp: DateTime<Utc>) -> ClientResult<Value>;

    /// POST `/api/onboarding/config`, JSON body.
    async fn submit_config(&self, config: &OnboardingConfig) -> ClientResult<()>;
}

/// Concrete HTTP pipeline against the remote inference service
pub struct UploadPipeline {
    client: reqwest::Client,
    base_url: String,
}

impl UploadPipeline {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_multipart(&self, path: &str, form: Form) -> ClientResult<Value> {
        let response = self
            .client
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
            });
        }

        let raw = response
            .json::<Value>()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(raw)
    }
}

#[async_trait]
impl Uploader for UploadPipeline {
    async fn analyze(&self, payload: AnalyzePayload) -> ClientResult<Value> {
        let mut form = Form::new().text("user_id", payload.user_id);

        if let Some(frame) = payload.frame {
            let part = Part::bytes(frame.jpeg)
                .file_name("frame.jpg")
                .mime_str("image/jpeg")
                .map_err(|e| ClientError::Network(e.to_string()))?;
            form = form.part("frame", part);
        }

        if let Some(audio) = payload.audio {
            let part = Part::bytes(audio.data)
                .file_name("audio.webm")
                .mime_str(audio.mime)
                .map_err(|e| ClientError::Network(e.to_string()))?;
            form = form.part("audio", part);
        }

        self.post_multipart("/api/analyze", form).await
    }

    async fn upload_video(&self, video: MediaBlob, timestamp: DateTime<Utc>) -> ClientResult<Value> {
        let part = Part::bytes(video.data)
            .file_name("video.webm")
            .mime_str(video.mime)
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let form = Form::new()
            .part("video", part)
            .text("timestamp", timestamp.to_rfc3339());

        self.post_multipart("/api/upload-video", form).await
    }

    async fn submit_config(&self, config: &OnboardingConfig) -> ClientResult<()> {
        let response = self
            .client
            .post(self.url("/api/onboarding/config"))
            .json(config)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
