//! Error types and handling
//!
//! Common error types used across the runtime.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Runtime-wide error type
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned HTTP {status}")]
    Http { status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Recording error: {0}")]
    Recording(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => ClientError::Http {
                status: status.as_u16(),
            },
            None => ClientError::Network(error.to_string()),
        }
    }
}

/// Error response for the UI layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<ClientError> for ErrorResponse {
    fn from(error: ClientError) -> Self {
        let code = match &error {
            ClientError::PermissionDenied(_) => "PERMISSION_DENIED",
            ClientError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            ClientError::Network(_) => "NETWORK_ERROR",
            ClientError::Http { .. } => "HTTP_ERROR",
            ClientError::Io(_) => "IO_ERROR",
            ClientError::Serialization(_) => "SERIALIZATION_ERROR",
            ClientError::Recording(_) => "RECORDING_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using ClientError
pub type ClientResult<T> = Result<T, ClientError>;
