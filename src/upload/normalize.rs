//! Response normalization
//!
//! The analysis endpoint's response shape evolved across integration points
//! without a versioned contract: `emotion` may be a string, an object, or
//! absent, and the reply may be a string or an error object. This module is
//! the single place that absorbs that drift; nothing downstream ever sees
//! raw untyped data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Confidence assumed when the server does not report one
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Emotion assumed when the server does not report one
pub const DEFAULT_EMOTION: &str = "neutral";

/// User-safe text substituted when the server flags a reply error
pub const REPLY_ERROR_FALLBACK: &str =
    "I'm sorry, I couldn't quite process that. Could you try again?";

/// Canonical analysis outcome
///
/// Always has a defined emotion; never null once an attempt completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub emotion: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant_emotion: Option<String>,
}

impl AnalysisResult {
    pub fn fallback(emotion: &str) -> Self {
        Self {
            emotion: emotion.to_string(),
            confidence: DEFAULT_CONFIDENCE,
            dominant_emotion: None,
        }
    }
}

/// Normalize a raw `/api/analyze` response into an AnalysisResult
///
/// Rules, in order:
/// 1. string `emotion` is used directly (the legacy endpoint reports no
///    confidence, so the default applies)
/// 2. object `emotion` prefers `dominant_emotion`, then `emotion`, then
///    `label`; confidence comes from the object itself
/// 3. anything else resolves to the defaults
pub fn normalize_analysis(raw: &Value) -> AnalysisResult {
    match raw.get("emotion") {
        Some(Value::String(emotion)) => AnalysisResult {
            emotion: emotion.clone(),
            confidence: DEFAULT_CONFIDENCE,
            dominant_emotion: None,
        },
        Some(Value::Object(emotion)) => {
            let dominant = emotion
                .get("dominant_emotion")
                .and_then(Value::as_str)
                .map(str::to_string);
            let label = dominant
                .clone()
                .or_else(|| emotion.get("emotion").and_then(Value::as_str).map(str::to_string))
                .or_else(|| emotion.get("label").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| DEFAULT_EMOTION.to_string());
            let confidence = emotion
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_CONFIDENCE)
                .clamp(0.0, 1.0);

            AnalysisResult {
                emotion: label,
                confidence,
                dominant_emotion: dominant,
            }
        }
        _ => AnalysisResult {
            emotion: DEFAULT_EMOTION.to_string(),
            confidence: DEFAULT_CONFIDENCE,
            dominant_emotion: None,
        },
    }
}

/// Extract the reply text from a raw analyze/upload response
///
/// Checks `therapist_reply`, then `reply`. A string is used verbatim; an
/// object with an `error` flag maps to a fixed apology; an object with
/// `text` uses that text; any other object is serialized as a last resort.
/// Returns `None` when the response carries no reply at all.
pub fn extract_reply(raw: &Value) -> Option<String> {
    let reply = raw.get("therapist_reply").or_else(|| raw.get("reply"))?;

    match reply {
        Value::String(text) => Some(text.clone()),
        Value::Object(fields) => {
            if fields.contains_key("error") {
                return Some(REPLY_ERROR_FALLBACK.to_string());
            }
            if let Some(text) = fields.get("text").and_then(Value::as_str) {
                return Some(text.to_string());
            }
            Some(reply.to_string())
        }
        other => Some(other.to_string()),
    }
}

/// Extract the analysis text from an `/api/upload-video` response
pub fn extract_video_analysis(raw: &Value) -> Option<String> {
    raw.pointer("/analysis/response")
        .and_then(Value::as_str)
        .map(str::to_string)
}
