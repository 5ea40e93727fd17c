//! Upload pipeline and response normalization
//!
//! One network round-trip per payload, multipart-encoded, with the
//! heterogeneous server response absorbed by the normalizer.

pub mod normalize;
pub mod pipeline;

pub use normalize::{extract_reply, extract_video_analysis, normalize_analysis, AnalysisResult};
pub use pipeline::{AnalyzePayload, UploadPipeline, Uploader};
