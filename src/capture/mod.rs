//! Capture codec
//!
//! Turns live tracks into transferable payloads:
//! - Still-frame snapshots encoded as JPEG (`frame`)
//! - Chunked audio/video segments closed into immutable blobs (`segment`)

pub mod frame;
pub mod segment;

pub use frame::{capture_frame, CaptureFrame, FrameCapture};
pub use segment::{begin_segment, ClosedSegment, MediaBlob, MediaKind, SegmentHandle};
