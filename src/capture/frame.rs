//! Still-frame capture
//!
//! Snapshots a single frame from the live video track and encodes it as
//! JPEG. Lossy at a fixed quality to bound upload size for frequent polling.

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::media::traits::{Facing, RawFrame};
use crate::media::MediaSession;

/// JPEG quality factor for snapshot frames (0.8)
pub const JPEG_QUALITY: u8 = 80;

/// An immutable encoded still frame
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

/// Outcome of a snapshot attempt
///
/// `Empty` is a sentinel, not an error: the track exists but has no usable
/// frame yet, so callers skip the cycle.
#[derive(Debug, Clone)]
pub enum FrameCapture {
    Frame(CaptureFrame),
    Empty,
}

impl FrameCapture {
    pub fn is_empty(&self) -> bool {
        matches!(self, FrameCapture::Empty)
    }
}

/// Capture one still frame from the session's video track
///
/// Returns `Empty` when there is no active video track, when the track has
/// not reported dimensions yet, or when no frame is buffered. Front-facing
/// sources are mirrored horizontally to match the preview the user sees.
pub fn capture_frame(session: &mut MediaSession) -> FrameCapture {
    let Some(track) = session.video_track() else {
        return FrameCapture::Empty;
    };

    if track.dimensions().is_none() {
        return FrameCapture::Empty;
    }

    let facing = track.facing();
    let Some(mut raw) = track.read_frame() else {
        return FrameCapture::Empty;
    };

    if facing == Facing::Front {
        mirror_horizontal(&mut raw);
    }

    match encode_jpeg(&raw) {
        Ok(jpeg) => FrameCapture::Frame(CaptureFrame {
            jpeg,
            width: raw.width,
            height: raw.height,
            captured_at: Utc::now(),
        }),
        Err(err) => {
            tracing::warn!("Frame encoding failed, skipping cycle: {}", err);
            FrameCapture::Empty
        }
    }
}

/// Flip an RGB8 frame left-to-right in place
pub(crate) fn mirror_horizontal(frame: &mut RawFrame) {
    if frame.width == 0 {
        return;
    }
    let row_bytes = frame.width as usize * 3;
    for row in frame.rgb.chunks_exact_mut(row_bytes) {
        let mut left = 0;
        let mut right = frame.width as usize - 1;
        while left < right {
            for channel in 0..3 {
                row.swap(left * 3 + channel, right * 3 + channel);
            }
            left += 1;
            right -= 1;
        }
    }
}

fn encode_jpeg(frame: &RawFrame) -> image::ImageResult<Vec<u8>> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode(
        &frame.rgb,
        frame.width,
        frame.height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(jpeg)
}
