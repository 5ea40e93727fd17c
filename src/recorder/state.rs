//! Recording state management
//!
//! Defines the recording lifecycle states and per-session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::segment::{begin_segment, ClosedSegment, MediaKind, SegmentHandle};

/// Current state of the recording lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    Idle,
    /// Currently recording
    Recording,
    /// Closing segments and flushing buffered chunks
    Stopping,
    /// Upload in flight
    Uploading,
    /// Capture start failed; transient, resolves back to Idle
    Error,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

/// A single capture session between start() and stop()
///
/// At most one is open at a time. Owns the open audio/video segments and a
/// monotonically increasing chunk counter.
#[derive(Debug)]
pub struct RecordingSession {
    index: usize,
    started_at: DateTime<Utc>,
    chunk_count: u64,
    audio: Option<SegmentHandle>,
    video: Option<SegmentHandle>,
}

impl RecordingSession {
    /// Create a new session, opening segments for the enabled media kinds
    pub fn new(index: usize, record_audio: bool, record_video: bool) -> Self {
        Self {
            index,
            started_at: Utc::now(),
            chunk_count: 0,
            audio: record_audio.then(|| begin_segment(MediaKind::Audio)),
            video: record_video.then(|| begin_segment(MediaKind::Video)),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    /// Route one encoded chunk into the matching open segment
    pub fn append_chunk(&mut self, kind: MediaKind, chunk: Vec<u8>) {
        let segment = match kind {
            MediaKind::Audio => self.audio.as_mut(),
            MediaKind::Video => self.video.as_mut(),
        };
        if let Some(segment) = segment {
            segment.append_chunk(chunk);
            self.chunk_count += 1;
        }
    }

    /// Close all open segments, consuming the session
    pub fn close(self) -> (Option<ClosedSegment>, Option<ClosedSegment>) {
        (
            self.audio.map(SegmentHandle::close),
            self.video.map(SegmentHandle::close),
        )
    }
}
