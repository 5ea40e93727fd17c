//! Chunked media segments
//!
//! A segment accumulates the encoded chunks the recording primitive emits
//! between a start and a stop event. Closing concatenates them into one
//! immutable, mime-tagged blob. A segment is never uploaded before it is
//! closed.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Cadence at which the recording primitive delivers chunks
pub const CHUNK_INTERVAL: Duration = Duration::from_secs(1);

/// Kind of media a segment carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn mime(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio/webm",
            MediaKind::Video => "video/webm",
        }
    }
}

/// An immutable concatenated media blob
#[derive(Debug, Clone)]
pub struct MediaBlob {
    pub data: Vec<u8>,
    pub mime: &'static str,
}

/// Result of closing a segment
///
/// `Empty` signals that no chunks arrived, so callers can skip the upload
/// instead of sending a zero-length blob.
#[derive(Debug)]
pub enum ClosedSegment {
    Blob(MediaBlob),
    Empty,
}

/// An open segment accumulating chunks
#[derive(Debug)]
pub struct SegmentHandle {
    kind: MediaKind,
    chunks: Vec<Vec<u8>>,
    opened_at: DateTime<Utc>,
}

impl SegmentHandle {
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Append one encoded chunk. Order of arrival is preserved.
    pub fn append_chunk(&mut self, chunk: Vec<u8>) {
        self.chunks.push(chunk);
    }

    /// Close the segment, concatenating all chunks collected so far
    pub fn close(self) -> ClosedSegment {
        if self.chunks.is_empty() {
            return ClosedSegment::Empty;
        }

        let total: usize = self.chunks.iter().map(Vec::len).sum();
        let mut data = Vec::with_capacity(total);
        for chunk in self.chunks {
            data.extend_from_slice(&chunk);
        }

        tracing::debug!(
            "Closed {:?} segment: {} bytes",
            self.kind,
            data.len()
        );

        ClosedSegment::Blob(MediaBlob {
            data,
            mime: self.kind.mime(),
        })
    }
}

/// Open a new segment for the given media kind
pub fn begin_segment(kind: MediaKind) -> SegmentHandle {
    SegmentHandle {
        kind,
        chunks: Vec::new(),
        opened_at: Utc::now(),
    }
}
