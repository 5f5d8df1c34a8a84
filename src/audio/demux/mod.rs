//! Demux layer: incremental WebM parsing into raw Opus packets.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut demuxer = Demuxer::new();
//! demuxer.push(&chunk);
//! match demuxer.feed(|meta, packet| sink.send(meta.timecode, packet))? {
//!     FeedStatus::WouldBlock => { /* wait for the next chunk */ }
//!     FeedStatus::Completed => { /* whole stream parsed */ }
//! }
//! ```

pub mod callback;
pub mod ebml;
pub mod parser;
#[cfg(any(test, feature = "test-support"))]
#[doc(hidden)]
pub mod test_support;

pub use callback::{Callback, FrameMeta, StreamCallback, StreamState, TrackEntry};
pub use parser::{FeedStatus, WebmParser};

use crate::{
    audio::reader::{ChunkedReader, Reader},
    common::errors::DemuxError,
};

/// Byte buffer, parser and track state for one queue entry's stream.
#[derive(Debug, Default)]
pub struct Demuxer {
    reader: ChunkedReader,
    parser: WebmParser,
    stream: StreamState,
}

impl Demuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.reader.push(chunk);
    }

    pub fn mark_complete(&mut self) {
        self.reader.mark_complete();
    }

    /// Parse everything buffered so far, handing each Opus packet of the
    /// accepted track to `on_packet`.
    pub fn feed<F>(&mut self, on_packet: F) -> Result<FeedStatus, DemuxError>
    where
        F: FnMut(&FrameMeta, &[u8]),
    {
        let mut callback = StreamCallback::new(&mut self.stream, on_packet);
        self.parser.feed(&mut callback, &mut self.reader)
    }

    /// Drop all buffered bytes and parse state, ready for a new stream.
    pub fn reset(&mut self) {
        self.reader = ChunkedReader::new();
        self.parser.did_seek();
        self.stream = StreamState::default();
    }

    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    pub fn buffered(&self) -> usize {
        self.reader.buffered()
    }

    /// Packets delivered since the last reset.
    pub fn frames(&self) -> u64 {
        self.stream.frames
    }

    pub fn accepted_track(&self) -> Option<u64> {
        self.stream.accepted_track
    }
}
