//! Push-in / pull-out byte buffer between the network and the WebM parser.
//!
//! Transport adapters `push` chunks of whatever size the network hands them;
//! the parser pulls exact element-sized spans with `read` / `skip`. A pull
//! that cannot be satisfied yet consumes nothing and reports
//! [`ReadStatus::WouldBlock`], so the parser can simply retry after the next
//! push.

use bytes::{Buf, BytesMut};

/// Outcome of a [`Reader::read`] or [`Reader::skip`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Exactly the requested amount was consumed.
    CompletedOk,
    /// The stream is complete and fewer bytes than requested remained; all of
    /// them were consumed.
    PartialOk,
    /// Not enough bytes buffered yet. Nothing was consumed.
    WouldBlock,
    /// The stream is complete and fully consumed.
    EndOfStream,
}

impl ReadStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, Self::CompletedOk | Self::PartialOk)
    }
}

/// Pull side of a byte stream, as seen by the demuxer.
pub trait Reader {
    /// Fill all of `buf`, or report why not.
    fn read(&mut self, buf: &mut [u8]) -> (usize, ReadStatus);

    /// Discard `n` bytes, with the same blocking rules as `read`.
    fn skip(&mut self, n: u64) -> (u64, ReadStatus);

    /// Total bytes consumed since the reader was created.
    fn position(&self) -> u64;

    /// Bytes that can be consumed right now without blocking.
    fn available(&self) -> u64;

    /// Whether the producer has announced that no more bytes will arrive.
    fn is_complete(&self) -> bool;
}

/// Append-only buffer fed by transport chunks.
///
/// The buffered region is always a suffix of what was pushed since the
/// reader was created; consumption only moves forward. Replace the reader
/// with a fresh one to start over.
#[derive(Debug, Default)]
pub struct ChunkedReader {
    data: BytesMut,
    pos: u64,
    complete: bool,
}

impl ChunkedReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk delivered by the producer.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.complete {
            tracing::warn!(
                "ChunkedReader: dropping {} bytes pushed after completion",
                chunk.len()
            );
            return;
        }
        self.data.extend_from_slice(chunk);
    }

    /// The producer will not push anything else.
    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    /// Bytes currently buffered and not yet consumed.
    pub fn buffered(&self) -> usize {
        self.data.len()
    }

    /// Shared admission check for `read` and `skip`: how many bytes a request
    /// for `wanted` bytes may consume, or the status to return instead.
    fn admit(&self, wanted: u64) -> Result<u64, ReadStatus> {
        let remaining = self.data.len() as u64;
        if remaining == 0 {
            return Err(if self.complete {
                ReadStatus::EndOfStream
            } else {
                ReadStatus::WouldBlock
            });
        }
        if wanted > remaining {
            if !self.complete {
                return Err(ReadStatus::WouldBlock);
            }
            return Ok(remaining);
        }
        Ok(wanted)
    }
}

impl Reader for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> (usize, ReadStatus) {
        if buf.is_empty() {
            return (0, ReadStatus::CompletedOk);
        }

        let n = match self.admit(buf.len() as u64) {
            Ok(n) => n as usize,
            Err(status) => return (0, status),
        };

        self.data.copy_to_slice(&mut buf[..n]);
        self.pos += n as u64;

        if n == buf.len() {
            (n, ReadStatus::CompletedOk)
        } else {
            (n, ReadStatus::PartialOk)
        }
    }

    fn skip(&mut self, n: u64) -> (u64, ReadStatus) {
        if n == 0 {
            return (0, ReadStatus::CompletedOk);
        }

        let skipped = match self.admit(n) {
            Ok(k) => k,
            Err(status) => return (0, status),
        };

        self.data.advance(skipped as usize);
        self.pos += skipped;

        if skipped == n {
            (skipped, ReadStatus::CompletedOk)
        } else {
            (skipped, ReadStatus::PartialOk)
        }
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn available(&self) -> u64 {
        self.data.len() as u64
    }

    fn is_complete(&self) -> bool {
        self.complete
    }
}
