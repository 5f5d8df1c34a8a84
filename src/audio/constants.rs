//! Central constants for the audio pipeline.
//!
//! Magic numbers used across `src/audio/**`, the transports and the player
//! live here so they stay consistent.

// ── Accepted stream ──────────────────────────────────────────────────────────

/// Matroska codec id of the only codec the pipeline forwards.
pub const REQUIRED_CODEC_ID: &str = "A_OPUS";

/// Only 48 kHz tracks are accepted (Hz).
pub const REQUIRED_SAMPLE_RATE: u32 = 48_000;

/// Playback clock of one Opus frame as produced by YouTube (ms).
pub const FRAME_DURATION_MS: u64 = 20;

// ── Demuxer limits ───────────────────────────────────────────────────────────

/// Largest `SimpleBlock` / `Block` the parser buffers whole (16 MB).
pub const MAX_BLOCK_SIZE: u64 = 16 * 1_024 * 1_024;

/// Largest scalar or string element the parser buffers whole.
pub const MAX_VALUE_SIZE: u64 = 4_096;

// ── Transports ───────────────────────────────────────────────────────────────

/// Stream chunks smaller than this are coalesced before being emitted as
/// `Data` events (64 KB).
pub const DATA_EVENT_COALESCE: usize = 64 * 1_024;

/// Maximum times a single range or segment request is retried.
pub const MAX_FETCH_RETRIES: usize = 3;

/// Milliseconds to wait between retries, multiplied by the attempt number.
pub const RETRY_BACKOFF_MS: u64 = 250;

/// Most segments a DASH `SegmentTimeline` may expand to across all of its
/// `S` entries. Ten hours of 2-second segments fit comfortably.
pub const MAX_TIMELINE_SEGMENTS: usize = 100_000;
