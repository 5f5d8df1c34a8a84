//! EBML primitives: element ids, variable-length integers and value decoding.

use crate::common::errors::DemuxError;

// EBML header
pub const EBML: u32 = 0x1A45_DFA3;
pub const DOC_TYPE: u32 = 0x4282;

// Top level
pub const SEGMENT: u32 = 0x1853_8067;

// Segment children
pub const SEEK_HEAD: u32 = 0x114D_9B74;
pub const INFO: u32 = 0x1549_A966;
pub const TRACKS: u32 = 0x1654_AE6B;
pub const CLUSTER: u32 = 0x1F43_B675;
pub const CUES: u32 = 0x1C53_BB6B;
pub const TAGS: u32 = 0x1254_C367;
pub const CHAPTERS: u32 = 0x1043_A770;
pub const ATTACHMENTS: u32 = 0x1941_A469;

// Tracks
pub const TRACK_ENTRY: u32 = 0xAE;
pub const TRACK_NUMBER: u32 = 0xD7;
pub const TRACK_TYPE: u32 = 0x83;
pub const CODEC_ID: u32 = 0x86;
pub const AUDIO: u32 = 0xE1;
pub const SAMPLING_FREQUENCY: u32 = 0xB5;
pub const CHANNELS: u32 = 0x9F;

// Cluster
pub const TIMECODE: u32 = 0xE7;
pub const SIMPLE_BLOCK: u32 = 0xA3;
pub const BLOCK_GROUP: u32 = 0xA0;
pub const BLOCK: u32 = 0xA1;

// Global
pub const VOID: u32 = 0xEC;
pub const CRC32: u32 = 0xBF;

/// `TrackType` value for audio tracks.
pub const TRACK_TYPE_AUDIO: u64 = 2;

/// Longest encoded element id, in bytes.
pub const MAX_ID_LEN: usize = 4;
/// Longest encoded element size, in bytes.
pub const MAX_SIZE_LEN: usize = 8;

/// Nesting level of the master elements the parser knows about.
///
/// Used to close unknown-sized masters: an element at the same or a shallower
/// level than the open master cannot be its child.
pub fn level(id: u32) -> Option<u8> {
    match id {
        EBML | SEGMENT => Some(0),
        SEEK_HEAD | INFO | TRACKS | CLUSTER | CUES | TAGS | CHAPTERS | ATTACHMENTS => Some(1),
        TRACK_ENTRY | SIMPLE_BLOCK | BLOCK_GROUP | TIMECODE => Some(2),
        _ => None,
    }
}

/// Encoded length of a vint, from its first byte. `None` for `0x00`.
pub fn vint_len(first: u8) -> Option<usize> {
    if first == 0 {
        None
    } else {
        Some(first.leading_zeros() as usize + 1)
    }
}

/// Element id: the raw bytes including the length marker.
pub fn decode_id(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

/// Clears the length marker and the bits before it. An 8-byte vint keeps
/// nothing of its first byte.
fn marker_mask(len: usize) -> u8 {
    (0xFFu16 >> len) as u8
}

/// Element data size with the length marker removed. `None` means the
/// "unknown size" sentinel (all value bits set).
pub fn decode_size(bytes: &[u8]) -> Option<u64> {
    let len = bytes.len();
    let mask = marker_mask(len);
    let mut value = (bytes[0] & mask) as u64;
    for &b in &bytes[1..] {
        value = (value << 8) | b as u64;
    }
    let all_ones = (1u64 << (7 * len)) - 1;
    if value == all_ones { None } else { Some(value) }
}

/// Reads an unsigned vint (marker removed) from the start of `buf`.
/// Returns the value and the number of bytes it occupied.
pub fn read_vint(buf: &[u8]) -> Result<(u64, usize), DemuxError> {
    let first = *buf.first().ok_or(DemuxError::Malformed("missing vint"))?;
    let len = vint_len(first).ok_or(DemuxError::Malformed("invalid vint"))?;
    if buf.len() < len {
        return Err(DemuxError::Malformed("vint overruns block"));
    }
    let mask = marker_mask(len);
    let mut value = (first & mask) as u64;
    for &b in &buf[1..len] {
        value = (value << 8) | b as u64;
    }
    Ok((value, len))
}

/// Signed vint as used by EBML lacing: the raw value shifted by half its range.
pub fn read_signed_vint(buf: &[u8]) -> Result<(i64, usize), DemuxError> {
    let (raw, len) = read_vint(buf)?;
    let bias = (1i64 << (7 * len - 1)) - 1;
    Ok((raw as i64 - bias, len))
}

pub fn read_uint(data: &[u8]) -> Result<u64, DemuxError> {
    if data.len() > 8 {
        return Err(DemuxError::Malformed("unsigned integer longer than 8 bytes"));
    }
    Ok(data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

pub fn read_float(data: &[u8]) -> Result<f64, DemuxError> {
    match data.len() {
        0 => Ok(0.0),
        4 => Ok(f32::from_be_bytes([data[0], data[1], data[2], data[3]]) as f64),
        8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(data);
            Ok(f64::from_be_bytes(raw))
        }
        _ => Err(DemuxError::Malformed("float must be 0, 4 or 8 bytes")),
    }
}

/// ASCII/UTF-8 string value, with trailing NUL padding removed.
pub fn read_string(data: &[u8]) -> String {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&data[..end]).into_owned()
}
