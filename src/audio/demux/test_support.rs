//! Minimal WebM writer for building fixtures in tests.

use crate::audio::demux::ebml::*;

fn id_bytes(id: u32) -> Vec<u8> {
    let raw = id.to_be_bytes();
    let skip = raw.iter().take_while(|&&b| b == 0).count();
    raw[skip..].to_vec()
}

fn size_bytes(size: u64) -> Vec<u8> {
    let len = (1..=8)
        .find(|&len| size < (1u64 << (7 * len)) - 1)
        .unwrap_or(8);
    let marked = size | (1u64 << (7 * len));
    marked.to_be_bytes()[8 - len..].to_vec()
}

pub fn element(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = id_bytes(id);
    out.extend(size_bytes(payload.len() as u64));
    out.extend_from_slice(payload);
    out
}

/// Element with its size written as an 8-byte vint, the way libwebm writes
/// Segment and Cluster sizes.
pub fn wide_element(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = id_bytes(id);
    out.push(0x01);
    out.extend_from_slice(&(payload.len() as u64).to_be_bytes()[1..]);
    out.extend_from_slice(payload);
    out
}

/// Element whose size field is the unknown-size sentinel.
pub fn unknown_size(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = id_bytes(id);
    out.push(0xFF);
    out.extend_from_slice(payload);
    out
}

pub fn uint(id: u32, value: u64) -> Vec<u8> {
    let raw = value.to_be_bytes();
    let skip = raw.iter().take_while(|&&b| b == 0).count().min(7);
    element(id, &raw[skip..])
}

pub fn float(id: u32, value: f64) -> Vec<u8> {
    element(id, &value.to_be_bytes())
}

pub fn string(id: u32, value: &str) -> Vec<u8> {
    element(id, value.as_bytes())
}

pub fn ebml_header(doc_type: &str) -> Vec<u8> {
    let mut body = uint(0x4286, 1); // EBMLVersion
    body.extend(string(DOC_TYPE, doc_type));
    element(EBML, &body)
}

pub fn audio_track(number: u64, codec_id: &str, sampling_frequency: f64) -> Vec<u8> {
    let mut body = uint(TRACK_NUMBER, number);
    body.extend(uint(TRACK_TYPE, TRACK_TYPE_AUDIO));
    body.extend(string(CODEC_ID, codec_id));
    let mut audio = float(SAMPLING_FREQUENCY, sampling_frequency);
    audio.extend(uint(CHANNELS, 2));
    body.extend(element(AUDIO, &audio));
    element(TRACK_ENTRY, &body)
}

pub fn tracks(entries: &[Vec<u8>]) -> Vec<u8> {
    element(TRACKS, &entries.concat())
}

/// Unlaced keyframe `SimpleBlock`.
pub fn simple_block(track: u64, relative_timecode: i16, frame: &[u8]) -> Vec<u8> {
    let mut body = size_bytes(track);
    body.extend(relative_timecode.to_be_bytes());
    body.push(0x80);
    body.extend_from_slice(frame);
    element(SIMPLE_BLOCK, &body)
}

pub fn cluster(timecode: u64, blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut body = uint(TIMECODE, timecode);
    body.extend(blocks.concat());
    element(CLUSTER, &body)
}

/// EBML header followed by a known-size segment.
pub fn file(header: &[u8], children: &[Vec<u8>]) -> Vec<u8> {
    let mut out = header.to_vec();
    out.extend(element(SEGMENT, &children.concat()));
    out
}

/// Single-track file with one cluster holding `frames` 20 ms apart.
pub fn opus_file(codec_id: &str, sampling_frequency: f64, frames: &[&[u8]]) -> Vec<u8> {
    let blocks: Vec<_> = frames
        .iter()
        .enumerate()
        .map(|(i, frame)| simple_block(1, (i * 20) as i16, frame))
        .collect();
    file(
        &ebml_header("webm"),
        &[
            tracks(&[audio_track(1, codec_id, sampling_frequency)]),
            cluster(0, &blocks),
        ],
    )
}
