//! Element events raised by [`WebmParser`](super::WebmParser) and the
//! callback that turns them into Opus packets.

use crate::{
    audio::constants::{REQUIRED_CODEC_ID, REQUIRED_SAMPLE_RATE},
    audio::demux::ebml::TRACK_TYPE_AUDIO,
    common::errors::DemuxError,
};

/// A fully parsed `TrackEntry`, with Matroska defaults for absent children.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEntry {
    pub number: u64,
    pub track_type: u64,
    pub codec_id: String,
    pub audio: Option<AudioSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSettings {
    pub sampling_frequency: f64,
    pub channels: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sampling_frequency: 8000.0,
            channels: 1,
        }
    }
}

impl TrackEntry {
    pub fn sampling_frequency(&self) -> f64 {
        self.audio.unwrap_or_default().sampling_frequency
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Cluster timecode, in timecode-scale units.
    pub timecode: u64,
    /// Reader position of the cluster's first child.
    pub position: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub track_number: u64,
    /// Timecode relative to the enclosing cluster.
    pub relative_timecode: i16,
    pub keyframe: bool,
    pub frame_count: usize,
}

/// Metadata delivered with every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMeta {
    pub track_number: u64,
    /// Absolute timecode (cluster + block relative).
    pub timecode: i64,
    pub keyframe: bool,
}

/// What the parser should do with a block once its header is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Skip,
}

/// Receiver of parser events. Any error aborts the current `feed`.
pub trait Callback {
    fn on_track_entry(&mut self, _entry: &TrackEntry) -> Result<(), DemuxError> {
        Ok(())
    }

    fn on_cluster_begin(&mut self, _cluster: &ClusterInfo) -> Result<(), DemuxError> {
        Ok(())
    }

    fn on_block_begin(&mut self, _block: &BlockHeader) -> Action {
        Action::Read
    }

    fn on_frame(&mut self, meta: &FrameMeta, data: &[u8]) -> Result<(), DemuxError>;
}

/// Per-track demux state that outlives individual `feed` calls.
#[derive(Debug, Default, Clone)]
pub struct StreamState {
    pub accepted_track: Option<u64>,
    pub cluster_timecode: u64,
    pub frames: u64,
}

/// Accepts only 48 kHz Opus audio and hands every frame of that track to
/// `on_packet`.
pub struct StreamCallback<'a, F> {
    state: &'a mut StreamState,
    on_packet: F,
}

impl<'a, F> StreamCallback<'a, F>
where
    F: FnMut(&FrameMeta, &[u8]),
{
    pub fn new(state: &'a mut StreamState, on_packet: F) -> Self {
        Self { state, on_packet }
    }
}

impl<F> Callback for StreamCallback<'_, F>
where
    F: FnMut(&FrameMeta, &[u8]),
{
    fn on_track_entry(&mut self, entry: &TrackEntry) -> Result<(), DemuxError> {
        let sampling_frequency = entry.sampling_frequency();
        if entry.track_type != TRACK_TYPE_AUDIO
            || sampling_frequency != REQUIRED_SAMPLE_RATE as f64
            || entry.codec_id != REQUIRED_CODEC_ID
        {
            return Err(DemuxError::InvalidTrack {
                track_type: entry.track_type,
                codec_id: entry.codec_id.clone(),
                sampling_frequency,
            });
        }

        tracing::debug!(
            "accepted track {} ({}, {} Hz, {} ch)",
            entry.number,
            entry.codec_id,
            sampling_frequency,
            entry.audio.unwrap_or_default().channels
        );
        self.state.accepted_track = Some(entry.number);
        Ok(())
    }

    fn on_cluster_begin(&mut self, cluster: &ClusterInfo) -> Result<(), DemuxError> {
        self.state.cluster_timecode = cluster.timecode;
        Ok(())
    }

    fn on_block_begin(&mut self, block: &BlockHeader) -> Action {
        if self.state.accepted_track == Some(block.track_number) {
            Action::Read
        } else {
            Action::Skip
        }
    }

    fn on_frame(&mut self, meta: &FrameMeta, data: &[u8]) -> Result<(), DemuxError> {
        self.state.frames += 1;
        (self.on_packet)(meta, data);
        Ok(())
    }
}
