use std::collections::VecDeque;

use crate::{
    audio::demux::Demuxer,
    common::types::TrackToken,
    sources::TrackInfo,
    transport::Strategy,
};

/// One resolved track waiting in, or at the front of, a channel's queue.
///
/// The entry owns its strategy; dropping the entry shuts the transport down.
#[derive(Debug)]
pub struct TrackQueueEntry {
    pub info: TrackInfo,
    pub token: TrackToken,
    pub strategy: Strategy,
}

impl TrackQueueEntry {
    pub fn is_segmented(&self) -> bool {
        self.strategy.is_segmented()
    }
}

/// Per-channel playback state. Only the queue front is ever connected or
/// demuxed.
#[derive(Debug, Default)]
pub struct ChannelState {
    pub queue: VecDeque<TrackQueueEntry>,
    pub demux: Demuxer,
    /// The front entry's strategy has been connected.
    pub has_started: bool,
    /// A chunk or segment request is outstanding.
    pub chunk_in_flight: bool,
    /// Segments completed for the front entry.
    pub segment_count: u32,
    pub may_autostart: bool,
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token of the entry currently allowed to deliver transport events.
    pub fn active_token(&self) -> Option<TrackToken> {
        if !self.has_started {
            return None;
        }
        self.queue.front().map(|entry| entry.token)
    }

    /// Forget everything about the front entry's download. The entry itself
    /// stays queued.
    pub fn reset_download(&mut self) {
        self.demux.reset();
        self.has_started = false;
        self.chunk_in_flight = false;
        self.segment_count = 0;
    }

    /// Reset download state and drop the front entry, returning its metadata.
    pub fn finish_front(&mut self) -> Option<TrackInfo> {
        self.reset_download();
        self.queue.pop_front().map(|entry| entry.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_channel_has_no_active_token() {
        let state = ChannelState::new();
        assert!(state.active_token().is_none());
        assert!(!state.has_started);
        assert!(!state.chunk_in_flight);
        assert_eq!(state.segment_count, 0);
    }

    #[test]
    fn finishing_an_empty_queue_only_resets() {
        let mut state = ChannelState {
            has_started: true,
            chunk_in_flight: true,
            segment_count: 3,
            ..Default::default()
        };
        assert!(state.finish_front().is_none());
        assert!(!state.has_started && !state.chunk_in_flight);
        assert_eq!(state.segment_count, 0);
    }
}
