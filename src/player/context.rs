use std::{collections::HashMap, sync::Arc};

use tracing::{debug, trace, warn};

use super::{
    sink::PlayerSink,
    state::{ChannelState, TrackQueueEntry},
};
use crate::{
    audio::demux::FeedStatus,
    common::{
        errors::{ResolveError, TrackError},
        types::{ChannelId, TrackToken},
    },
    sources::ResolvedSource,
    transport::{TransportEvent, TransportEventKind, TransportEvents, TransportFactory},
};

/// Owns every channel's queue and demux state and applies all transitions.
///
/// Nothing in here is shared across threads: callers and transports reach
/// it only through method calls on the loop that owns it.
pub struct ChannelPlayer<S> {
    channels: HashMap<ChannelId, ChannelState>,
    sink: S,
    factory: Arc<dyn TransportFactory>,
    events_tx: flume::Sender<TransportEvent>,
}

impl<S: PlayerSink> ChannelPlayer<S> {
    pub fn new(
        sink: S,
        factory: Arc<dyn TransportFactory>,
        events_tx: flume::Sender<TransportEvent>,
    ) -> Self {
        Self {
            channels: HashMap::new(),
            sink,
            factory,
            events_tx,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn channel(&self, channel: ChannelId) -> Option<&ChannelState> {
        self.channels.get(&channel)
    }

    pub fn queue_len(&self, channel: ChannelId) -> usize {
        self.channels.get(&channel).map_or(0, |state| state.queue.len())
    }

    /// Append a resolved track, binding it to its download strategy.
    pub fn push_resolved(&mut self, channel: ChannelId, resolved: ResolvedSource) -> TrackToken {
        let token = TrackToken::next();
        let events = TransportEvents::new(channel, token, self.events_tx.clone());
        let strategy = self.factory.bind(&resolved.location, events);

        let state = self.channels.entry(channel).or_default();
        let was_empty = state.queue.is_empty();
        state.queue.push_back(TrackQueueEntry {
            info: resolved.info,
            token,
            strategy,
        });
        debug!(
            "[{}] enqueued {} as {} (queue length {})",
            channel,
            resolved_id(state),
            token,
            state.queue.len()
        );

        if let Some(entry) = state.queue.back() {
            self.sink.on_enqueued(channel, &entry.info);
        }
        if was_empty && state.may_autostart {
            self.sink.on_autostart(channel);
        }
        token
    }

    pub fn resolve_failed(&mut self, channel: ChannelId, source: &str, error: &ResolveError) {
        warn!("[{}] could not resolve {}: {}", channel, source, error);
        self.sink.on_resolve_failed(channel, source, error);
    }

    /// Connect the front entry. A no-op while a track is already running;
    /// with an empty queue it only allows the next enqueue to autostart.
    pub fn start(&mut self, channel: ChannelId) {
        let state = self.channels.entry(channel).or_default();
        if state.has_started {
            return;
        }
        state.may_autostart = true;

        let Some(front) = state.queue.front_mut() else {
            debug!("[{}] start with empty queue, autostart armed", channel);
            return;
        };
        front.strategy.connect();
        state.has_started = true;
        state.chunk_in_flight = true;
        debug!(
            "[{}] now playing {} ({})",
            channel,
            front.info.source_id,
            if front.is_segmented() { "segmented" } else { "progressive" }
        );
        self.sink.on_now_playing(channel, &front.info);
    }

    /// Request one more chunk, unless one is already outstanding.
    pub fn progress(&mut self, channel: ChannelId) {
        let Some(state) = self.channels.get_mut(&channel) else {
            return;
        };
        if !state.has_started || state.chunk_in_flight {
            return;
        }
        if let Some(front) = state.queue.front_mut() {
            state.chunk_in_flight = true;
            front.strategy.request_next_chunk();
        }
    }

    /// Abandon the running track. Queued entries behind it are kept.
    pub fn stop(&mut self, channel: ChannelId) {
        let Some(state) = self.channels.get_mut(&channel) else {
            return;
        };
        if !state.has_started {
            return;
        }
        if let Some(info) = state.finish_front() {
            debug!("[{}] stopped {}", channel, info.source_id);
        }
    }

    /// Stop and forget the channel, releasing every queued entry.
    pub fn end(&mut self, channel: ChannelId) {
        self.stop(channel);
        if let Some(state) = self.channels.remove(&channel) {
            debug!("[{}] ended with {} queued entries", channel, state.queue.len());
        }
    }

    /// Apply one event from a transport.
    pub fn handle_transport(&mut self, event: TransportEvent) {
        let TransportEvent {
            channel,
            token,
            kind,
        } = event;

        let Some(state) = self.channels.get_mut(&channel) else {
            trace!("[{}] event for unknown channel dropped", channel);
            return;
        };
        if state.active_token() != Some(token) {
            trace!("[{}] stale event from {} dropped", channel, token);
            return;
        }

        match kind {
            TransportEventKind::Data(bytes) => {
                state.demux.push(&bytes);
                let sink = &mut self.sink;
                if let Err(e) = state
                    .demux
                    .feed(|_, frame| sink.on_audio_frame(channel, frame))
                {
                    self.fail_front(channel, e.into());
                }
            }
            TransportEventKind::ChunkComplete => {
                trace!("[{}] chunk complete at {}", channel, state.demux.position());
                state.chunk_in_flight = false;
            }
            TransportEventKind::SegmentComplete => {
                state.chunk_in_flight = false;
                state.segment_count += 1;
                trace!("[{}] segment {} complete", channel, state.segment_count);
                // The first segment only carries the container headers.
                if state.segment_count == 1
                    && let Some(front) = state.queue.front_mut()
                {
                    state.chunk_in_flight = true;
                    front.strategy.request_next_chunk();
                }
            }
            TransportEventKind::Complete => {
                state.demux.mark_complete();
                let sink = &mut self.sink;
                match state
                    .demux
                    .feed(|_, frame| sink.on_audio_frame(channel, frame))
                {
                    Ok(status) => {
                        if status == FeedStatus::WouldBlock {
                            debug!("[{}] stream ended with {} bytes unparsed", channel, state.demux.buffered());
                        }
                        self.complete_front(channel);
                    }
                    Err(e) => self.fail_front(channel, e.into()),
                }
            }
            TransportEventKind::Failed(e) => {
                warn!("[{}] transport failed: {}", channel, e);
                self.fail_front(channel, e.into());
            }
        }
    }

    fn complete_front(&mut self, channel: ChannelId) {
        let Some(state) = self.channels.get_mut(&channel) else {
            return;
        };
        let frames = state.demux.frames();
        if let Some(info) = state.finish_front() {
            debug!("[{}] download of {} complete ({} frames)", channel, info.source_id, frames);
            self.sink.on_download_complete(channel, &info);
        }
    }

    /// Force-complete the front entry after an unrecoverable error.
    fn fail_front(&mut self, channel: ChannelId, error: TrackError) {
        let Some(state) = self.channels.get_mut(&channel) else {
            return;
        };
        let Some(info) = state.finish_front() else {
            return;
        };
        warn!("[{}] dropping {}: {}", channel, info.source_id, error);
        self.sink.on_track_error(channel, &info, &error);
        self.sink.on_download_complete(channel, &info);
    }
}

fn resolved_id(state: &ChannelState) -> &str {
    state
        .queue
        .back()
        .map_or("", |entry| entry.info.source_id.as_str())
}
