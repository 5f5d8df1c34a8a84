use bytes::Bytes;

use crate::{
    common::{
        errors::{ResolveError, TrackError},
        types::ChannelId,
    },
    sources::TrackInfo,
};

/// Receives everything a channel player reports back to its caller.
///
/// All methods run on the player loop, synchronously, in the order the
/// transitions happen. `on_audio_frame` borrows the packet only for the
/// duration of the call.
pub trait PlayerSink {
    fn on_enqueued(&mut self, _channel: ChannelId, _track: &TrackInfo) {}

    /// The queue went from empty to non-empty on a channel allowed to
    /// autostart. The caller decides whether to call `start()`.
    fn on_autostart(&mut self, _channel: ChannelId) {}

    fn on_now_playing(&mut self, _channel: ChannelId, _track: &TrackInfo) {}

    fn on_audio_frame(&mut self, channel: ChannelId, frame: &[u8]);

    fn on_download_complete(&mut self, _channel: ChannelId, _track: &TrackInfo) {}

    fn on_track_error(&mut self, _channel: ChannelId, _track: &TrackInfo, _error: &TrackError) {}

    fn on_resolve_failed(&mut self, _channel: ChannelId, _source: &str, _error: &ResolveError) {}
}

/// Lifecycle events as owned values, for consumers on the other side of a
/// channel.
#[derive(Debug)]
pub enum PlayerEvent {
    Enqueued {
        channel: ChannelId,
        track: TrackInfo,
    },
    Autostart {
        channel: ChannelId,
    },
    NowPlaying {
        channel: ChannelId,
        track: TrackInfo,
    },
    AudioFrame {
        channel: ChannelId,
        frame: Bytes,
    },
    DownloadComplete {
        channel: ChannelId,
        track: TrackInfo,
    },
    TrackError {
        channel: ChannelId,
        track: TrackInfo,
        error: String,
    },
    ResolveFailed {
        channel: ChannelId,
        source: String,
        error: String,
    },
}

/// Forwards every callback as a [`PlayerEvent`].
pub struct ChannelSink {
    tx: flume::Sender<PlayerEvent>,
}

impl ChannelSink {
    pub fn new(tx: flume::Sender<PlayerEvent>) -> Self {
        Self { tx }
    }

    fn emit(&self, event: PlayerEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("player event dropped: no receiver");
        }
    }
}

impl PlayerSink for ChannelSink {
    fn on_enqueued(&mut self, channel: ChannelId, track: &TrackInfo) {
        self.emit(PlayerEvent::Enqueued {
            channel,
            track: track.clone(),
        });
    }

    fn on_autostart(&mut self, channel: ChannelId) {
        self.emit(PlayerEvent::Autostart { channel });
    }

    fn on_now_playing(&mut self, channel: ChannelId, track: &TrackInfo) {
        self.emit(PlayerEvent::NowPlaying {
            channel,
            track: track.clone(),
        });
    }

    fn on_audio_frame(&mut self, channel: ChannelId, frame: &[u8]) {
        self.emit(PlayerEvent::AudioFrame {
            channel,
            frame: Bytes::copy_from_slice(frame),
        });
    }

    fn on_download_complete(&mut self, channel: ChannelId, track: &TrackInfo) {
        self.emit(PlayerEvent::DownloadComplete {
            channel,
            track: track.clone(),
        });
    }

    fn on_track_error(&mut self, channel: ChannelId, track: &TrackInfo, error: &TrackError) {
        self.emit(PlayerEvent::TrackError {
            channel,
            track: track.clone(),
            error: error.to_string(),
        });
    }

    fn on_resolve_failed(&mut self, channel: ChannelId, source: &str, error: &ResolveError) {
        self.emit(PlayerEvent::ResolveFailed {
            channel,
            source: source.to_string(),
            error: error.to_string(),
        });
    }
}
