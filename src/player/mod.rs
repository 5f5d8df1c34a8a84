pub mod context;
pub mod service;
pub mod sink;
pub mod state;

pub use context::ChannelPlayer;
pub use service::{PlayerCommand, PlayerHandle, PlayerService};
pub use sink::{ChannelSink, PlayerEvent, PlayerSink};
pub use state::{ChannelState, TrackQueueEntry};
