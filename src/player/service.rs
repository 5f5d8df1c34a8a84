//! The player event loop: caller commands, resolver results and transport
//! events are all applied to one [`ChannelPlayer`] on a single task.

use std::sync::Arc;

use tracing::{debug, info};

use super::{context::ChannelPlayer, sink::PlayerSink};
use crate::{
    common::{errors::ResolveError, types::ChannelId},
    sources::{ResolvedSource, Resolver, extract_video_id},
    transport::{TransportEvent, TransportFactory},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    AddId { channel: ChannelId, video_id: String },
    Start(ChannelId),
    Progress(ChannelId),
    Stop(ChannelId),
    End(ChannelId),
}

/// Cloneable front door to a running [`PlayerService`].
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    tx: flume::Sender<PlayerCommand>,
}

impl PlayerHandle {
    fn send(&self, command: PlayerCommand) -> bool {
        self.tx.send(command).is_ok()
    }

    /// Enqueue a video by URL. Returns `false` when no video id can be
    /// extracted; nothing is enqueued in that case.
    pub fn add(&self, channel: ChannelId, url: &str) -> bool {
        match extract_video_id(url) {
            Some(video_id) => self.add_id(channel, &video_id),
            None => {
                debug!("[{}] no video id in {}", channel, url);
                false
            }
        }
    }

    pub fn add_id(&self, channel: ChannelId, video_id: &str) -> bool {
        self.send(PlayerCommand::AddId {
            channel,
            video_id: video_id.to_string(),
        })
    }

    pub fn start(&self, channel: ChannelId) -> bool {
        self.send(PlayerCommand::Start(channel))
    }

    pub fn progress(&self, channel: ChannelId) -> bool {
        self.send(PlayerCommand::Progress(channel))
    }

    pub fn stop(&self, channel: ChannelId) -> bool {
        self.send(PlayerCommand::Stop(channel))
    }

    pub fn end(&self, channel: ChannelId) -> bool {
        self.send(PlayerCommand::End(channel))
    }
}

struct ResolveRequest {
    channel: ChannelId,
    video_id: String,
}

struct Resolved {
    channel: ChannelId,
    video_id: String,
    result: Result<ResolvedSource, ResolveError>,
}

pub struct PlayerService<S> {
    player: ChannelPlayer<S>,
    resolver: Arc<dyn Resolver>,
    commands: flume::Receiver<PlayerCommand>,
    transport_rx: flume::Receiver<TransportEvent>,
}

impl<S: PlayerSink> PlayerService<S> {
    pub fn new(
        sink: S,
        resolver: Arc<dyn Resolver>,
        factory: Arc<dyn TransportFactory>,
    ) -> (Self, PlayerHandle) {
        let (tx, commands) = flume::unbounded();
        let (transport_tx, transport_rx) = flume::unbounded();
        let service = Self {
            player: ChannelPlayer::new(sink, factory, transport_tx),
            resolver,
            commands,
            transport_rx,
        };
        (service, PlayerHandle { tx })
    }

    pub fn player(&self) -> &ChannelPlayer<S> {
        &self.player
    }

    /// Run until every [`PlayerHandle`] has been dropped. All channels are
    /// torn down on exit.
    pub async fn run(mut self) {
        let (request_tx, request_rx) = flume::unbounded::<ResolveRequest>();
        let (resolved_tx, resolved_rx) = flume::unbounded::<Resolved>();

        // One worker keeps resolutions in the order tracks were added.
        let resolver = self.resolver.clone();
        let worker = tokio::spawn(async move {
            while let Ok(request) = request_rx.recv_async().await {
                let result = resolver.resolve(&request.video_id).await;
                let resolved = Resolved {
                    channel: request.channel,
                    video_id: request.video_id,
                    result,
                };
                if resolved_tx.send(resolved).is_err() {
                    break;
                }
            }
        });

        info!("player loop started ({} resolver)", self.resolver.name());

        loop {
            tokio::select! {
                command = self.commands.recv_async() => match command {
                    Ok(PlayerCommand::AddId { channel, video_id }) => {
                        let _ = request_tx.send(ResolveRequest { channel, video_id });
                    }
                    Ok(command) => self.apply(command),
                    Err(_) => break,
                },
                Ok(resolved) = resolved_rx.recv_async() => match resolved.result {
                    Ok(source) => {
                        self.player.push_resolved(resolved.channel, source);
                    }
                    Err(e) => self.player.resolve_failed(resolved.channel, &resolved.video_id, &e),
                },
                Ok(event) = self.transport_rx.recv_async() => {
                    self.player.handle_transport(event);
                }
            }
        }

        worker.abort();
        info!("player loop stopped");
    }

    fn apply(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::AddId { .. } => {}
            PlayerCommand::Start(channel) => self.player.start(channel),
            PlayerCommand::Progress(channel) => self.player.progress(channel),
            PlayerCommand::Stop(channel) => self.player.stop(channel),
            PlayerCommand::End(channel) => self.player.end(channel),
        }
    }
}
