use std::{collections::VecDeque, sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use ytstream::{
    audio::constants::FRAME_DURATION_MS,
    common::{
        banner::{BannerInfo, print_banner},
        http::HttpClient,
        logger,
        types::{AnyResult, ChannelId},
    },
    configs::Config,
    log_println,
    player::{ChannelSink, PlayerEvent, PlayerService},
    sources::{InnertubeResolver, SourceRef, catalog::CatalogClient},
    transport::HttpTransportFactory,
};

const CHANNEL: ChannelId = ChannelId(1);

fn main() -> AnyResult<()> {
    print_banner(&BannerInfo::default());

    let config = Config::load()?;
    logger::init(&config.logging);

    let inputs: Vec<String> = std::env::args().skip(1).collect();
    if inputs.is_empty() {
        log_println!("usage: ytstream <url|video-id|query>...");
        return Ok(());
    }

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(run(config, inputs))
}

/// Turn one command-line argument into a video id. Free text goes through
/// the catalog and takes the first YouTube candidate.
async fn video_id_for(catalog: &CatalogClient, input: &str) -> Option<String> {
    if let Some(source) = SourceRef::parse(input) {
        return source.video_id().ok();
    }
    match catalog.song_info(input).await {
        Ok(song) => {
            debug!("{:?} matched {} - {}", input, song.artist, song.track);
            song.youtube_candidates.into_iter().next()
        }
        Err(e) => {
            warn!("catalog lookup for {:?} failed: {}", input, e);
            None
        }
    }
}

async fn run(config: Config, inputs: Vec<String>) -> AnyResult<()> {
    let resolver = Arc::new(InnertubeResolver::new(config.youtube.clone())?);
    let media = HttpClient::new_media(Some(&config.youtube.user_agent))?;
    let factory = Arc::new(HttpTransportFactory::new(media, config.player.chunk_size));
    let catalog = CatalogClient::new(&config.catalog)?;

    let (event_tx, event_rx) = flume::unbounded();
    let (service, handle) = PlayerService::new(ChannelSink::new(event_tx), resolver, factory);
    let service_task = tokio::spawn(service.run());

    let mut queued = 0usize;
    for input in &inputs {
        match video_id_for(&catalog, input).await {
            Some(id) if handle.add_id(CHANNEL, &id) => queued += 1,
            _ => warn!("skipping {:?}: no playable video found", input),
        }
    }
    if queued == 0 {
        return Ok(());
    }
    handle.start(CHANNEL);

    let mut out = tokio::fs::File::create(&config.output.path).await?;
    let mut buffer: VecDeque<Bytes> = VecDeque::with_capacity(config.player.buffer_frames);
    let mut tick = tokio::time::interval(Duration::from_millis(FRAME_DURATION_MS));
    let mut finished = 0usize;
    let mut written = 0u64;

    loop {
        tokio::select! {
            event = event_rx.recv_async() => {
                let Ok(event) = event else { break };
                match event {
                    PlayerEvent::Enqueued { track, .. } => {
                        info!("queued: {} by {} ({}s)", track.title, track.author, track.duration_seconds);
                    }
                    PlayerEvent::Autostart { channel } => {
                        handle.start(channel);
                    }
                    PlayerEvent::NowPlaying { track, .. } => info!("now playing: {}", track.title),
                    PlayerEvent::AudioFrame { frame, .. } => buffer.push_back(frame),
                    PlayerEvent::DownloadComplete { channel, track } => {
                        finished += 1;
                        debug!("download of {} finished ({}/{})", track.source_id, finished, queued);
                        handle.start(channel);
                    }
                    PlayerEvent::TrackError { track, error, .. } => {
                        warn!("{} failed: {}", track.source_id, error);
                    }
                    PlayerEvent::ResolveFailed { source, error, .. } => {
                        warn!("{} could not be resolved: {}", source, error);
                        finished += 1;
                    }
                }
            }
            _ = tick.tick() => {
                if let Some(frame) = buffer.pop_front() {
                    let Ok(len) = u16::try_from(frame.len()) else {
                        warn!("dropping oversized frame of {} bytes", frame.len());
                        continue;
                    };
                    out.write_all(&len.to_be_bytes()).await?;
                    out.write_all(&frame).await?;
                    written += 1;
                } else if finished >= queued {
                    break;
                }
                if buffer.len() < config.player.low_watermark_frames {
                    handle.progress(CHANNEL);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    out.flush().await?;
    info!("wrote {} frames to {}", written, config.output.path);

    handle.end(CHANNEL);
    drop(handle);
    let _ = service_task.await;
    Ok(())
}
