use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use ytstream::{
    audio::demux::test_support as webm,
    common::{
        errors::{ResolveError, TransportError},
        types::ChannelId,
    },
    player::{ChannelPlayer, ChannelSink, PlayerEvent, PlayerService, PlayerSink},
    sources::{ResolvedSource, Resolver, StreamLocation, TrackInfo},
    transport::{
        ProgressiveTransport, SegmentedTransport, Transport, TransportEvent, TransportEvents,
        TransportFactory,
    },
};

#[derive(Default)]
struct Calls {
    connects: AtomicUsize,
    requests: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl Calls {
    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

struct MockTransport(Arc<Calls>);

impl Transport for MockTransport {
    fn request_next_chunk(&mut self) {
        self.0.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn shutdown(&mut self) {
        self.0.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

impl ProgressiveTransport for MockTransport {
    fn connect(&mut self) {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
    }
}

impl SegmentedTransport for MockTransport {
    fn connect(&mut self, _manifest_url: &str) {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out mock transports and keeps each one's event sender so a test
/// can play the network side.
#[derive(Default)]
struct MockFactory {
    calls: Arc<Calls>,
    bound: Mutex<Vec<TransportEvents>>,
}

impl MockFactory {
    fn events(&self, index: usize) -> TransportEvents {
        self.bound.lock().unwrap()[index].clone()
    }
}

impl TransportFactory for MockFactory {
    fn progressive(
        &self,
        _url: &str,
        _content_length: Option<u64>,
        events: TransportEvents,
    ) -> Box<dyn ProgressiveTransport> {
        self.bound.lock().unwrap().push(events);
        Box::new(MockTransport(self.calls.clone()))
    }

    fn segmented(&self, events: TransportEvents) -> Box<dyn SegmentedTransport> {
        self.bound.lock().unwrap().push(events);
        Box::new(MockTransport(self.calls.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Seen {
    Enqueued(String),
    Autostart,
    NowPlaying(String),
    Frame(Vec<u8>),
    DownloadComplete(String),
    TrackError(String),
}

#[derive(Default)]
struct Recorder(Vec<Seen>);

impl Recorder {
    fn frames(&self) -> Vec<Vec<u8>> {
        self.0
            .iter()
            .filter_map(|s| match s {
                Seen::Frame(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    fn position(&self, seen: &Seen) -> usize {
        self.0.iter().position(|s| s == seen).unwrap()
    }
}

impl PlayerSink for Recorder {
    fn on_enqueued(&mut self, _: ChannelId, track: &TrackInfo) {
        self.0.push(Seen::Enqueued(track.source_id.clone()));
    }

    fn on_autostart(&mut self, _: ChannelId) {
        self.0.push(Seen::Autostart);
    }

    fn on_now_playing(&mut self, _: ChannelId, track: &TrackInfo) {
        self.0.push(Seen::NowPlaying(track.source_id.clone()));
    }

    fn on_audio_frame(&mut self, _: ChannelId, frame: &[u8]) {
        self.0.push(Seen::Frame(frame.to_vec()));
    }

    fn on_download_complete(&mut self, _: ChannelId, track: &TrackInfo) {
        self.0.push(Seen::DownloadComplete(track.source_id.clone()));
    }

    fn on_track_error(
        &mut self,
        _: ChannelId,
        track: &TrackInfo,
        _error: &ytstream::common::errors::TrackError,
    ) {
        self.0.push(Seen::TrackError(track.source_id.clone()));
    }
}

const CH: ChannelId = ChannelId(42);

struct Harness {
    player: ChannelPlayer<Recorder>,
    factory: Arc<MockFactory>,
    rx: flume::Receiver<TransportEvent>,
}

impl Harness {
    fn new() -> Self {
        let factory = Arc::new(MockFactory::default());
        let (tx, rx) = flume::unbounded();
        let player = ChannelPlayer::new(Recorder::default(), factory.clone(), tx);
        Self {
            player,
            factory,
            rx,
        }
    }

    /// Deliver every event the mock network side has produced so far.
    fn pump(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.player.handle_transport(event);
        }
    }

    fn seen(&self) -> &[Seen] {
        &self.player.sink().0
    }
}

fn progressive(id: &str) -> ResolvedSource {
    ResolvedSource {
        info: TrackInfo {
            source_id: id.into(),
            title: format!("track {id}"),
            ..Default::default()
        },
        location: StreamLocation::Progressive {
            url: format!("https://media.example/{id}"),
            content_length: None,
            mime_type: "audio/webm; codecs=\"opus\"".into(),
        },
    }
}

fn segmented(id: &str) -> ResolvedSource {
    ResolvedSource {
        info: TrackInfo {
            source_id: id.into(),
            ..Default::default()
        },
        location: StreamLocation::Segmented {
            manifest_url: format!("https://manifest.example/{id}.mpd"),
        },
    }
}

fn deliver_in_chunks(events: &TransportEvents, file: &[u8], parts: usize) {
    let size = file.len().div_ceil(parts);
    for chunk in file.chunks(size) {
        events.data(Bytes::copy_from_slice(chunk));
    }
}

#[test]
fn opus_track_plays_end_to_end() {
    let mut h = Harness::new();
    h.player.push_resolved(CH, progressive("t1"));
    h.player.start(CH);

    let file = webm::opus_file("A_OPUS", 48000.0, &[b"opus-payload"]);
    let events = h.factory.events(0);
    let third = file.len().div_ceil(3);
    for (i, chunk) in file.chunks(third).enumerate() {
        events.data(Bytes::copy_from_slice(chunk));
        if i < 2 {
            events.chunk_complete();
            h.pump();
            h.player.progress(CH);
        }
    }
    events.complete();
    h.pump();

    assert_eq!(h.player.sink().frames(), vec![b"opus-payload".to_vec()]);
    let frame = h.player.sink().position(&Seen::Frame(b"opus-payload".to_vec()));
    let done = h.player.sink().position(&Seen::DownloadComplete("t1".into()));
    assert!(frame < done);
    assert_eq!(h.player.queue_len(CH), 0);
    assert_eq!(h.factory.calls.requests(), 2);
    assert_eq!(h.factory.calls.shutdowns.load(Ordering::SeqCst), 1);
}

#[test]
fn vorbis_track_is_rejected_and_the_queue_moves_on() {
    let mut h = Harness::new();
    h.player.push_resolved(CH, progressive("vorbis"));
    h.player.push_resolved(CH, progressive("next"));
    h.player.start(CH);

    let file = webm::opus_file("A_VORBIS", 48000.0, &[b"never"]);
    deliver_in_chunks(&h.factory.events(0), &file, 2);
    h.pump();

    assert!(h.player.sink().frames().is_empty());
    assert!(h.seen().contains(&Seen::TrackError("vorbis".into())));
    assert!(h.seen().contains(&Seen::DownloadComplete("vorbis".into())));
    assert_eq!(h.player.queue_len(CH), 1);

    let state = h.player.channel(CH).unwrap();
    assert!(!state.has_started);
    assert!(!state.chunk_in_flight);
    assert_eq!(state.queue.front().unwrap().info.source_id, "next");
}

#[test]
fn wrong_sample_rate_is_rejected() {
    let mut h = Harness::new();
    h.player.push_resolved(CH, progressive("44k"));
    h.player.start(CH);

    let file = webm::opus_file("A_OPUS", 44100.0, &[b"never"]);
    h.factory.events(0).data(Bytes::from(file));
    h.pump();

    assert!(h.player.sink().frames().is_empty());
    assert!(h.seen().contains(&Seen::TrackError("44k".into())));
    assert_eq!(h.player.queue_len(CH), 0);
}

#[test]
fn only_one_chunk_is_ever_in_flight() {
    let mut h = Harness::new();
    h.player.push_resolved(CH, progressive("t1"));

    // Not started yet: nothing to pace.
    h.player.progress(CH);
    assert_eq!(h.factory.calls.requests(), 0);

    h.player.start(CH);
    assert_eq!(h.factory.calls.connects.load(Ordering::SeqCst), 1);

    // The connect itself is the outstanding chunk.
    h.player.progress(CH);
    h.player.progress(CH);
    assert_eq!(h.factory.calls.requests(), 0);

    h.factory.events(0).chunk_complete();
    h.pump();
    h.player.progress(CH);
    h.player.progress(CH);
    assert_eq!(h.factory.calls.requests(), 1);

    h.factory.events(0).chunk_complete();
    h.pump();
    h.player.progress(CH);
    assert_eq!(h.factory.calls.requests(), 2);
}

#[test]
fn first_segment_requests_the_next_one_by_itself() {
    let mut h = Harness::new();
    h.player.push_resolved(CH, segmented("dash"));
    h.player.start(CH);
    let events = h.factory.events(0);

    events.segment_complete();
    h.pump();
    assert_eq!(h.factory.calls.requests(), 1);
    assert!(h.player.channel(CH).unwrap().chunk_in_flight);

    // Still in flight: pacing is ignored.
    h.player.progress(CH);
    assert_eq!(h.factory.calls.requests(), 1);

    events.segment_complete();
    h.pump();
    assert_eq!(h.factory.calls.requests(), 1);
    assert_eq!(h.player.channel(CH).unwrap().segment_count, 2);

    h.player.progress(CH);
    h.player.progress(CH);
    assert_eq!(h.factory.calls.requests(), 2);
}

fn assert_failed_then_moved_on(h: &Harness, failed: &str, next: &str) {
    let error = h.player.sink().position(&Seen::TrackError(failed.into()));
    let done = h.player.sink().position(&Seen::DownloadComplete(failed.into()));
    assert!(error < done);
    assert_eq!(h.player.queue_len(CH), 1);

    let state = h.player.channel(CH).unwrap();
    assert!(!state.has_started);
    assert!(!state.chunk_in_flight);
    assert_eq!(state.queue.front().unwrap().info.source_id, next);
}

#[test]
fn stream_ending_mid_element_fails_the_track() {
    let mut h = Harness::new();
    h.player.push_resolved(CH, progressive("cut"));
    h.player.push_resolved(CH, progressive("next"));
    h.player.start(CH);

    let file = webm::opus_file("A_OPUS", 48000.0, &[b"frame"]);
    let events = h.factory.events(0);
    deliver_in_chunks(&events, &file[..file.len() - 2], 2);
    h.pump();
    assert!(!h.seen().contains(&Seen::TrackError("cut".into())));

    events.complete();
    h.pump();

    assert!(h.player.sink().frames().is_empty());
    assert_failed_then_moved_on(&h, "cut", "next");
    assert_eq!(h.factory.calls.shutdowns.load(Ordering::SeqCst), 1);
}

#[test]
fn transport_failure_fails_the_track() {
    let mut h = Harness::new();
    h.player.push_resolved(CH, segmented("dash"));
    h.player.push_resolved(CH, progressive("next"));
    h.player.start(CH);

    let events = h.factory.events(0);
    events.failed(TransportError::NoRepresentation);
    h.pump();

    assert_failed_then_moved_on(&h, "dash", "next");

    // Late events from the dropped transport are ignored.
    events.complete();
    h.pump();
    assert!(!h.seen().contains(&Seen::DownloadComplete("next".into())));
    assert_eq!(
        h.seen()
            .iter()
            .filter(|s| **s == Seen::DownloadComplete("dash".into()))
            .count(),
        1
    );
}

#[test]
fn queued_tracks_play_in_order() {
    let mut h = Harness::new();
    for id in ["t1", "t2", "t3"] {
        h.player.push_resolved(CH, progressive(id));
    }
    h.player.start(CH);

    // Bytes from a queued (not yet started) entry are ignored.
    let early = webm::opus_file("A_OPUS", 48000.0, &[b"t2-early"]);
    h.factory.events(1).data(Bytes::from(early));
    h.factory.events(1).complete();
    h.pump();
    assert_eq!(h.player.queue_len(CH), 3);

    let t1 = webm::opus_file("A_OPUS", 48000.0, &[b"t1-a", b"t1-b"]);
    deliver_in_chunks(&h.factory.events(0), &t1, 3);
    h.factory.events(0).complete();
    h.pump();
    assert_eq!(h.player.queue_len(CH), 2);
    assert_eq!(
        h.player.channel(CH).unwrap().queue.front().unwrap().info.source_id,
        "t2"
    );

    h.player.start(CH);
    let t2 = webm::opus_file("A_OPUS", 48000.0, &[b"t2-a"]);
    h.factory.events(1).data(Bytes::from(t2));
    h.factory.events(1).complete();
    h.pump();

    assert_eq!(
        h.player.sink().frames(),
        vec![b"t1-a".to_vec(), b"t1-b".to_vec(), b"t2-a".to_vec()]
    );
    let t1_done = h.player.sink().position(&Seen::DownloadComplete("t1".into()));
    let t2_frame = h.player.sink().position(&Seen::Frame(b"t2-a".to_vec()));
    assert!(t1_done < t2_frame);
    assert!(h.seen().contains(&Seen::NowPlaying("t2".into())));
    assert_eq!(h.player.queue_len(CH), 1);
}

#[test]
fn stop_is_a_no_op_without_a_running_track() {
    let mut h = Harness::new();
    h.player.stop(CH);
    assert!(h.seen().is_empty());

    h.player.start(CH);
    h.player.stop(CH);
    assert!(h.seen().is_empty());

    h.player.push_resolved(CH, progressive("t1"));
    h.player.stop(CH);
    assert_eq!(h.player.queue_len(CH), 1);
    assert_eq!(h.factory.calls.shutdowns.load(Ordering::SeqCst), 0);
}

#[test]
fn stop_skips_the_running_track() {
    let mut h = Harness::new();
    h.player.push_resolved(CH, progressive("t1"));
    h.player.push_resolved(CH, progressive("t2"));
    h.player.start(CH);

    let file = webm::opus_file("A_OPUS", 48000.0, &[b"partial"]);
    h.factory.events(0).data(Bytes::copy_from_slice(&file[..file.len() / 2]));
    h.pump();

    h.player.stop(CH);
    h.player.stop(CH);
    assert_eq!(h.factory.calls.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(h.player.queue_len(CH), 1);

    // Late bytes from the skipped transfer never reach the demuxer.
    h.factory.events(0).data(Bytes::copy_from_slice(&file[file.len() / 2..]));
    h.pump();
    let state = h.player.channel(CH).unwrap();
    assert_eq!(state.demux.buffered(), 0);
    assert!(h.player.sink().frames().is_empty());
}

#[test]
fn end_releases_every_queued_transport() {
    let mut h = Harness::new();
    for id in ["t1", "t2", "t3"] {
        h.player.push_resolved(CH, progressive(id));
    }
    h.player.start(CH);
    h.player.end(CH);

    assert_eq!(h.factory.calls.shutdowns.load(Ordering::SeqCst), 3);
    assert!(h.player.channel(CH).is_none());
}

struct FixedResolver;

#[async_trait]
impl Resolver for FixedResolver {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn resolve(&self, video_id: &str) -> Result<ResolvedSource, ResolveError> {
        if video_id == "missing0000" {
            return Err(ResolveError::NoPlayableFormat);
        }
        Ok(progressive(video_id))
    }
}

#[tokio::test]
async fn service_resolves_plays_and_reports() {
    let factory = Arc::new(MockFactory::default());
    let (event_tx, event_rx) = flume::unbounded();
    let (service, handle) = PlayerService::new(
        ChannelSink::new(event_tx),
        Arc::new(FixedResolver),
        factory.clone(),
    );
    let task = tokio::spawn(service.run());

    assert!(handle.add_id(CH, "missing0000"));
    assert!(handle.add_id(CH, "dQw4w9WgXcQ"));
    assert!(handle.start(CH));

    let failed = event_rx.recv_async().await.unwrap();
    assert!(matches!(failed, PlayerEvent::ResolveFailed { ref source, .. } if source == "missing0000"));
    assert!(matches!(
        event_rx.recv_async().await.unwrap(),
        PlayerEvent::Enqueued { ref track, .. } if track.source_id == "dQw4w9WgXcQ"
    ));
    assert!(matches!(event_rx.recv_async().await.unwrap(), PlayerEvent::Autostart { .. }));

    handle.start(CH);
    assert!(matches!(event_rx.recv_async().await.unwrap(), PlayerEvent::NowPlaying { .. }));

    let events = factory.events(0);
    events.data(Bytes::from(webm::opus_file("A_OPUS", 48000.0, &[b"frame"])));
    events.complete();

    match event_rx.recv_async().await.unwrap() {
        PlayerEvent::AudioFrame { channel, frame } => {
            assert_eq!(channel, CH);
            assert_eq!(frame.as_ref(), b"frame");
        }
        other => panic!("expected a frame, got {other:?}"),
    }
    assert!(matches!(
        event_rx.recv_async().await.unwrap(),
        PlayerEvent::DownloadComplete { .. }
    ));

    drop(handle);
    task.await.unwrap();
    assert_eq!(factory.calls.shutdowns.load(Ordering::SeqCst), 1);
}
