//! Download strategies: how a queue entry's bytes reach the demuxer.
//!
//! Every transport runs its network I/O on its own tokio task and reports
//! back exclusively through [`TransportEvent`]s tagged with the owning channel
//! and track token. The player loop is the only consumer; a transport never
//! touches player state.
//!
//! ```text
//!  player ── connect / request_next_chunk / shutdown ──► transport task
//!     ▲                                                        │
//!     └───────────── TransportEvent (flume) ───────────────────┘
//! ```

pub mod dash;
pub mod progressive;
pub mod segmented;

use bytes::Bytes;

pub use progressive::HttpProgressive;
pub use segmented::HttpSegmented;

use crate::{
    common::{
        errors::TransportError,
        types::{ChannelId, TrackToken},
    },
    sources::StreamLocation,
};

#[derive(Debug)]
pub enum TransportEventKind {
    /// Media bytes, in stream order.
    Data(Bytes),
    /// A progressive range finished; the transport now waits for
    /// `request_next_chunk`.
    ChunkComplete,
    /// A DASH segment finished; the transport now waits for
    /// `request_next_chunk`.
    SegmentComplete,
    /// The whole stream has been delivered.
    Complete,
    /// The transfer was abandoned. No further events follow.
    Failed(TransportError),
}

#[derive(Debug)]
pub struct TransportEvent {
    pub channel: ChannelId,
    pub token: TrackToken,
    pub kind: TransportEventKind,
}

/// Sending half handed to a transport, pre-tagged with its owner.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    channel: ChannelId,
    token: TrackToken,
    tx: flume::Sender<TransportEvent>,
}

impl TransportEvents {
    pub fn new(channel: ChannelId, token: TrackToken, tx: flume::Sender<TransportEvent>) -> Self {
        Self { channel, token, tx }
    }

    pub fn token(&self) -> TrackToken {
        self.token
    }

    /// Returns `false` once the player side is gone.
    pub fn send(&self, kind: TransportEventKind) -> bool {
        self.tx
            .send(TransportEvent {
                channel: self.channel,
                token: self.token,
                kind,
            })
            .is_ok()
    }

    pub fn data(&self, bytes: Bytes) -> bool {
        self.send(TransportEventKind::Data(bytes))
    }

    pub fn chunk_complete(&self) -> bool {
        self.send(TransportEventKind::ChunkComplete)
    }

    pub fn segment_complete(&self) -> bool {
        self.send(TransportEventKind::SegmentComplete)
    }

    pub fn complete(&self) -> bool {
        self.send(TransportEventKind::Complete)
    }

    pub fn failed(&self, error: TransportError) -> bool {
        self.send(TransportEventKind::Failed(error))
    }
}

/// Operations common to both strategies.
pub trait Transport: Send {
    /// Fetch the next chunk or segment. Only called while nothing is in flight.
    fn request_next_chunk(&mut self);

    /// Abort any pending transfer and release resources. Idempotent, and
    /// safe to call on a transport that was never connected.
    fn shutdown(&mut self);
}

pub trait ProgressiveTransport: Transport {
    /// Start fetching the first chunk.
    fn connect(&mut self);
}

pub trait SegmentedTransport: Transport {
    /// Fetch the manifest and the first segment.
    fn connect(&mut self, manifest_url: &str);
}

/// The strategy a queue entry is bound to. Dropping it shuts the transport
/// down, so every exit path (completion, skip, channel teardown) releases
/// the network resources.
pub enum Strategy {
    Progressive(Box<dyn ProgressiveTransport>),
    Segmented {
        handle: Box<dyn SegmentedTransport>,
        manifest_url: String,
    },
}

impl Strategy {
    pub fn is_segmented(&self) -> bool {
        matches!(self, Self::Segmented { .. })
    }

    pub fn connect(&mut self) {
        match self {
            Self::Progressive(handle) => handle.connect(),
            Self::Segmented {
                handle,
                manifest_url,
            } => handle.connect(manifest_url),
        }
    }

    pub fn request_next_chunk(&mut self) {
        match self {
            Self::Progressive(handle) => handle.request_next_chunk(),
            Self::Segmented { handle, .. } => handle.request_next_chunk(),
        }
    }

    pub fn shutdown(&mut self) {
        match self {
            Self::Progressive(handle) => handle.shutdown(),
            Self::Segmented { handle, .. } => handle.shutdown(),
        }
    }
}

impl Drop for Strategy {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Progressive(_) => f.write_str("Progressive"),
            Self::Segmented { manifest_url, .. } => {
                f.debug_struct("Segmented").field("manifest_url", manifest_url).finish()
            }
        }
    }
}

/// Builds transports for resolved stream locations.
pub trait TransportFactory: Send + Sync {
    fn progressive(
        &self,
        url: &str,
        content_length: Option<u64>,
        events: TransportEvents,
    ) -> Box<dyn ProgressiveTransport>;

    fn segmented(&self, events: TransportEvents) -> Box<dyn SegmentedTransport>;

    /// Bind a location to its strategy.
    fn bind(&self, location: &StreamLocation, events: TransportEvents) -> Strategy {
        match location {
            StreamLocation::Progressive {
                url,
                content_length,
                ..
            } => Strategy::Progressive(self.progressive(url, *content_length, events)),
            StreamLocation::Segmented { manifest_url } => Strategy::Segmented {
                handle: self.segmented(events),
                manifest_url: manifest_url.clone(),
            },
        }
    }
}

/// reqwest-backed transports.
#[derive(Clone)]
pub struct HttpTransportFactory {
    http: reqwest::Client,
    chunk_size: u64,
}

impl HttpTransportFactory {
    pub fn new(http: reqwest::Client, chunk_size: u64) -> Self {
        Self { http, chunk_size }
    }
}

impl TransportFactory for HttpTransportFactory {
    fn progressive(
        &self,
        url: &str,
        content_length: Option<u64>,
        events: TransportEvents,
    ) -> Box<dyn ProgressiveTransport> {
        Box::new(HttpProgressive::new(
            self.http.clone(),
            url.to_string(),
            content_length,
            self.chunk_size,
            events,
        ))
    }

    fn segmented(&self, events: TransportEvents) -> Box<dyn SegmentedTransport> {
        Box::new(HttpSegmented::new(self.http.clone(), events))
    }
}

/// Streams a response body into `Data` events, coalescing small network
/// reads. Returns the number of bytes delivered.
pub(crate) async fn forward_body(
    response: reqwest::Response,
    events: &TransportEvents,
) -> Result<u64, TransportError> {
    use crate::audio::constants::DATA_EVENT_COALESCE;
    use futures::StreamExt;

    let mut stream = response.bytes_stream();
    let mut pending = bytes::BytesMut::new();
    let mut delivered = 0u64;

    while let Some(item) = stream.next().await {
        let chunk = item?;
        delivered += chunk.len() as u64;
        pending.extend_from_slice(&chunk);
        if pending.len() >= DATA_EVENT_COALESCE && !events.data(pending.split().freeze()) {
            return Ok(delivered);
        }
    }
    if !pending.is_empty() {
        events.data(pending.freeze());
    }
    Ok(delivered)
}

/// GET with retries on connection errors and 5xx responses.
pub(crate) async fn get_with_retry(
    http: &reqwest::Client,
    url: &str,
    range: Option<(u64, u64)>,
) -> Result<reqwest::Response, TransportError> {
    use crate::audio::constants::{MAX_FETCH_RETRIES, RETRY_BACKOFF_MS};

    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut req = http
            .get(url)
            .header("Accept", "*/*")
            .header("Accept-Encoding", "identity");
        if let Some((start, end)) = range {
            req = req.header("Range", format!("bytes={}-{}", start, end));
        }

        let err = match req.send().await {
            Ok(res) if res.status().is_success() => return Ok(res),
            Ok(res) if !res.status().is_server_error() => {
                return Err(TransportError::Status {
                    status: res.status().as_u16(),
                    url: url.to_string(),
                });
            }
            Ok(res) => TransportError::Status {
                status: res.status().as_u16(),
                url: url.to_string(),
            },
            Err(e) => TransportError::Http(e),
        };

        if attempt > MAX_FETCH_RETRIES {
            return Err(err);
        }
        tracing::warn!("fetch attempt {} failed: {}; retrying", attempt, err);
        tokio::time::sleep(std::time::Duration::from_millis(
            RETRY_BACKOFF_MS * attempt as u64,
        ))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    struct Counting(Arc<AtomicUsize>);

    impl Transport for Counting {
        fn request_next_chunk(&mut self) {}
        fn shutdown(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ProgressiveTransport for Counting {
        fn connect(&mut self) {}
    }

    #[test]
    fn dropping_a_strategy_shuts_it_down() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let strategy = Strategy::Progressive(Box::new(Counting(shutdowns.clone())));
        assert!(!strategy.is_segmented());
        drop(strategy);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_are_tagged_with_their_owner() {
        let (tx, rx) = flume::unbounded();
        let token = TrackToken::next();
        let events = TransportEvents::new(ChannelId(7), token, tx);

        assert!(events.data(Bytes::from_static(b"abc")));
        assert!(events.complete());

        let first = rx.recv().unwrap();
        assert_eq!(first.channel, ChannelId(7));
        assert_eq!(first.token, token);
        assert!(matches!(first.kind, TransportEventKind::Data(ref b) if b.as_ref() == b"abc"));
        assert!(matches!(rx.recv().unwrap().kind, TransportEventKind::Complete));

        drop(rx);
        assert!(!events.chunk_complete());
    }
}
