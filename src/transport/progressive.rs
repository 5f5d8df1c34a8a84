//! Progressive strategy: a single media URL fetched as a sequence of byte
//! ranges, one range per `request_next_chunk`.

use reqwest::{StatusCode, header::CONTENT_RANGE};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{ProgressiveTransport, Transport, TransportEvents, forward_body, get_with_retry};
use crate::common::errors::TransportError;

pub struct HttpProgressive {
    http: reqwest::Client,
    url: String,
    content_length: Option<u64>,
    chunk_size: u64,
    events: TransportEvents,
    next_tx: Option<flume::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl HttpProgressive {
    pub fn new(
        http: reqwest::Client,
        url: String,
        content_length: Option<u64>,
        chunk_size: u64,
        events: TransportEvents,
    ) -> Self {
        Self {
            http,
            url,
            content_length,
            chunk_size: chunk_size.max(1),
            events,
            next_tx: None,
            task: None,
        }
    }
}

impl Transport for HttpProgressive {
    fn request_next_chunk(&mut self) {
        if let Some(tx) = &self.next_tx {
            let _ = tx.send(());
        }
    }

    fn shutdown(&mut self) {
        self.next_tx = None;
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("progressive transfer {} shut down", self.events.token());
        }
    }
}

impl ProgressiveTransport for HttpProgressive {
    fn connect(&mut self) {
        if self.task.is_some() {
            return;
        }
        let (next_tx, next_rx) = flume::unbounded();
        self.next_tx = Some(next_tx);
        self.task = Some(tokio::spawn(run(
            self.http.clone(),
            self.url.clone(),
            self.content_length,
            self.chunk_size,
            self.events.clone(),
            next_rx,
        )));
    }
}

async fn run(
    http: reqwest::Client,
    url: String,
    mut total: Option<u64>,
    chunk_size: u64,
    events: TransportEvents,
    next_rx: flume::Receiver<()>,
) {
    let mut offset = 0u64;

    loop {
        let Some((start, end)) = next_range(offset, chunk_size, total) else {
            events.complete();
            return;
        };
        trace!("{} fetching bytes {}-{}", events.token(), start, end);

        let response = match get_with_retry(&http, &url, Some((start, end))).await {
            Ok(res) => res,
            // Unknown length and the previous range ended exactly at EOF.
            Err(TransportError::Status { status: 416, .. }) if offset > 0 => {
                events.complete();
                return;
            }
            Err(e) => {
                warn!("{} range request failed: {}", events.token(), e);
                events.failed(e);
                return;
            }
        };

        // Servers that ignore Range send the whole file in one go.
        if response.status() == StatusCode::OK {
            if let Err(e) = forward_body(response, &events).await {
                events.failed(e);
            } else {
                events.complete();
            }
            return;
        }

        if total.is_none() {
            total = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(total_from_content_range);
        }

        let received = match forward_body(response, &events).await {
            Ok(n) => n,
            Err(e) => {
                warn!("{} body read failed at offset {}: {}", events.token(), offset, e);
                events.failed(e);
                return;
            }
        };
        offset += received;

        let finished = match total {
            Some(total) => offset >= total,
            None => received < end - start + 1,
        };
        if finished || received == 0 {
            events.complete();
            return;
        }

        if !events.chunk_complete() || next_rx.recv_async().await.is_err() {
            return;
        }
    }
}

/// Inclusive byte range of the chunk starting at `offset`, or `None` when
/// the known length has been reached.
fn next_range(offset: u64, chunk_size: u64, total: Option<u64>) -> Option<(u64, u64)> {
    let mut end = offset + chunk_size - 1;
    if let Some(total) = total {
        if offset >= total {
            return None;
        }
        end = end.min(total - 1);
    }
    Some((offset, end))
}

/// Total length from a `Content-Range: bytes a-b/total` header.
fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_clamped_to_the_known_length() {
        assert_eq!(next_range(0, 100, Some(250)), Some((0, 99)));
        assert_eq!(next_range(200, 100, Some(250)), Some((200, 249)));
        assert_eq!(next_range(250, 100, Some(250)), None);
        assert_eq!(next_range(0, 100, Some(0)), None);
        assert_eq!(next_range(300, 100, None), Some((300, 399)));
    }

    #[test]
    fn content_range_total() {
        assert_eq!(total_from_content_range("bytes 0-99/3437104"), Some(3_437_104));
        assert_eq!(total_from_content_range("bytes 0-99/*"), None);
        assert_eq!(total_from_content_range("garbage"), None);
    }

    #[test]
    fn shutdown_before_connect_is_harmless() {
        let (tx, _rx) = flume::unbounded();
        let events = TransportEvents::new(
            crate::common::types::ChannelId(1),
            crate::common::types::TrackToken::next(),
            tx,
        );
        let mut transport =
            HttpProgressive::new(reqwest::Client::new(), "http://127.0.0.1:9/".into(), None, 0, events);
        transport.shutdown();
        transport.request_next_chunk();
        transport.shutdown();
        assert!(transport.task.is_none());
        assert_eq!(transport.chunk_size, 1);
    }
}
