//! Segmented strategy: a DASH manifest whose audio representation is fetched
//! one segment per `request_next_chunk`.

use reqwest::Url;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{
    SegmentedTransport, Transport, TransportEvents,
    dash::{Representation, parse_manifest},
    forward_body, get_with_retry,
};
use crate::common::errors::TransportError;

pub struct HttpSegmented {
    http: reqwest::Client,
    events: TransportEvents,
    next_tx: Option<flume::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl HttpSegmented {
    pub fn new(http: reqwest::Client, events: TransportEvents) -> Self {
        Self {
            http,
            events,
            next_tx: None,
            task: None,
        }
    }
}

impl Transport for HttpSegmented {
    fn request_next_chunk(&mut self) {
        if let Some(tx) = &self.next_tx {
            let _ = tx.send(());
        }
    }

    fn shutdown(&mut self) {
        self.next_tx = None;
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("segmented transfer {} shut down", self.events.token());
        }
    }
}

impl SegmentedTransport for HttpSegmented {
    fn connect(&mut self, manifest_url: &str) {
        if self.task.is_some() {
            return;
        }
        let (next_tx, next_rx) = flume::unbounded();
        self.next_tx = Some(next_tx);

        let http = self.http.clone();
        let events = self.events.clone();
        let manifest_url = manifest_url.to_string();
        self.task = Some(tokio::spawn(async move {
            match load_representation(&http, &manifest_url).await {
                Ok(rep) => stream_segments(&http, rep, &events, next_rx).await,
                Err(e) => {
                    warn!("{} manifest {} unusable: {}", events.token(), manifest_url, e);
                    events.failed(e);
                }
            }
        }));
    }
}

async fn load_representation(
    http: &reqwest::Client,
    manifest_url: &str,
) -> Result<Representation, TransportError> {
    let xml = get_with_retry(http, manifest_url, None).await?.text().await?;
    let manifest = parse_manifest(&xml, manifest_url)?;
    let rep = manifest
        .pick_audio()
        .cloned()
        .ok_or(TransportError::NoRepresentation)?;
    debug!(
        "representation {} ({} bps, {}) with {:?} segments",
        rep.id,
        rep.bandwidth,
        rep.codecs,
        rep.segment_count()
    );
    Ok(rep)
}

async fn stream_segments(
    http: &reqwest::Client,
    rep: Representation,
    events: &TransportEvents,
    next_rx: flume::Receiver<()>,
) {
    let mut index = 0usize;

    while let Some(url) = rep.segment_url(index) {
        if index > 0 && next_rx.recv_async().await.is_err() {
            return;
        }
        match fetch_segment(http, &url, events).await {
            Ok(bytes) => trace!("{} segment {} done ({} bytes)", events.token(), index, bytes),
            // Open-ended templates run until the server has no next segment.
            Err(TransportError::Status { status: 404, .. })
                if index > 0 && rep.segment_count().is_none() =>
            {
                break;
            }
            Err(e) => {
                warn!("{} segment {} failed: {}", events.token(), index, e);
                events.failed(e);
                return;
            }
        }
        if !events.segment_complete() {
            return;
        }
        index += 1;
    }

    events.complete();
}

async fn fetch_segment(
    http: &reqwest::Client,
    url: &Url,
    events: &TransportEvents,
) -> Result<u64, TransportError> {
    let response = get_with_retry(http, url.as_str(), None).await?;
    forward_body(response, events).await
}
