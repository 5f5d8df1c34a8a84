//! Song / release metadata lookups and alternate-source search.
//!
//! Each backend lives in its own file as an `impl CatalogClient` block; the
//! JSON walking is kept in free functions so it can be checked against
//! captured responses.

pub mod itunes;
pub mod musicbrainz;
pub mod search;

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::{
    common::{errors::ResolveError, http::HttpClient},
    configs::CatalogConfig,
};

/// One song as described by iTunes, plus YouTube ids that likely carry it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SongInfo {
    pub artist: String,
    pub track: String,
    pub collection: String,
    pub cover_art_url: String,
    pub artist_apple_music_url: String,
    pub track_apple_music_url: String,
    pub collection_apple_music_url: String,
    pub youtube_candidates: Vec<String>,
}

/// A MusicBrainz release.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReleaseInfo {
    pub name: String,
    pub artists: Vec<String>,
    pub cover_art_url: Option<String>,
    pub tracks: Vec<String>,
}

pub struct CatalogClient {
    http: reqwest::Client,
    search_limit: usize,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig) -> Result<Self, ResolveError> {
        let http = HttpClient::new(Some(&config.user_agent), Duration::from_secs(10))?;
        Ok(Self {
            http,
            search_limit: config.search_limit,
        })
    }

    pub(crate) async fn get_json(&self, url: &str) -> Result<Value, ResolveError> {
        let res = self.http.get(url).send().await?;
        let status = res.status();
        if !status.is_success() {
            tracing::warn!("catalog request {} returned {}", url, status);
            return Err(ResolveError::Status(status.as_u16()));
        }
        Ok(res.json().await?)
    }
}

pub(crate) fn str_at(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}
