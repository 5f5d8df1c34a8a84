use serde_json::Value;

use super::{CatalogClient, SongInfo, str_at};
use crate::common::errors::ResolveError;

const ITUNES_SEARCH: &str = "https://itunes.apple.com/search";

impl CatalogClient {
    /// iTunes lookup followed by a YouTube search for the matching song.
    ///
    /// When iTunes knows nothing the raw query is searched instead and only
    /// `youtube_candidates` is filled in.
    pub async fn song_info(&self, query: &str) -> Result<SongInfo, ResolveError> {
        let url = format!(
            "{}?limit=5&media=music&term={}",
            ITUNES_SEARCH,
            urlencoding::encode(query)
        );
        let body = self.get_json(&url).await?;

        let mut info = parse_itunes_song(&body).unwrap_or_default();
        let term = youtube_search_term(&info, query);
        tracing::debug!("song_info({}): searching youtube for {:?}", query, term);

        info.youtube_candidates = self.youtube_results(&term).await?;
        Ok(info)
    }
}

/// First result of an iTunes search response.
pub fn parse_itunes_song(body: &Value) -> Option<SongInfo> {
    if body.get("resultCount").and_then(|c| c.as_u64()).unwrap_or(0) == 0 {
        return None;
    }
    let first = body.pointer("/results/0")?;
    Some(SongInfo {
        artist: str_at(first, "/artistName"),
        track: str_at(first, "/trackName"),
        collection: str_at(first, "/collectionName"),
        cover_art_url: str_at(first, "/artworkUrl100"),
        artist_apple_music_url: str_at(first, "/artistViewUrl"),
        track_apple_music_url: str_at(first, "/trackViewUrl"),
        collection_apple_music_url: str_at(first, "/collectionViewUrl"),
        youtube_candidates: Vec::new(),
    })
}

/// Auto-generated "song only" uploads carry "Provided to YouTube by ..." in
/// their description, so searching for it favours them over music videos.
pub fn youtube_search_term(info: &SongInfo, query: &str) -> String {
    if info.artist.is_empty() && info.track.is_empty() {
        query.to_string()
    } else {
        format!("{} - {} Provided to Youtube", info.artist, info.track)
    }
}
