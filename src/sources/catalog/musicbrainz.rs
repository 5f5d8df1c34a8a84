use serde_json::Value;

use super::{CatalogClient, ReleaseInfo, str_at};
use crate::common::errors::ResolveError;

const MUSICBRAINZ_API: &str = "https://musicbrainz.org/ws/2";
const COVER_ART_ARCHIVE: &str = "https://coverartarchive.org/release";

impl CatalogClient {
    /// Best MusicBrainz release for `query`, with its track list and cover art.
    pub async fn release_info(&self, query: &str) -> Result<Option<ReleaseInfo>, ResolveError> {
        let url = format!(
            "{}/release?fmt=json&query={}",
            MUSICBRAINZ_API,
            urlencoding::encode(query)
        );
        let search = self.get_json(&url).await?;
        let Some((id, mut info)) = parse_release_search(&search) else {
            return Ok(None);
        };

        let url = format!(
            "{}/release/{}?inc=artists+collections+labels+recordings+release-groups&fmt=json",
            MUSICBRAINZ_API, id
        );
        let release = self.get_json(&url).await?;
        apply_release_lookup(&mut info, &release);
        Ok(Some(info))
    }
}

/// First release of a search response, with its MBID.
pub fn parse_release_search(body: &Value) -> Option<(String, ReleaseInfo)> {
    let release = body.pointer("/releases/0")?;
    let id = release.get("id")?.as_str()?.to_string();
    let artists = release
        .get("artist-credit")
        .and_then(|a| a.as_array())
        .map(|credits| {
            credits
                .iter()
                .filter_map(|c| c.get("name").and_then(|n| n.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some((
        id,
        ReleaseInfo {
            name: str_at(release, "/title"),
            artists,
            ..Default::default()
        },
    ))
}

/// Fill in cover art and track titles from a release lookup.
pub fn apply_release_lookup(info: &mut ReleaseInfo, release: &Value) {
    let has_artwork = release
        .pointer("/cover-art-archive/artwork")
        .and_then(|a| a.as_bool())
        .unwrap_or(false);
    if has_artwork {
        if let Some(id) = release.get("id").and_then(|i| i.as_str()) {
            info.cover_art_url = Some(format!("{}/{}.jpg", COVER_ART_ARCHIVE, id));
        }
    }

    info.tracks = release
        .get("media")
        .and_then(|m| m.as_array())
        .into_iter()
        .flatten()
        .filter_map(|medium| medium.get("tracks").and_then(|t| t.as_array()))
        .flatten()
        .filter_map(|track| track.get("title").and_then(|t| t.as_str()))
        .map(str::to_string)
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_then_lookup() {
        let search = json!({
            "releases": [{
                "id": "b84ee12a-09ef-421b-82de-0441a926375b",
                "title": "Discovery",
                "artist-credit": [{ "name": "Daft Punk" }]
            }]
        });
        let (id, mut info) = parse_release_search(&search).unwrap();
        assert_eq!(id, "b84ee12a-09ef-421b-82de-0441a926375b");
        assert_eq!(info.artists, vec!["Daft Punk".to_string()]);

        let lookup = json!({
            "id": id,
            "cover-art-archive": { "artwork": true },
            "media": [
                { "tracks": [{ "title": "One More Time" }, { "title": "Aerodynamic" }] },
                { "tracks": [{ "title": "Bonus" }] }
            ]
        });
        apply_release_lookup(&mut info, &lookup);
        assert_eq!(
            info.cover_art_url.as_deref(),
            Some("https://coverartarchive.org/release/b84ee12a-09ef-421b-82de-0441a926375b.jpg")
        );
        assert_eq!(info.tracks, vec!["One More Time", "Aerodynamic", "Bonus"]);
    }

    #[test]
    fn no_artwork_no_cover_url() {
        let mut info = ReleaseInfo::default();
        apply_release_lookup(&mut info, &json!({ "id": "x", "cover-art-archive": { "artwork": false } }));
        assert_eq!(info.cover_art_url, None);
        assert!(info.tracks.is_empty());
    }

    #[test]
    fn empty_search() {
        assert!(parse_release_search(&json!({ "releases": [] })).is_none());
    }
}
