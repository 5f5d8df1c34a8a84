pub mod format;
pub mod url;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

pub use format::{FormatCandidate, select_best_opus_format};
pub use url::extract_video_id;

use crate::{
    common::{errors::ResolveError, http::HttpClient},
    configs::YouTubeConfig,
    sources::{ResolvedSource, Resolver, StreamLocation, TrackInfo},
};

/// YouTube InnerTube API base endpoint.
pub const INNERTUBE_API: &str = "https://youtubei.googleapis.com";

/// Resolves video ids through the InnerTube `player` endpoint.
pub struct InnertubeResolver {
    http: reqwest::Client,
    config: YouTubeConfig,
}

impl InnertubeResolver {
    pub fn new(config: YouTubeConfig) -> Result<Self, ResolveError> {
        let http = HttpClient::new(
            Some(&config.user_agent),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self { http, config })
    }

    fn build_context(&self) -> Value {
        json!({
            "client": {
                "clientName": self.config.client_name,
                "clientVersion": self.config.client_version,
                "userAgent": self.config.user_agent,
                "hl": "en",
                "gl": "US"
            },
            "user": { "lockedSafetyMode": false },
            "request": { "useSsl": true }
        })
    }

    async fn player_request(&self, video_id: &str) -> Result<Value, ResolveError> {
        let body = json!({
            "context": self.build_context(),
            "videoId": video_id,
            "contentCheckOk": true,
            "racyCheckOk": true
        });

        let url = format!("{}/youtubei/v1/player?prettyPrint=false", INNERTUBE_API);

        let res = self
            .http
            .post(&url)
            .header("X-YouTube-Client-Name", &self.config.client_id)
            .header("X-YouTube-Client-Version", &self.config.client_version)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(ResolveError::Status(status.as_u16()));
        }

        Ok(res.json().await?)
    }
}

#[async_trait]
impl Resolver for InnertubeResolver {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn resolve(&self, video_id: &str) -> Result<ResolvedSource, ResolveError> {
        tracing::debug!("{} player request for {}", self.config.client_name, video_id);
        let body = self.player_request(video_id).await?;
        parse_player_response(video_id, &body)
    }
}

/// Map a `player` response to track metadata and a stream location.
///
/// A DASH manifest wins over direct format URLs.
pub fn parse_player_response(video_id: &str, body: &Value) -> Result<ResolvedSource, ResolveError> {
    let playability = body.get("playabilityStatus");
    let status = playability
        .and_then(|p| p.get("status"))
        .and_then(|s| s.as_str())
        .unwrap_or("UNKNOWN");

    if status != "OK" {
        let reason = playability
            .and_then(|p| p.get("reason"))
            .and_then(|r| r.as_str())
            .unwrap_or("no reason given")
            .to_string();
        tracing::warn!("video {} not playable (status={}): {}", video_id, status, reason);
        return Err(ResolveError::Unplayable {
            status: status.to_string(),
            reason,
        });
    }

    let info = extract_track_info(video_id, body);
    let streaming = body.get("streamingData");

    if let Some(manifest_url) = streaming
        .and_then(|s| s.get("dashManifestUrl"))
        .and_then(|u| u.as_str())
    {
        return Ok(ResolvedSource {
            info,
            location: StreamLocation::Segmented {
                manifest_url: manifest_url.to_string(),
            },
        });
    }

    // Only formats with a direct url are usable; ciphered ones are not resolved.
    let candidates: Vec<FormatCandidate> = ["formats", "adaptiveFormats"]
        .iter()
        .filter_map(|key| streaming.and_then(|s| s.get(*key)).and_then(|f| f.as_array()))
        .flatten()
        .map(FormatCandidate::from_json)
        .filter(|c| c.url.is_some())
        .collect();

    if candidates.is_empty() {
        return Err(ResolveError::NoPlayableFormat);
    }

    let chosen = &candidates[select_best_opus_format(&candidates)];
    let Some(url) = chosen.url.clone() else {
        return Err(ResolveError::NoPlayableFormat);
    };
    tracing::debug!(
        "video {}: itag {} ({}) out of {} candidates",
        video_id,
        chosen.itag,
        chosen.mime_type,
        candidates.len()
    );

    Ok(ResolvedSource {
        info,
        location: StreamLocation::Progressive {
            url,
            content_length: chosen.content_length,
            mime_type: chosen.mime_type.clone(),
        },
    })
}

fn extract_track_info(video_id: &str, body: &Value) -> TrackInfo {
    let details = body.get("videoDetails");
    let text = |key: &str| {
        details
            .and_then(|d| d.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };
    // lengthSeconds and viewCount arrive as decimal strings.
    let number = |key: &str| {
        details
            .and_then(|d| d.get(key))
            .and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_u64()))
            .unwrap_or(0)
    };

    let source_id = details
        .and_then(|d| d.get("videoId"))
        .and_then(|v| v.as_str())
        .unwrap_or(video_id)
        .to_string();

    TrackInfo {
        source_id,
        title: text("title"),
        author: text("author"),
        channel_ref: text("channelId"),
        description: text("shortDescription"),
        duration_seconds: number("lengthSeconds"),
        rating: details
            .and_then(|d| d.get("averageRating"))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0),
        view_count: number("viewCount"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> Value {
        json!({
            "videoId": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "author": "Rick Astley",
            "channelId": "UCuAXFkgsw1L7xaCfnd5JJOw",
            "shortDescription": "The official video",
            "lengthSeconds": "213",
            "averageRating": 4.9,
            "viewCount": "1500000000"
        })
    }

    #[test]
    fn dash_manifest_takes_precedence() {
        let body = json!({
            "playabilityStatus": { "status": "OK" },
            "videoDetails": details(),
            "streamingData": {
                "dashManifestUrl": "https://manifest.googlevideo.com/api/manifest/dash/id/1",
                "adaptiveFormats": [{
                    "itag": 251,
                    "url": "https://rr.example/251",
                    "mimeType": "audio/webm; codecs=\"opus\"",
                    "bitrate": 130000
                }]
            }
        });

        let resolved = parse_player_response("dQw4w9WgXcQ", &body).unwrap();
        assert!(resolved.location.is_segmented());
        assert_eq!(resolved.info.title, "Never Gonna Give You Up");
        assert_eq!(resolved.info.duration_seconds, 213);
        assert_eq!(resolved.info.view_count, 1_500_000_000);
        assert_eq!(resolved.info.channel_ref, "UCuAXFkgsw1L7xaCfnd5JJOw");
    }

    #[test]
    fn progressive_uses_the_selected_opus_format() {
        let body = json!({
            "playabilityStatus": { "status": "OK" },
            "videoDetails": details(),
            "streamingData": {
                "formats": [{
                    "itag": 18,
                    "url": "https://rr.example/18",
                    "mimeType": "video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"",
                    "width": 640,
                    "bitrate": 500000,
                    "audioQuality": "AUDIO_QUALITY_LOW"
                }],
                "adaptiveFormats": [
                    {
                        "itag": 250,
                        "url": "https://rr.example/250",
                        "mimeType": "audio/webm; codecs=\"opus\"",
                        "bitrate": 70000,
                        "audioQuality": "AUDIO_QUALITY_LOW",
                        "audioChannels": 2,
                        "contentLength": "1200000"
                    },
                    {
                        "itag": 251,
                        "url": "https://rr.example/251",
                        "mimeType": "audio/webm; codecs=\"opus\"",
                        "bitrate": 140000,
                        "audioQuality": "AUDIO_QUALITY_MEDIUM",
                        "audioChannels": 2,
                        "contentLength": "2400000"
                    },
                    {
                        "itag": 249,
                        "signatureCipher": "s=abc&url=https%3A%2F%2Frr.example%2F249",
                        "mimeType": "audio/webm; codecs=\"opus\"",
                        "bitrate": 999999
                    }
                ]
            }
        });

        let resolved = parse_player_response("dQw4w9WgXcQ", &body).unwrap();
        // 250: -(70000*2)/1 = -140000, 251: -(140000*2)/2 = -140000; first lowest wins.
        assert_eq!(
            resolved.location,
            StreamLocation::Progressive {
                url: "https://rr.example/250".into(),
                content_length: Some(1_200_000),
                mime_type: "audio/webm; codecs=\"opus\"".into(),
            }
        );
    }

    #[test]
    fn unplayable_videos_are_errors() {
        let body = json!({
            "playabilityStatus": { "status": "LOGIN_REQUIRED", "reason": "Sign in to confirm your age" }
        });
        let err = parse_player_response("x", &body).unwrap_err();
        assert!(matches!(err, ResolveError::Unplayable { ref status, .. } if status == "LOGIN_REQUIRED"));
    }

    #[test]
    fn no_direct_urls_means_no_playable_format() {
        let body = json!({
            "playabilityStatus": { "status": "OK" },
            "streamingData": { "adaptiveFormats": [{ "itag": 251, "signatureCipher": "s=1" }] }
        });
        assert!(matches!(
            parse_player_response("x", &body),
            Err(ResolveError::NoPlayableFormat)
        ));
    }
}
