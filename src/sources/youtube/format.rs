//! Opus format selection over the `formats` / `adaptiveFormats` of a player
//! response.

use serde_json::Value;

/// One candidate encoding, reduced to the attributes the selector scores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatCandidate {
    pub itag: i64,
    pub has_audio: bool,
    pub has_video: bool,
    pub mime_type: String,
    pub width: i64,
    pub fps: i64,
    pub bitrate: i64,
    pub audio_channels: i64,
    pub audio_quality: i64,
    pub url: Option<String>,
    pub content_length: Option<u64>,
}

/// Numeric index for InnerTube's `audioQuality` strings.
pub fn audio_quality_index(quality: Option<&str>) -> i64 {
    match quality {
        Some("AUDIO_QUALITY_HIGH") | Some("HIGH") => 3,
        Some("AUDIO_QUALITY_MEDIUM") | Some("MEDIUM") => 2,
        _ => 1,
    }
}

impl FormatCandidate {
    /// Build a candidate from one entry of `formats` / `adaptiveFormats`.
    pub fn from_json(format: &Value) -> Self {
        let mime_type = format
            .get("mimeType")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let int = |key: &str| format.get(key).and_then(|v| v.as_i64()).unwrap_or(0);

        // Muxed formats carry both; adaptive ones only the side named by the mime type.
        let has_video = mime_type.starts_with("video/");
        let has_audio = mime_type.starts_with("audio/")
            || (has_video && format.get("audioQuality").is_some());

        Self {
            itag: int("itag"),
            has_audio,
            has_video,
            width: int("width"),
            fps: int("fps"),
            bitrate: int("bitrate"),
            audio_channels: format
                .get("audioChannels")
                .and_then(|v| v.as_i64())
                .unwrap_or(if has_audio { 2 } else { 0 }),
            audio_quality: audio_quality_index(format.get("audioQuality").and_then(|v| v.as_str())),
            url: format.get("url").and_then(|v| v.as_str()).map(str::to_string),
            content_length: format
                .get("contentLength")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok()),
            mime_type,
        }
    }

    fn score(&self) -> i64 {
        let base = if self.has_video {
            if self.has_audio { 1 } else { 2 }
        } else {
            0
        };
        if base != 0 {
            base + self.width + self.fps + self.bitrate
        } else {
            -(self.bitrate * self.audio_channels) / self.audio_quality.max(1)
        }
    }
}

/// Index of the Opus candidate with the lowest score.
///
/// Candidates without audio or whose mime type does not mention `opus` are
/// ignored. The running best starts at 0, so muxed formats (positive scores)
/// are never picked and index 0 is returned when nothing scores below 0.
/// Audio-only candidates score `-(bitrate * channels) / quality`.
pub fn select_best_opus_format(candidates: &[FormatCandidate]) -> usize {
    let mut idx = 0;
    let mut best = 0i64;
    for (i, candidate) in candidates.iter().enumerate() {
        if !candidate.has_audio || !candidate.mime_type.contains("opus") {
            continue;
        }
        let score = candidate.score();
        if score < best {
            best = score;
            idx = i;
        }
    }
    idx
}
