use std::sync::OnceLock;

use regex::Regex;

/// `https://www.youtube.com/watch?v=ID`, `youtu.be/ID`, `/shorts/ID`,
/// `/embed/ID`, `/live/ID` and the `music.` / `m.` hosts.
const VIDEO_URL_PATTERN: &str = r"^(?:https?://)?(?:(?:www|m|music)\.)?(?:youtube\.com/(?:watch\?(?:.*&)?v=|shorts/|embed/|live/|v/)|youtu\.be/)([A-Za-z0-9_-]{11})(?:[?&#/].*)?$";

const VIDEO_ID_PATTERN: &str = r"^[A-Za-z0-9_-]{11}$";

fn video_url_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(VIDEO_URL_PATTERN).ok()).as_ref()
}

fn video_id_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(VIDEO_ID_PATTERN).ok()).as_ref()
}

/// The 11-character video id of a YouTube watch/share URL.
pub fn extract_video_id(url: &str) -> Option<String> {
    video_url_regex()?
        .captures(url.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn is_video_id(candidate: &str) -> bool {
    video_id_regex().is_some_and(|re| re.is_match(candidate))
}
