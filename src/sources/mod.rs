pub mod catalog;
pub mod youtube;

use async_trait::async_trait;

use crate::common::errors::ResolveError;

pub use youtube::{InnertubeResolver, extract_video_id};

/// What a caller hands the player: a watch URL or a bare video id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    VideoId(String),
    Url(String),
}

impl SourceRef {
    /// Classify free-form input. Returns `None` for anything that is neither
    /// a video URL nor an 11-character id.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if youtube::url::is_video_id(input) {
            Some(Self::VideoId(input.to_string()))
        } else if extract_video_id(input).is_some() {
            Some(Self::Url(input.to_string()))
        } else {
            None
        }
    }

    pub fn video_id(&self) -> Result<String, ResolveError> {
        match self {
            Self::VideoId(id) => Ok(id.clone()),
            Self::Url(url) => {
                extract_video_id(url).ok_or_else(|| ResolveError::InvalidSource(url.clone()))
            }
        }
    }
}

/// Descriptive metadata, fixed at resolution time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackInfo {
    pub source_id: String,
    pub title: String,
    pub author: String,
    pub channel_ref: String,
    pub description: String,
    pub duration_seconds: u64,
    pub rating: f64,
    pub view_count: u64,
}

/// Where the media bytes come from, and therefore which download strategy
/// the track binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLocation {
    /// One continuous file fetched in ranges.
    Progressive {
        url: String,
        content_length: Option<u64>,
        mime_type: String,
    },
    /// A DASH manifest listing the segments to fetch in order.
    Segmented { manifest_url: String },
}

impl StreamLocation {
    pub fn is_segmented(&self) -> bool {
        matches!(self, Self::Segmented { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub info: TrackInfo,
    pub location: StreamLocation,
}

/// Turns a video id into metadata plus a stream location.
#[async_trait]
pub trait Resolver: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(&self, video_id: &str) -> Result<ResolvedSource, ResolveError>;
}
