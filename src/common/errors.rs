use thiserror::Error;

/// Failures raised while demultiplexing a WebM stream.
///
/// Every variant is fatal for the track being parsed; the channel itself
/// keeps going with the next queue entry.
#[derive(Debug, Error)]
pub enum DemuxError {
    /// The stream's track is not 48 kHz Opus audio.
    #[error("unsupported track: type={track_type}, codec={codec_id:?}, rate={sampling_frequency}")]
    InvalidTrack {
        track_type: u64,
        codec_id: String,
        sampling_frequency: f64,
    },
    /// The bytes violate the EBML/Matroska grammar.
    #[error("malformed container: {0}")]
    Malformed(&'static str),
    /// An element that has to be buffered whole declares an absurd size.
    #[error("element 0x{id:X} too large ({size} bytes)")]
    ElementTooLarge { id: u32, size: u64 },
    /// The stream ended in the middle of an element.
    #[error("stream ended inside element 0x{id:X}")]
    Truncated { id: u32 },
}

impl DemuxError {
    pub fn is_unsupported_track(&self) -> bool {
        matches!(self, Self::InvalidTrack { .. })
    }
}

/// Failures raised while turning a source reference into a playable track.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("not a recognised video url or id: {0}")]
    InvalidSource(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response status {0}")]
    Status(u16),
    #[error("invalid response body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("video is not playable ({status}): {reason}")]
    Unplayable { status: String, reason: String },
    #[error("no playable audio format")]
    NoPlayableFormat,
}

/// Failures raised by a download strategy while fetching media bytes.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request to {url} failed with status {status}")]
    Status { status: u16, url: String },
    #[error("invalid manifest: {0}")]
    Manifest(String),
    #[error("manifest has no usable audio representation")]
    NoRepresentation,
}

/// Why a track left the queue early. Reported to the sink; the channel
/// moves on to the next entry either way.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error(transparent)]
    Demux(#[from] DemuxError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_errors_wrap_their_source() {
        let err: TrackError = DemuxError::Truncated { id: 0x1F43B675 }.into();
        assert!(matches!(err, TrackError::Demux(DemuxError::Truncated { .. })));
        assert_eq!(err.to_string(), "stream ended inside element 0x1F43B675");

        let err: TrackError = TransportError::NoRepresentation.into();
        assert!(err.to_string().contains("no usable audio representation"));
    }

    #[test]
    fn invalid_track_is_reported_as_unsupported() {
        let err = DemuxError::InvalidTrack {
            track_type: 2,
            codec_id: "A_VORBIS".into(),
            sampling_frequency: 48000.0,
        };
        assert!(err.is_unsupported_track());
        assert!(err.to_string().contains("A_VORBIS"));
        assert!(!DemuxError::Malformed("bad vint").is_unsupported_track());
    }
}
