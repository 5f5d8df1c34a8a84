use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlayerConfig {
    /// Bytes requested per progressive range request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Frames the sink keeps buffered at most.
    #[serde(default = "default_buffer_frames")]
    pub buffer_frames: usize,
    /// Below this many buffered frames the sink asks for the next chunk.
    #[serde(default = "default_low_watermark_frames")]
    pub low_watermark_frames: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            buffer_frames: default_buffer_frames(),
            low_watermark_frames: default_low_watermark_frames(),
        }
    }
}

fn default_chunk_size() -> u64 {
    256 * 1024
}

fn default_buffer_frames() -> usize {
    500
}

fn default_low_watermark_frames() -> usize {
    150
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
        }
    }
}

fn default_output_path() -> String {
    "output.opus-frames".to_string()
}
