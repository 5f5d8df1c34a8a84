use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::types::AnyResult;
use crate::configs::*;

const CONFIG_CANDIDATES: &[&str] = &["config.toml", "config.default.toml"];

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub youtube: YouTubeConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads `config.toml`, then `config.default.toml`, then built-in defaults.
    pub fn load() -> AnyResult<Self> {
        let Some(config_path) = CONFIG_CANDIDATES
            .iter()
            .copied()
            .find(|p| Path::new(p).exists())
        else {
            crate::log_println!("No config file found, using built-in defaults");
            return Ok(Self::default());
        };

        crate::log_println!("Loading configuration from: {}", config_path);
        Self::from_file(config_path)
    }

    pub fn from_file(path: &str) -> AnyResult<Self> {
        let config_str = std::fs::read_to_string(path)?;
        if config_str.trim().is_empty() {
            return Err(format!("{} is empty", path).into());
        }
        Self::parse(&config_str)
    }

    pub fn parse(source: &str) -> AnyResult<Self> {
        let config: Config = toml::from_str(source)?;
        if config.player.low_watermark_frames > config.player.buffer_frames {
            return Err("player.low_watermark_frames must not exceed player.buffer_frames".into());
        }
        if config.player.chunk_size == 0 {
            return Err("player.chunk_size must be greater than zero".into());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sections_fall_back_to_defaults() {
        let config = Config::parse("[player]\n").unwrap();
        assert_eq!(config.player.chunk_size, 256 * 1024);
        assert_eq!(config.youtube.client_name, "ANDROID_VR");
        assert_eq!(config.catalog.search_limit, 5);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn parses_overrides() {
        let config = Config::parse(
            r#"
            [player]
            chunk_size = 1024
            buffer_frames = 100
            low_watermark_frames = 20

            [logging]
            level = "debug"

            [logging.file]
            path = "logs/ytstream.log"
            "#,
        )
        .unwrap();

        assert_eq!(config.player.chunk_size, 1024);
        assert_eq!(config.player.low_watermark_frames, 20);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.logging.file.unwrap().max_lines, 10_000);
    }

    #[test]
    fn rejects_watermark_above_capacity() {
        let err = Config::parse("[player]\nbuffer_frames = 10\nlow_watermark_frames = 11\n");
        assert!(err.is_err());
    }
}
