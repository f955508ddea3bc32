use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::{AppError, Result};
use crate::processing::{AudioFormat, AudioQuality};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Explicit path to the ffmpeg binary. `None` means the one on PATH.
    pub ffmpeg_path: Option<PathBuf>,
    pub default_format: AudioFormat,
    pub default_quality: AudioQuality,
    pub default_bitrate_kbps: u32,
    pub default_sample_rate_hz: u32,
    /// Number of envelope buckets produced by waveform extraction.
    pub waveform_samples: usize,
    /// Duration assumed by the size estimator when the real duration is unknown.
    pub assumed_duration_secs: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            default_format: AudioFormat::Mp3,
            default_quality: AudioQuality::Medium,
            default_bitrate_kbps: 192,
            default_sample_rate_hz: 44100,
            waveform_samples: 1000,
            assumed_duration_secs: 60.0,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: AppConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            let config = AppConfig::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        let config_dir = config_path.parent().ok_or_else(|| {
            AppError::Config(config::ConfigError::Message(
                "Config path has no parent directory".to_string(),
            ))
        })?;

        if !config_dir.exists() {
            std::fs::create_dir_all(config_dir)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            AppError::Config(config::ConfigError::Message(
                "Could not find config directory".to_string(),
            ))
        })?;

        Ok(config_dir.join("audio-processor").join("config.json"))
    }
}
