pub mod batch;
pub mod command;
pub mod estimate;
pub mod orchestrator;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};

pub const VALID_BITRATES_KBPS: [u32; 5] = [64, 128, 192, 256, 320];
pub const VALID_SAMPLE_RATES_HZ: [u32; 4] = [22050, 44100, 48000, 96000];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    M4a,
    Ogg,
    Flac,
}

impl AudioFormat {
    /// Encoder the engine should use for this output format.
    pub fn codec(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "libmp3lame",
            AudioFormat::Wav => "pcm_s16le",
            AudioFormat::M4a => "aac",
            AudioFormat::Ogg => "libvorbis",
            AudioFormat::Flac => "flac",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::M4a => "m4a",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Flac => "flac",
        }
    }

    pub fn mime_type(&self) -> String {
        format!("audio/{}", self.extension())
    }

    /// Lossy formats take an explicit bitrate; wav/flac never do.
    pub fn is_lossy(&self) -> bool {
        matches!(self, AudioFormat::Mp3 | AudioFormat::M4a | AudioFormat::Ogg)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "wav" => Ok(AudioFormat::Wav),
            "m4a" => Ok(AudioFormat::M4a),
            "ogg" => Ok(AudioFormat::Ogg),
            "flac" => Ok(AudioFormat::Flac),
            other => Err(AppError::InvalidInput(format!(
                "Unsupported audio format: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    Medium,
    High,
    Lossless,
}

impl AudioQuality {
    /// Codec quality scalar, inverse scale (lower is better). `Lossless` has
    /// no scalar; flac output maps it to a fixed compression level instead.
    pub fn q_scale(&self) -> Option<u32> {
        match self {
            AudioQuality::Low => Some(9),
            AudioQuality::Medium => Some(5),
            AudioQuality::High => Some(2),
            AudioQuality::Lossless => None,
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioQuality::Lossless)
    }
}

impl std::str::FromStr for AudioQuality {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(AudioQuality::Low),
            "medium" => Ok(AudioQuality::Medium),
            "high" => Ok(AudioQuality::High),
            "lossless" => Ok(AudioQuality::Lossless),
            other => Err(AppError::InvalidInput(format!(
                "Unsupported audio quality: {}",
                other
            ))),
        }
    }
}

/// Caller-supplied processing options. Every field is optional; defaults are
/// applied by the orchestrator, never by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingOptions {
    pub format: Option<AudioFormat>,
    pub quality: Option<AudioQuality>,
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub compression: Option<u8>,
}

impl ProcessingOptions {
    pub fn validate(&self) -> Result<()> {
        if let Some(bitrate) = self.bitrate {
            if !VALID_BITRATES_KBPS.contains(&bitrate) {
                return Err(AppError::InvalidInput(format!(
                    "Unsupported bitrate: {}kbps",
                    bitrate
                )));
            }
        }
        if let Some(rate) = self.sample_rate {
            if !VALID_SAMPLE_RATES_HZ.contains(&rate) {
                return Err(AppError::InvalidInput(format!(
                    "Unsupported sample rate: {}Hz",
                    rate
                )));
            }
        }
        if let Some(compression) = self.compression {
            if compression > 100 {
                return Err(AppError::InvalidInput(format!(
                    "Compression level out of range: {}",
                    compression
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn resolve(&self, defaults: &AppConfig) -> ResolvedOptions {
        ResolvedOptions {
            format: self.format.unwrap_or(defaults.default_format),
            quality: self.quality.unwrap_or(defaults.default_quality),
            bitrate: self.bitrate.unwrap_or(defaults.default_bitrate_kbps),
            sample_rate: Some(self.sample_rate.unwrap_or(defaults.default_sample_rate_hz)),
        }
    }
}

/// Options after the orchestrator has filled in defaults.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub format: AudioFormat,
    pub quality: AudioQuality,
    pub bitrate: u32,
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingPhase {
    Initializing,
    Processing,
    Encoding,
    Complete,
    Error,
}

impl ProcessingPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingPhase::Complete | ProcessingPhase::Error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingProgress {
    pub phase: ProcessingPhase,
    pub percent: f32,
    pub message: String,
    /// Estimated seconds remaining, when the engine reports enough to tell.
    pub time_remaining: Option<u64>,
}

/// Processed output. Owned by the caller; the orchestrator keeps no copy.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// An in-memory audio file handed to the pipeline.
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl AudioFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let data = tokio::fs::read(path).await?;
        Ok(Self { name, data })
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.name).extension().and_then(|e| e.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_follows_output_format() {
        assert_eq!(AudioFormat::Mp3.mime_type(), "audio/mp3");
        assert_eq!(AudioFormat::Wav.mime_type(), "audio/wav");
        assert_eq!(AudioFormat::M4a.mime_type(), "audio/m4a");
        assert_eq!(AudioFormat::Ogg.mime_type(), "audio/ogg");
        assert_eq!(AudioFormat::Flac.mime_type(), "audio/flac");
    }

    #[test]
    fn defaults_resolve_to_mp3_medium_192_44100() {
        let resolved = ProcessingOptions::default().resolve(&AppConfig::default());
        assert_eq!(resolved.format, AudioFormat::Mp3);
        assert_eq!(resolved.quality, AudioQuality::Medium);
        assert_eq!(resolved.bitrate, 192);
        assert_eq!(resolved.sample_rate, Some(44100));
    }

    #[test]
    fn explicit_options_survive_resolution() {
        let options = ProcessingOptions {
            format: Some(AudioFormat::Flac),
            quality: Some(AudioQuality::Lossless),
            bitrate: Some(320),
            sample_rate: Some(96000),
            compression: None,
        };
        let resolved = options.resolve(&AppConfig::default());
        assert_eq!(resolved.format, AudioFormat::Flac);
        assert_eq!(resolved.quality, AudioQuality::Lossless);
        assert_eq!(resolved.bitrate, 320);
        assert_eq!(resolved.sample_rate, Some(96000));
    }

    #[test]
    fn validation_rejects_off_menu_values() {
        let options = ProcessingOptions {
            bitrate: Some(100),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = ProcessingOptions {
            sample_rate: Some(8000),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = ProcessingOptions {
            compression: Some(101),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        assert!(ProcessingOptions::default().validate().is_ok());
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("MP3".parse::<AudioFormat>().unwrap(), AudioFormat::Mp3);
        assert_eq!("flac".parse::<AudioFormat>().unwrap(), AudioFormat::Flac);
        assert!("aiff".parse::<AudioFormat>().is_err());
    }
}
