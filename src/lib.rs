//! Audio processing pipeline: transcode, compress and analyze audio files by
//! driving an external FFmpeg engine through a staged command interface, with
//! phased progress reporting, cancellation and sequential batch support.

pub mod config;
pub mod engine;
pub mod errors;
pub mod processing;
pub mod utils;
pub mod waveform;

pub use config::AppConfig;
pub use engine::ffmpeg::FfmpegEngine;
pub use engine::{CodecEngine, EngineProgress, EngineState};
pub use errors::{AppError, Result};
pub use processing::batch::{BatchOutcome, BatchProcessor, BatchState};
pub use processing::estimate::SizeEstimator;
pub use processing::orchestrator::AudioProcessor;
pub use processing::{
    AudioFile, AudioFormat, AudioQuality, ProcessingOptions, ProcessingPhase, ProcessingProgress,
    ProcessingResult,
};
