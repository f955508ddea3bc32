use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to initialize audio processor: {0}")]
    Initialization(String),

    #[error("Engine IO error: {0}")]
    EngineIo(String),

    #[error("Audio processing failed: {0}")]
    Execution(String),

    #[error("Failed to extract waveform data: {0}")]
    Decode(String),

    #[error("processing cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
