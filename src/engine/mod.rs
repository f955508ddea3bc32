pub mod ffmpeg;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;

use crate::errors::Result;

/// Lifecycle of one engine instance. `Uninitialized -> Loading -> Ready`
/// happens exactly once; `Ready` is permanent and `Failed` is fatal for the
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

/// One backend progress tick during an execution.
#[derive(Debug, Clone, Copy)]
pub struct EngineProgress {
    /// Fraction of the execution completed, 0.0..=1.0.
    pub ratio: f32,
    /// Media time processed so far, in seconds, when the backend reports it.
    pub time_secs: Option<f64>,
}

pub type ProgressHandler = Box<dyn Fn(EngineProgress) + Send + Sync>;

/// The decode/encode backend behind a command-style interface. The backend is
/// not reentrant: callers must never overlap two write/exec/read/delete
/// sequences against the same instance.
#[async_trait]
pub trait CodecEngine: Send + Sync {
    /// Idempotent load. A failure here is fatal for this instance and every
    /// later call on it.
    async fn initialize(&self) -> Result<()>;

    fn state(&self) -> EngineState;

    /// Installs the single active progress handler. Each new operation
    /// overwrites the previous handler before `exec`; there is no
    /// multiplexing across operations.
    fn set_progress_handler(&self, handler: Option<ProgressHandler>);

    async fn write_input(&self, name: &str, data: &[u8]) -> Result<()>;

    async fn exec(&self, args: &[String]) -> Result<()>;

    async fn read_output(&self, name: &str) -> Result<Vec<u8>>;

    async fn delete_file(&self, name: &str) -> Result<()>;
}
