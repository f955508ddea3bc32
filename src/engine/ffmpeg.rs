use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use log::{debug, error, info};
use regex::Regex;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::{CodecEngine, EngineProgress, EngineState, ProgressHandler};
use crate::errors::{AppError, Result};

/// Codec engine backed by the system `ffmpeg` binary. The engine's virtual
/// file namespace is a private scratch directory; command arguments reference
/// bare entry names, resolved against that directory at execution time.
pub struct FfmpegEngine {
    binary: PathBuf,
    state: Mutex<EngineState>,
    init_lock: tokio::sync::Mutex<()>,
    workdir: Mutex<Option<TempDir>>,
    progress_handler: Mutex<Option<ProgressHandler>>,
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self::with_binary(PathBuf::from("ffmpeg"))
    }

    pub fn with_binary(binary: PathBuf) -> Self {
        Self {
            binary,
            state: Mutex::new(EngineState::Uninitialized),
            init_lock: tokio::sync::Mutex::new(()),
            workdir: Mutex::new(None),
            progress_handler: Mutex::new(None),
        }
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock().unwrap() = state;
    }

    fn require_ready(&self) -> Result<()> {
        match self.state() {
            EngineState::Ready => Ok(()),
            EngineState::Failed => Err(AppError::Initialization(
                "engine previously failed to load".to_string(),
            )),
            _ => Err(AppError::EngineIo("engine not initialized".to_string())),
        }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let guard = self.workdir.lock().unwrap();
        let dir = guard
            .as_ref()
            .ok_or_else(|| AppError::EngineIo("engine not initialized".to_string()))?;
        Ok(dir.path().join(name))
    }

    fn workdir_path(&self) -> Result<PathBuf> {
        let guard = self.workdir.lock().unwrap();
        let dir = guard
            .as_ref()
            .ok_or_else(|| AppError::EngineIo("engine not initialized".to_string()))?;
        Ok(dir.path().to_path_buf())
    }

    fn emit_progress(&self, progress: EngineProgress) {
        if let Some(handler) = self.progress_handler.lock().unwrap().as_ref() {
            handler(progress);
        }
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodecEngine for FfmpegEngine {
    async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        match self.state() {
            EngineState::Ready => return Ok(()),
            EngineState::Failed => {
                return Err(AppError::Initialization(
                    "engine previously failed to load".to_string(),
                ))
            }
            _ => {}
        }

        self.set_state(EngineState::Loading);
        info!("Loading codec engine: {}", self.binary.display());

        let probe = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match probe {
            Ok(status) if status.success() => {}
            Ok(status) => {
                self.set_state(EngineState::Failed);
                return Err(AppError::Initialization(format!(
                    "{} exited with {}",
                    self.binary.display(),
                    status
                )));
            }
            Err(e) => {
                self.set_state(EngineState::Failed);
                return Err(AppError::Initialization(format!(
                    "could not run {}: {}",
                    self.binary.display(),
                    e
                )));
            }
        }

        let workdir = match TempDir::new() {
            Ok(dir) => dir,
            Err(e) => {
                self.set_state(EngineState::Failed);
                return Err(AppError::Initialization(format!(
                    "could not create scratch directory: {}",
                    e
                )));
            }
        };
        debug!("Engine scratch directory: {}", workdir.path().display());
        *self.workdir.lock().unwrap() = Some(workdir);

        self.set_state(EngineState::Ready);
        info!("Codec engine ready");
        Ok(())
    }

    fn state(&self) -> EngineState {
        *self.state.lock().unwrap()
    }

    fn set_progress_handler(&self, handler: Option<ProgressHandler>) {
        *self.progress_handler.lock().unwrap() = handler;
    }

    async fn write_input(&self, name: &str, data: &[u8]) -> Result<()> {
        self.require_ready()?;
        let path = self.resolve(name)?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::EngineIo(format!("failed to write {}: {}", name, e)))?;
        debug!("Staged {} ({} bytes)", name, data.len());
        Ok(())
    }

    async fn exec(&self, args: &[String]) -> Result<()> {
        self.require_ready()?;
        let workdir = self.workdir_path()?;
        debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(["-hide_banner", "-nostdin", "-y", "-progress", "pipe:1"])
            .args(args)
            .current_dir(&workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AppError::Execution(format!("failed to spawn {}: {}", self.binary.display(), e))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Execution("missing stdout handle".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Execution("missing stderr handle".to_string()))?;

        // The total duration shows up early on stderr; progress ticks arrive
        // on the progress pipe and only become a ratio once it is known.
        let duration = Arc::new(Mutex::new(None::<f64>));
        let duration_writer = duration.clone();
        let stderr_task = tokio::spawn(async move {
            let mut log = String::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if duration_writer.lock().unwrap().is_none() {
                    if let Some(secs) = parse_duration_line(&line) {
                        *duration_writer.lock().unwrap() = Some(secs);
                    }
                }
                log.push_str(&line);
                log.push('\n');
            }
            log
        });

        let mut out_lines = BufReader::new(stdout).lines();
        while let Some(line) = out_lines
            .next_line()
            .await
            .map_err(|e| AppError::Execution(format!("progress pipe failed: {}", e)))?
        {
            if let Some(time_secs) = parse_out_time_line(&line) {
                let total = *duration.lock().unwrap();
                if let Some(total) = total.filter(|t| *t > 0.0) {
                    let ratio = (time_secs / total).clamp(0.0, 1.0) as f32;
                    self.emit_progress(EngineProgress {
                        ratio,
                        time_secs: Some(time_secs),
                    });
                }
            } else if line.starts_with("progress=end") {
                self.emit_progress(EngineProgress {
                    ratio: 1.0,
                    time_secs: None,
                });
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| AppError::Execution(format!("failed to wait for ffmpeg: {}", e)))?;
        let stderr_log = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let detail = stderr_tail(&stderr_log);
            error!("ffmpeg exited with {}: {}", status, detail);
            return Err(AppError::Execution(detail));
        }
        Ok(())
    }

    async fn read_output(&self, name: &str) -> Result<Vec<u8>> {
        self.require_ready()?;
        let path = self.resolve(name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| AppError::EngineIo(format!("failed to read {}: {}", name, e)))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        self.require_ready()?;
        let path = self.resolve(name)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| AppError::EngineIo(format!("failed to delete {}: {}", name, e)))
    }
}

fn duration_re() -> &'static Regex {
    static DURATION_RE: OnceLock<Regex> = OnceLock::new();
    DURATION_RE.get_or_init(|| {
        Regex::new(r"Duration:\s*(\d+):(\d+):(\d+(?:\.\d+)?)").expect("valid regex")
    })
}

/// Parses the `Duration: HH:MM:SS.cc` header ffmpeg prints for its input.
fn parse_duration_line(line: &str) -> Option<f64> {
    let caps = duration_re().captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parses one `out_time_us=N` progress-pipe line into seconds.
fn parse_out_time_line(line: &str) -> Option<f64> {
    let value = line.strip_prefix("out_time_us=")?;
    let micros: i64 = value.trim().parse().ok()?;
    Some(micros.max(0) as f64 / 1_000_000.0)
}

fn stderr_tail(log: &str) -> String {
    let lines: Vec<&str> = log.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail_start = lines.len().saturating_sub(4);
    let tail = lines[tail_start..].join("; ");
    if tail.is_empty() {
        "codec execution failed".to_string()
    } else {
        tail
    }
}
