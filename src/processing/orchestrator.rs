use std::sync::{Arc, Mutex as StdMutex};

use log::{info, warn};
use tokio::sync::{watch, Mutex as TokioMutex};

use super::command::build_audio_command;
use super::estimate::SizeEstimator;
use super::{
    AudioFile, AudioFormat, ProcessingOptions, ProcessingPhase, ProcessingProgress,
    ProcessingResult,
};
use crate::config::AppConfig;
use crate::engine::{CodecEngine, EngineProgress};
use crate::errors::{AppError, Result};
use crate::utils::generate_job_id;
use crate::waveform;

pub type ProgressCallback = Arc<dyn Fn(ProcessingProgress) + Send + Sync>;

/// Façade over the codec engine. Owns the per-call progress state machine,
/// serializes engine access (the backend is not reentrant), and applies
/// option defaults. The engine is injected; the processor never constructs
/// ambient global state.
pub struct AudioProcessor {
    engine: Arc<dyn CodecEngine>,
    config: AppConfig,
    estimator: SizeEstimator,
    exec_lock: TokioMutex<()>,
    progress_callback: StdMutex<Option<ProgressCallback>>,
    cancel_tx: watch::Sender<u64>,
}

impl AudioProcessor {
    pub fn new(engine: Arc<dyn CodecEngine>) -> Self {
        Self::with_config(engine, AppConfig::default())
    }

    pub fn with_config(engine: Arc<dyn CodecEngine>, config: AppConfig) -> Self {
        let estimator = SizeEstimator::with_duration(config.assumed_duration_secs);
        let (cancel_tx, _) = watch::channel(0);
        Self {
            engine,
            config,
            estimator,
            exec_lock: TokioMutex::new(()),
            progress_callback: StdMutex::new(None),
            cancel_tx,
        }
    }

    /// Installs the single progress subscriber, replacing any previous one.
    pub fn set_progress_callback<F>(&self, callback: F)
    where
        F: Fn(ProcessingProgress) + Send + Sync + 'static,
    {
        *self.progress_callback.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn clear_progress_callback(&self) {
        *self.progress_callback.lock().unwrap() = None;
    }

    /// Best-effort cancellation: in-flight calls stop waiting and fail with
    /// "processing cancelled". Engine-side work that already started may
    /// still run to completion in the background.
    pub fn cancel(&self) {
        self.cancel_tx.send_modify(|generation| *generation += 1);
    }

    pub async fn process_audio(
        &self,
        file: &AudioFile,
        options: &ProcessingOptions,
    ) -> Result<ProcessingResult> {
        if let Err(err) = options.validate() {
            self.emit(ProcessingPhase::Error, 0.0, err.to_string(), None);
            return Err(err);
        }
        let resolved = options.resolve(&self.config);
        let format = resolved.format;
        info!("Started processing: {} -> {}", file.name, format);
        self.run_engine_job(
            file,
            format,
            |input, output| build_audio_command(input, output, &resolved),
            "Preparing audio for processing...".to_string(),
        )
        .await
    }

    pub async fn compress_audio(
        &self,
        file: &AudioFile,
        target_size_mb: f64,
    ) -> Result<ProcessingResult> {
        if !target_size_mb.is_finite() || target_size_mb < 0.0 {
            let err = AppError::InvalidInput(format!("Bad target size: {}MB", target_size_mb));
            self.emit(ProcessingPhase::Error, 0.0, err.to_string(), None);
            return Err(err);
        }
        let bitrate = self.estimator.target_bitrate_kbps(target_size_mb);
        info!(
            "Started compression: {} to ~{}MB at {}kbps",
            file.name, target_size_mb, bitrate
        );
        self.run_engine_job(
            file,
            AudioFormat::Mp3,
            |input, output| {
                vec![
                    "-i".to_string(),
                    input.to_string(),
                    "-b:a".to_string(),
                    format!("{}k", bitrate),
                    "-ar".to_string(),
                    "44100".to_string(),
                    output.to_string(),
                ]
            },
            format!("Compressing audio to {}MB...", target_size_mb),
        )
        .await
    }

    pub async fn convert_format(
        &self,
        file: &AudioFile,
        format: AudioFormat,
    ) -> Result<ProcessingResult> {
        info!("Started conversion: {} -> {}", file.name, format);
        self.run_engine_job(
            file,
            format,
            |input, output| {
                vec!["-i".to_string(), input.to_string(), output.to_string()]
            },
            format!("Converting to {}...", format.extension().to_uppercase()),
        )
        .await
    }

    /// Decodes in-process, without touching the codec engine; `buckets`
    /// defaults to the configured envelope size when `None`.
    pub async fn extract_waveform(
        &self,
        file: &AudioFile,
        buckets: Option<usize>,
    ) -> Result<Vec<f32>> {
        let buckets = buckets.unwrap_or(self.config.waveform_samples);
        info!("Extracting waveform: {} ({} buckets)", file.name, buckets);

        let data = file.data.clone();
        let extension = file.extension().map(str::to_string);
        let result = tokio::task::spawn_blocking(move || {
            waveform::extract(&data, extension.as_deref(), buckets)
        })
        .await
        .map_err(|e| AppError::Decode(format!("decoder task failed: {}", e)))?;

        match &result {
            Ok(_) => self.emit(
                ProcessingPhase::Complete,
                100.0,
                "Waveform extracted successfully",
                None,
            ),
            Err(err) => self.emit(ProcessingPhase::Error, 0.0, err.to_string(), None),
        }
        result
    }

    /// Shared pipeline: stage input, exec, read output, clean up, with the
    /// phased checkpoints every operation reports.
    async fn run_engine_job(
        &self,
        file: &AudioFile,
        output_format: AudioFormat,
        build: impl FnOnce(&str, &str) -> Vec<String>,
        init_message: String,
    ) -> Result<ProcessingResult> {
        self.emit(ProcessingPhase::Initializing, 0.0, init_message, None);

        // Unique per-call names keep a cancelled call's leftovers from
        // colliding with a later call in the shared namespace.
        let job = generate_job_id();
        let input_name = format!("{}-in.{}", job, file.extension().unwrap_or("wav"));
        let output_name = format!("{}-out.{}", job, output_format.extension());
        let args = build(&input_name, &output_name);

        let mut cancel_rx = self.cancel_tx.subscribe();
        let generation = *cancel_rx.borrow();

        let result = tokio::select! {
            biased;
            result = self.execute_staged(file, &input_name, &output_name, &args) => result,
            _ = cancelled(&mut cancel_rx, generation) => Err(AppError::Cancelled),
        };

        match result {
            Ok(data) => {
                info!("Completed processing: {}", file.name);
                self.emit(
                    ProcessingPhase::Complete,
                    100.0,
                    "Audio processing completed",
                    None,
                );
                Ok(ProcessingResult {
                    data,
                    mime_type: output_format.mime_type(),
                })
            }
            Err(err) => {
                warn!("Processing failed for {}: {}", file.name, err);
                self.emit(ProcessingPhase::Error, 0.0, err.to_string(), None);
                Err(err)
            }
        }
    }

    async fn execute_staged(
        &self,
        file: &AudioFile,
        input_name: &str,
        output_name: &str,
        args: &[String],
    ) -> Result<Vec<u8>> {
        // One engine sequence at a time, first come first served.
        let _guard = self.exec_lock.lock().await;
        self.engine.initialize().await?;

        self.install_progress_relay();
        let result = self.staged_sequence(file, input_name, output_name, args).await;
        self.engine.set_progress_handler(None);

        // Scratch entries are removed on success and failure alike; a missing
        // entry (e.g. no output after a failed exec) is not worth surfacing.
        for name in [input_name, output_name] {
            if let Err(err) = self.engine.delete_file(name).await {
                log::debug!("Cleanup of {} skipped: {}", name, err);
            }
        }

        result
    }

    async fn staged_sequence(
        &self,
        file: &AudioFile,
        input_name: &str,
        output_name: &str,
        args: &[String],
    ) -> Result<Vec<u8>> {
        self.engine.write_input(input_name, &file.data).await?;
        self.emit(
            ProcessingPhase::Processing,
            10.0,
            "Converting audio format...",
            None,
        );
        self.engine.exec(args).await?;
        self.emit(ProcessingPhase::Encoding, 90.0, "Finalizing audio...", None);
        self.engine.read_output(output_name).await
    }

    /// Relays engine ticks to the subscriber as `Processing` events. The
    /// backend's ratios are not guaranteed monotonic, so the displayed
    /// percent is clamped to be non-decreasing; values are never invented.
    fn install_progress_relay(&self) {
        let callback = self.progress_callback.lock().unwrap().clone();
        let Some(callback) = callback else {
            self.engine.set_progress_handler(None);
            return;
        };
        let last_percent = StdMutex::new(10.0f32);
        self.engine
            .set_progress_handler(Some(Box::new(move |progress: EngineProgress| {
                let percent = (f64::from(progress.ratio) * 100.0).round() as f32;
                let shown = {
                    let mut last = last_percent.lock().unwrap();
                    let shown = percent.clamp(0.0, 100.0).max(*last);
                    *last = shown;
                    shown
                };
                let time_remaining = progress
                    .time_secs
                    .filter(|t| *t > 0.0 && progress.ratio > 0.0)
                    .map(|t| {
                        let ratio = f64::from(progress.ratio);
                        (((1.0 - ratio) * t) / ratio).round().max(0.0) as u64
                    });
                callback(ProcessingProgress {
                    phase: ProcessingPhase::Processing,
                    percent: shown,
                    message: format!("Processing audio... {}%", shown as u32),
                    time_remaining,
                });
            })));
    }

    fn emit(
        &self,
        phase: ProcessingPhase,
        percent: f32,
        message: impl Into<String>,
        time_remaining: Option<u64>,
    ) {
        let callback = self.progress_callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(ProcessingProgress {
                phase,
                percent,
                message: message.into(),
                time_remaining,
            });
        }
    }
}

async fn cancelled(rx: &mut watch::Receiver<u64>, seen: u64) {
    loop {
        if *rx.borrow() > seen {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: cancellation can never arrive.
            std::future::pending::<()>().await;
        }
    }
}
