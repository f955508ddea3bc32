use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use audio_processor::utils::{ensure_dir_exists, sanitize_filename};
use audio_processor::{
    AppConfig, AudioFile, AudioFormat, AudioProcessor, AudioQuality, BatchProcessor,
    FfmpegEngine, ProcessingOptions, ProcessingPhase, ProcessingResult,
};

#[derive(Parser)]
#[command(
    name = "audio-processor",
    version,
    about = "Transcode, compress and analyze audio files with an embedded FFmpeg engine"
)]
struct Cli {
    /// Path to the ffmpeg binary (defaults to the configured one, then PATH)
    #[arg(long, global = true)]
    ffmpeg: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcode one file with explicit processing options
    Process {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format: mp3, wav, m4a, ogg or flac
        #[arg(short, long)]
        format: Option<String>,
        /// Quality preset: low, medium, high or lossless
        #[arg(short, long)]
        quality: Option<String>,
        /// Bitrate in kbps: 64, 128, 192, 256 or 320
        #[arg(short, long)]
        bitrate: Option<u32>,
        /// Sample rate in Hz: 22050, 44100, 48000 or 96000
        #[arg(long)]
        sample_rate: Option<u32>,
    },
    /// Convert one file to another container/codec with engine defaults
    Convert {
        input: PathBuf,
        /// Output format: mp3, wav, m4a, ogg or flac
        format: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Re-encode one file aiming at a target output size
    Compress {
        input: PathBuf,
        /// Target size in megabytes
        size_mb: f64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print an amplitude envelope of the file as a JSON array
    Waveform {
        input: PathBuf,
        /// Number of envelope buckets
        #[arg(short, long)]
        samples: Option<usize>,
    },
    /// Transcode many files sequentially, continuing past per-file failures
    Batch {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        format: Option<String>,
        #[arg(short, long)]
        quality: Option<String>,
        #[arg(short, long)]
        bitrate: Option<u32>,
        /// Directory the processed files are written to
        #[arg(short = 'd', long, default_value = "processed")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    let mut config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            AppConfig::default()
        }
    };
    if let Some(path) = cli.ffmpeg {
        config.ffmpeg_path = Some(path);
    }

    let engine = Arc::new(match &config.ffmpeg_path {
        Some(path) => FfmpegEngine::with_binary(path.clone()),
        None => FfmpegEngine::new(),
    });
    let processor = Arc::new(AudioProcessor::with_config(engine, config));

    let bar = progress_bar()?;
    {
        let bar = bar.clone();
        processor.set_progress_callback(move |progress| {
            match progress.phase {
                ProcessingPhase::Complete => bar.set_position(100),
                ProcessingPhase::Error => {}
                _ => bar.set_position(progress.percent as u64),
            }
            bar.set_message(progress.message);
        });
    }

    // Ctrl-C stops waiting on the current operation; the engine side is
    // best-effort (the ffmpeg child is killed when the call is dropped).
    {
        let processor = processor.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling current operation");
                processor.cancel();
            }
        });
    }

    let outcome = run_command(cli.command, &processor).await;
    bar.finish_and_clear();
    outcome
}

async fn run_command(command: Commands, processor: &Arc<AudioProcessor>) -> anyhow::Result<()> {
    match command {
        Commands::Process {
            input,
            output,
            format,
            quality,
            bitrate,
            sample_rate,
        } => {
            let file = AudioFile::from_path(&input).await?;
            let options = parse_options(format, quality, bitrate, sample_rate)?;
            let result = processor.process_audio(&file, &options).await?;
            write_result(&input, output, &result).await?;
        }
        Commands::Convert {
            input,
            format,
            output,
        } => {
            let file = AudioFile::from_path(&input).await?;
            let format: AudioFormat = format.parse()?;
            let result = processor.convert_format(&file, format).await?;
            write_result(&input, output, &result).await?;
        }
        Commands::Compress {
            input,
            size_mb,
            output,
        } => {
            let file = AudioFile::from_path(&input).await?;
            let result = processor.compress_audio(&file, size_mb).await?;
            write_result(&input, output, &result).await?;
        }
        Commands::Waveform { input, samples } => {
            let file = AudioFile::from_path(&input).await?;
            let waveform = processor.extract_waveform(&file, samples).await?;
            println!("{}", serde_json::to_string(&waveform)?);
        }
        Commands::Batch {
            inputs,
            format,
            quality,
            bitrate,
            out_dir,
        } => {
            let options = parse_options(format, quality, bitrate, None)?;
            let mut files = Vec::with_capacity(inputs.len());
            for input in &inputs {
                files.push(AudioFile::from_path(input).await?);
            }

            ensure_dir_exists(&out_dir).await?;
            let batch = BatchProcessor::new(processor.clone());
            let outcome = batch.process_batch(&files, &options).await;

            let mut succeeded = 0usize;
            for (index, (result, error)) in
                outcome.results.iter().zip(&outcome.errors).enumerate()
            {
                match result {
                    Some(result) => {
                        let path = batch_output_path(&out_dir, &inputs[index], &result.mime_type);
                        tokio::fs::write(&path, &result.data)
                            .await
                            .with_context(|| format!("writing {}", path.display()))?;
                        info!("Wrote {}", path.display());
                        succeeded += 1;
                    }
                    None => {
                        eprintln!("{}: {}", inputs[index].display(), error);
                    }
                }
            }
            info!("Batch done: {}/{} files processed", succeeded, inputs.len());
            if succeeded == 0 && !inputs.is_empty() {
                anyhow::bail!("every file in the batch failed");
            }
        }
    }
    Ok(())
}

fn parse_options(
    format: Option<String>,
    quality: Option<String>,
    bitrate: Option<u32>,
    sample_rate: Option<u32>,
) -> anyhow::Result<ProcessingOptions> {
    let format: Option<AudioFormat> = format.map(|s| s.parse()).transpose()?;
    let quality: Option<AudioQuality> = quality.map(|s| s.parse()).transpose()?;
    Ok(ProcessingOptions {
        format,
        quality,
        bitrate,
        sample_rate,
        compression: None,
    })
}

fn progress_bar() -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(100);
    bar.set_style(ProgressStyle::with_template(
        "[{bar:40.cyan/blue}] {pos:>3}% {msg}",
    )?);
    Ok(bar)
}

fn mime_extension(mime_type: &str) -> &str {
    mime_type.rsplit('/').next().unwrap_or("bin")
}

fn default_output_path(input: &Path, mime_type: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    PathBuf::from(format!(
        "{}.{}",
        sanitize_filename(&stem),
        mime_extension(mime_type)
    ))
}

fn batch_output_path(out_dir: &Path, input: &Path, mime_type: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    out_dir.join(format!(
        "{}.{}",
        sanitize_filename(&stem),
        mime_extension(mime_type)
    ))
}

async fn write_result(
    input: &Path,
    output: Option<PathBuf>,
    result: &ProcessingResult,
) -> anyhow::Result<()> {
    let path = output.unwrap_or_else(|| default_output_path(input, &result.mime_type));
    tokio::fs::write(&path, &result.data)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    info!("Wrote {} ({} bytes)", path.display(), result.data.len());
    Ok(())
}
