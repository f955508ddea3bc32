use super::{AudioFormat, ResolvedOptions};

/// Builds the engine argument list for one transcode. Pure: no I/O, and no
/// reconciliation of conflicting quality/bitrate intents; both flags may be
/// present and the caller owns that tradeoff.
pub fn build_audio_command(input: &str, output: &str, options: &ResolvedOptions) -> Vec<String> {
    let mut command = vec!["-i".to_string(), input.to_string()];

    command.push("-c:a".to_string());
    command.push(options.format.codec().to_string());

    // Bitrate only applies to lossy output; wav/flac never take one.
    if options.format.is_lossy() {
        command.push("-b:a".to_string());
        command.push(format!("{}k", options.bitrate));
    }

    if let Some(rate) = options.sample_rate {
        command.push("-ar".to_string());
        command.push(rate.to_string());
    }

    match options.quality.q_scale() {
        Some(q) => {
            command.push("-q:a".to_string());
            command.push(q.to_string());
        }
        None => {
            // Lossless: no quality scalar; flac gets a fixed compression level.
            if options.format == AudioFormat::Flac {
                command.push("-compression_level".to_string());
                command.push("8".to_string());
            }
        }
    }

    command.push(output.to_string());
    command
}
