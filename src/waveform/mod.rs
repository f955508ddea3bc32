use std::io::Cursor;

use log::debug;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::errors::{AppError, Result};

pub const DEFAULT_BUCKETS: usize = 1000;

/// Downsamples decoded audio into an average-absolute-amplitude envelope of
/// exactly `buckets` values. Only the first channel is read; additional
/// channels are ignored, not averaged.
pub fn extract(data: &[u8], extension: Option<&str>, buckets: usize) -> Result<Vec<f32>> {
    if buckets == 0 {
        return Err(AppError::InvalidInput(
            "waveform bucket count must be non-zero".to_string(),
        ));
    }
    let samples = decode_first_channel(data, extension)?;
    Ok(envelope(&samples, buckets))
}

fn decode_first_channel(data: &[u8], extension: Option<&str>) -> Result<Vec<f32>> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AppError::Decode(format!("unsupported container: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AppError::Decode("no audio tracks found".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AppError::Decode(format!("unsupported codec: {}", e)))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AppError::Decode(format!("corrupt stream: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => append_first_channel(&decoded, &mut samples),
            Err(SymphoniaError::DecodeError(e)) => {
                return Err(AppError::Decode(format!("corrupt stream: {}", e)))
            }
            Err(e) => return Err(AppError::Decode(e.to_string())),
        }
    }

    debug!("Decoded {} samples from the first channel", samples.len());
    Ok(samples)
}

fn append_first_channel(decoded: &AudioBufferRef, out: &mut Vec<f32>) {
    match decoded {
        AudioBufferRef::F32(buf) => out.extend(buf.chan(0).iter().copied()),
        AudioBufferRef::F64(buf) => out.extend(buf.chan(0).iter().map(|s| *s as f32)),
        AudioBufferRef::S8(buf) => out.extend(buf.chan(0).iter().map(|s| f32::from(*s) / 128.0)),
        AudioBufferRef::S16(buf) => {
            out.extend(buf.chan(0).iter().map(|s| f32::from(*s) / 32768.0))
        }
        AudioBufferRef::S24(buf) => {
            out.extend(buf.chan(0).iter().map(|s| s.inner() as f32 / 8_388_608.0))
        }
        AudioBufferRef::S32(buf) => {
            out.extend(buf.chan(0).iter().map(|s| *s as f32 / 2_147_483_648.0))
        }
        AudioBufferRef::U8(buf) => {
            out.extend(buf.chan(0).iter().map(|s| (f32::from(*s) - 128.0) / 128.0))
        }
        AudioBufferRef::U16(buf) => out.extend(
            buf.chan(0)
                .iter()
                .map(|s| (f32::from(*s) - 32768.0) / 32768.0),
        ),
        AudioBufferRef::U24(buf) => out.extend(
            buf.chan(0)
                .iter()
                .map(|s| (s.inner() as f32 - 8_388_608.0) / 8_388_608.0),
        ),
        AudioBufferRef::U32(buf) => out.extend(
            buf.chan(0)
                .iter()
                .map(|s| (f64::from(*s) / 2_147_483_648.0 - 1.0) as f32),
        ),
    }
}

fn envelope(samples: &[f32], buckets: usize) -> Vec<f32> {
    let block_size = samples.len() / buckets;
    let mut out = vec![0.0f32; buckets];
    // Fewer samples than buckets: every range is empty, every bucket is zero.
    if block_size == 0 {
        return out;
    }
    for (i, bucket) in out.iter_mut().enumerate() {
        let start = i * block_size;
        let end = ((i + 1) * block_size).min(samples.len());
        let sum: f32 = samples[start..end].iter().map(|s| s.abs()).sum();
        *bucket = sum / block_size as f32;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(channels: u16, frames: &[Vec<i16>]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for frame in frames {
                for sample in frame {
                    writer.write_sample(*sample).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn mono_wav(samples: &[i16]) -> Vec<u8> {
        wav_bytes(1, &samples.iter().map(|s| vec![*s]).collect::<Vec<_>>())
    }

    #[test]
    fn envelope_has_exactly_the_requested_length() {
        let data = mono_wav(&vec![1000i16; 44100]);
        for buckets in [1, 16, 100, 1000] {
            let waveform = extract(&data, Some("wav"), buckets).unwrap();
            assert_eq!(waveform.len(), buckets);
        }
    }

    #[test]
    fn envelope_values_are_never_negative() {
        let samples: Vec<i16> = (0..44100)
            .map(|i| ((i as f32 * 0.05).sin() * 20000.0) as i16)
            .collect();
        let data = mono_wav(&samples);
        let waveform = extract(&data, Some("wav"), 200).unwrap();
        assert!(waveform.iter().all(|v| *v >= 0.0));
        assert!(waveform.iter().any(|v| *v > 0.0));
    }

    #[test]
    fn empty_stream_yields_all_zero_buckets() {
        let data = mono_wav(&[]);
        let waveform = extract(&data, Some("wav"), 16).unwrap();
        assert_eq!(waveform, vec![0.0; 16]);
    }

    #[test]
    fn fewer_samples_than_buckets_yields_zeros_without_panicking() {
        let data = mono_wav(&[5000, -5000, 5000]);
        let waveform = extract(&data, Some("wav"), 10).unwrap();
        assert_eq!(waveform.len(), 10);
        assert!(waveform.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn only_the_first_channel_is_read() {
        // Channel 0 silent, channel 1 at full scale: the envelope must stay flat.
        let frames: Vec<Vec<i16>> = (0..44100).map(|_| vec![0, i16::MAX]).collect();
        let data = wav_bytes(2, &frames);
        let waveform = extract(&data, Some("wav"), 100).unwrap();
        assert!(waveform.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn garbage_input_is_a_decode_error() {
        let result = extract(&[0x13, 0x37, 0xde, 0xad, 0xbe, 0xef], None, 100);
        assert!(matches!(result, Err(AppError::Decode(_))));
    }

    #[test]
    fn zero_buckets_is_rejected() {
        let data = mono_wav(&[1, 2, 3]);
        assert!(matches!(
            extract(&data, Some("wav"), 0),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn envelope_averages_absolute_amplitude_per_block() {
        let samples = [0.5f32, -0.5, 1.0, 1.0];
        assert_eq!(envelope(&samples, 2), vec![0.5, 1.0]);
    }

    #[test]
    fn envelope_floor_division_ignores_the_tail_remainder() {
        let samples = [1.0f32, 1.0, 1.0, 1.0, 9.0];
        // block_size = 2; the trailing fifth sample falls outside both blocks.
        assert_eq!(envelope(&samples, 2), vec![1.0, 1.0]);
    }
}
