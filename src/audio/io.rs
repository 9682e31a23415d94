//! Audio file I/O for Speval
//!
//! WAV loading and saving. Multi-channel input is mixed down to mono on
//! import, integer bit depths are normalized to 32-bit float, and callers
//! may request a target rate so corpora load directly at the rate a model
//! or metric expects.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::audio::resample::{resample, ResampleMethod};
use crate::audio::Signal;
use crate::error::{Result, SpevalError};

/// Load an audio file as a mono signal
///
/// Reads a WAV file, converts samples to f32, averages channels down to
/// mono, and resamples to `target_rate` when one is given.
///
/// # Arguments
/// * `path` - Path to the WAV file
/// * `target_rate` - Rate to convert to; `None` keeps the file's rate
/// * `method` - Interpolation method used when conversion is needed
///
/// # Errors
/// * `FileNotFound` - If the file does not exist
/// * `InvalidAudio` - If the file is not a readable WAV file
/// * `EmptyAudio` - If the file contains no samples
pub fn load_audio(
    path: &Path,
    target_rate: Option<u32>,
    method: ResampleMethod,
) -> Result<Signal> {
    if !path.exists() {
        return Err(SpevalError::FileNotFound {
            path: path.display().to_string(),
            source: None,
        });
    }

    let reader = WavReader::open(path).map_err(|e| SpevalError::InvalidAudio {
        reason: format!("Failed to open WAV file: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let source_rate = spec.sample_rate;
    let channels = spec.channels as usize;

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    if interleaved.is_empty() {
        return Err(SpevalError::EmptyAudio);
    }

    let mono = mixdown(&interleaved, channels);

    let signal = match target_rate {
        Some(rate) if rate != source_rate => {
            let converted = resample(&mono, source_rate, rate, method)?;
            Signal::new(converted, rate)?
        }
        _ => Signal::new(mono, source_rate)?,
    };

    Ok(signal)
}

/// Save a signal as a 16-bit PCM WAV file
///
/// # Arguments
/// * `path` - Path where the file will be written
/// * `signal` - Signal to write, at its own sample rate
pub fn save_audio(path: &Path, signal: &Signal) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: signal.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in &signal.samples {
        let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(scaled)?;
    }
    writer.finalize()?;

    Ok(())
}

// ============================================================================
// Internal helper functions
// ============================================================================

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| SpevalError::InvalidAudio {
                reason: format!("Failed to read float samples: {}", e),
                source: Some(Box::new(e)),
            }),
        SampleFormat::Int => match bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| SpevalError::InvalidAudio {
                    reason: format!("Failed to read 16-bit samples: {}", e),
                    source: Some(Box::new(e)),
                }),
            24 => {
                // 24-bit stored as i32 in hound
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / 8388608.0))
                    .collect::<std::result::Result<Vec<f32>, _>>()
                    .map_err(|e| SpevalError::InvalidAudio {
                        reason: format!("Failed to read 24-bit samples: {}", e),
                        source: Some(Box::new(e)),
                    })
            }
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 2147483648.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| SpevalError::InvalidAudio {
                    reason: format!("Failed to read 32-bit int samples: {}", e),
                    source: Some(Box::new(e)),
                }),
            _ => Err(SpevalError::InvalidAudio {
                reason: format!("{}-bit integer audio is not supported", bits_per_sample),
                source: None,
            }),
        },
    }
}

/// Average interleaved channels down to one
fn mixdown(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    let frames = interleaved.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    for frame in 0..frames {
        let start = frame * channels;
        let sum: f32 = interleaved[start..start + channels].iter().sum();
        mono.push(sum / channels as f32);
    }
    mono
}

// ============================================================================
// Tests
// ============================================================================
