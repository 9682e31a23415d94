//! Sample Rate Conversion
//!
//! Linear interpolation for cheap conversions and windowed-sinc kernels for
//! the quality-sensitive paths. Metrics construct a `Resampler` scoped to the
//! one source/target rate pair they were built with; corpus loading uses the
//! free `resample` function directly.

use crate::audio::Signal;
use crate::error::{Result, SpevalError};

/// Interpolation method used when converting between sample rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResampleMethod {
    /// Linear interpolation. Fast, audible aliasing when downsampling.
    Linear,
    /// Windowed-sinc, 16-tap half-width. Default for metric-side conversion.
    #[default]
    SincFast,
    /// Windowed-sinc, 32-tap half-width. Used when reloading corpora at the
    /// model rate.
    SincBest,
}

impl ResampleMethod {
    /// Half-width of the sinc kernel in source samples.
    fn half_taps(&self) -> usize {
        match self {
            ResampleMethod::Linear => 1,
            ResampleMethod::SincFast => 16,
            ResampleMethod::SincBest => 32,
        }
    }
}

/// Rate converter scoped to one source/target rate pair.
#[derive(Debug, Clone)]
pub struct Resampler {
    source_rate: u32,
    target_rate: u32,
    method: ResampleMethod,
}

impl Resampler {
    /// Create a resampler for the given rate pair.
    pub fn new(source_rate: u32, target_rate: u32, method: ResampleMethod) -> Result<Self> {
        if source_rate == 0 {
            return Err(SpevalError::InvalidRate { rate: source_rate });
        }
        if target_rate == 0 {
            return Err(SpevalError::InvalidRate { rate: target_rate });
        }
        Ok(Self {
            source_rate,
            target_rate,
            method,
        })
    }

    /// Target rate this resampler converts to.
    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Convert a signal to the target rate.
    ///
    /// The signal's rate must match the source rate this resampler was built
    /// for. A signal already at the target rate is returned as a plain clone.
    pub fn apply(&self, signal: &Signal) -> Result<Signal> {
        if signal.sample_rate == self.target_rate {
            return Ok(signal.clone());
        }
        if signal.sample_rate != self.source_rate {
            return Err(SpevalError::InvalidRate {
                rate: signal.sample_rate,
            });
        }
        let samples = convert(
            &signal.samples,
            self.source_rate,
            self.target_rate,
            self.method,
        );
        Signal::new(samples, self.target_rate)
    }
}

/// Resample raw samples from one rate to another.
pub fn resample(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
    method: ResampleMethod,
) -> Result<Vec<f32>> {
    if source_rate == 0 {
        return Err(SpevalError::InvalidRate { rate: source_rate });
    }
    if target_rate == 0 {
        return Err(SpevalError::InvalidRate { rate: target_rate });
    }
    Ok(convert(samples, source_rate, target_rate, method))
}

fn convert(samples: &[f32], source_rate: u32, target_rate: u32, method: ResampleMethod) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    match method {
        ResampleMethod::Linear => resample_linear(samples, ratio),
        ResampleMethod::SincFast | ResampleMethod::SincBest => {
            resample_sinc(samples, ratio, method.half_taps())
        }
    }
}

/// Linear interpolation resampling
fn resample_linear(samples: &[f32], ratio: f64) -> Vec<f32> {
    let source_len = samples.len();
    let target_len = ((source_len as f64) * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

/// Windowed-sinc resampling
///
/// The kernel cutoff is scaled down when decimating so it doubles as the
/// anti-alias filter. Kernel weights are renormalized per output sample,
/// which keeps unity gain at the signal edges where the kernel is truncated.
fn resample_sinc(samples: &[f32], ratio: f64, half_taps: usize) -> Vec<f32> {
    let source_len = samples.len() as i64;
    let target_len = ((samples.len() as f64) * ratio).ceil() as usize;
    let cutoff = ratio.min(1.0);
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let src_pos = i as f64 / ratio;
        let center = src_pos.floor() as i64;

        let mut acc = 0.0_f64;
        let mut ksum = 0.0_f64;
        for k in (center - half_taps as i64 + 1)..=(center + half_taps as i64) {
            if k < 0 || k >= source_len {
                continue;
            }
            let t = src_pos - k as f64;
            let w = sinc(cutoff * t) * hann_window(t, half_taps as f64);
            acc += samples[k as usize] as f64 * w;
            ksum += w;
        }

        let sample = if ksum.abs() > f64::EPSILON {
            (acc / ksum) as f32
        } else {
            0.0
        };
        output.push(sample);
    }

    output
}

#[inline]
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

#[inline]
fn hann_window(t: f64, half_width: f64) -> f64 {
    if t.abs() >= half_width {
        0.0
    } else {
        0.5 + 0.5 * (std::f64::consts::PI * t / half_width).cos()
    }
}

// ============================================================================
// Tests
// ============================================================================
