//! Audio Signal Type
//!
//! A single-channel sequence of 32-bit float samples at a known sample rate.
//! Signals are produced by loading or enhancement and are never mutated in
//! place by a metric; downstream stages that need a different rate build a
//! resampled copy.

use crate::error::{Result, SpevalError};

/// Mono audio signal with its sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Samples in [-1.0, 1.0], one channel.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl Signal {
    /// Create a signal from raw samples.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(SpevalError::InvalidRate { rate: sample_rate });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the signal holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

// ============================================================================
// Level Helpers
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero or negative input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the RMS level of a signal in dB
///
/// # Arguments
/// * `signal` - Signal to analyze
///
/// # Returns
/// RMS level in dB. Returns -f32::INFINITY for empty or silent signals.
pub fn rms_db(signal: &Signal) -> f32 {
    if signal.is_empty() {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = signal
        .samples
        .iter()
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    let rms = (sum_squares / signal.len() as f64).sqrt() as f32;
    linear_to_db(rms)
}

/// Calculate the peak level of a signal in dB
///
/// # Arguments
/// * `signal` - Signal to analyze
///
/// # Returns
/// Peak level in dB. Returns -f32::INFINITY for empty signals.
pub fn peak_db(signal: &Signal) -> f32 {
    let peak = signal.samples.iter().map(|&s| s.abs()).fold(0.0_f32, f32::max);
    linear_to_db(peak)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(freq: f32, sample_rate: u32, duration_secs: f32, amplitude: f32) -> Signal {
        let n = (sample_rate as f32 * duration_secs) as usize;
        let samples: Vec<f32> = (0..n)
            .map(|i| {
                amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
            })
            .collect();
        Signal::new(samples, sample_rate).unwrap()
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(Signal::new(vec![0.0; 8], 0).is_err());
    }

    #[test]
    fn test_duration() {
        let s = Signal::new(vec![0.0; 16000], 16000).unwrap();
        assert_relative_eq!(s.duration_secs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sine_rms() {
        // Full-scale sine has RMS of 1/sqrt(2), about -3.01 dB.
        let s = sine(440.0, 48000, 1.0, 1.0);
        assert_relative_eq!(rms_db(&s), -3.01, epsilon = 0.05);
    }

    #[test]
    fn test_peak_of_silence() {
        let s = Signal::new(vec![0.0; 100], 16000).unwrap();
        assert_eq!(peak_db(&s), f32::NEG_INFINITY);
    }

    #[test]
    fn test_db_round_trip() {
        let linear = db_to_linear(-6.0);
        assert_relative_eq!(linear_to_db(linear), -6.0, epsilon = 1e-4);
    }
}
