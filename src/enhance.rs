//! Enhancement Pipeline
//!
//! Drives one utterance through the model: analysis into the transform
//! domain, the model's forward pass, synthesis back to audio, and an
//! optional trailing high-pass filter for models that leak low-frequency
//! rumble.

use std::f64::consts::PI;

use crate::audio::Signal;
use crate::error::{Result, SpevalError};
use crate::model::EnhancementModel;
use crate::transform::Stft;

/// Enhance one signal with the given model.
///
/// The signal must already be at the transform's sample rate. When
/// `highpass_cutoff` is set, the output is filtered through a Butterworth
/// high-pass biquad at that frequency.
pub fn enhance(
    model: &mut dyn EnhancementModel,
    stft: &Stft,
    audio: &Signal,
    highpass_cutoff: Option<f32>,
) -> Result<Signal> {
    if audio.sample_rate != stft.sample_rate() {
        return Err(SpevalError::InvalidRate {
            rate: audio.sample_rate,
        });
    }

    model.reset();
    let mut spectrum = stft.analysis(&audio.samples);
    model.process_spectrum(&mut spectrum)?;
    let samples = stft.synthesis(&spectrum);

    let mut enhanced = Signal::new(samples, stft.sample_rate())?;
    if let Some(cutoff) = highpass_cutoff {
        enhanced = highpass_biquad(&enhanced, cutoff)?;
    }
    Ok(enhanced)
}

// ============================================================================
// High-pass biquad
// ============================================================================

/// Biquad filter coefficients, normalized by a0.
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// High-pass coefficients per the Audio EQ Cookbook, Butterworth Q.
    fn highpass(sample_rate: f64, frequency: f64) -> Self {
        let freq = frequency.clamp(1.0, sample_rate / 2.0 - 1.0);
        let q = std::f64::consts::FRAC_1_SQRT_2;

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = (1.0 + cos_w0) / 2.0;
        let b1 = -(1.0 + cos_w0);
        let b2 = (1.0 + cos_w0) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Biquad delay line, Direct Form I.
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

/// Apply a high-pass biquad at the given cutoff frequency.
pub fn highpass_biquad(signal: &Signal, cutoff_hz: f32) -> Result<Signal> {
    let coeffs = BiquadCoeffs::highpass(signal.sample_rate as f64, cutoff_hz as f64);
    let mut state = BiquadState::default();

    let samples: Vec<f32> = signal
        .samples
        .iter()
        .map(|&s| state.process(s as f64, &coeffs) as f32)
        .collect();

    Signal::new(samples, signal.sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::rms_db;
    use crate::model::PassthroughModel;

    fn sine(freq: f32, sample_rate: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_passthrough_enhance_reconstructs_interior() {
        let stft = Stft::new(16000, 320).unwrap();
        let mut model = PassthroughModel::new();
        let input = Signal::new(sine(440.0, 16000, 4800), 16000).unwrap();

        let out = enhance(&mut model, &stft, &input, None).unwrap();

        let frame = stft.frame_size();
        for i in frame..(input.len() - frame) {
            assert!(
                (out.samples[i] - input.samples[i]).abs() < 1e-3,
                "Mismatch at {}: {} vs {}",
                i,
                out.samples[i],
                input.samples[i]
            );
        }
    }

    #[test]
    fn test_enhance_rejects_rate_mismatch() {
        let stft = Stft::new(48000, 960).unwrap();
        let mut model = PassthroughModel::new();
        let input = Signal::new(vec![0.0; 1000], 16000).unwrap();
        assert!(enhance(&mut model, &stft, &input, None).is_err());
    }

    #[test]
    fn test_highpass_removes_dc() {
        let signal = Signal::new(vec![0.5; 16000], 16000).unwrap();
        let filtered = highpass_biquad(&signal, 80.0).unwrap();

        // Skip the filter transient, then the tail should sit at zero.
        let tail = &filtered.samples[8000..];
        let mean: f64 = tail.iter().map(|&s| s as f64).sum::<f64>() / tail.len() as f64;
        assert!(mean.abs() < 1e-3, "DC left after high-pass: {}", mean);
    }

    #[test]
    fn test_highpass_keeps_passband_tone() {
        let signal = Signal::new(sine(1000.0, 16000, 16000), 16000).unwrap();
        let filtered = highpass_biquad(&signal, 80.0).unwrap();

        let before = rms_db(&signal);
        let after = rms_db(&filtered);
        assert!(
            (before - after).abs() < 1.0,
            "1 kHz tone attenuated by high-pass at 80 Hz: {} dB vs {} dB",
            before,
            after
        );
    }
}
