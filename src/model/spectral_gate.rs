//! Spectral Gate Model
//!
//! A self-contained denoiser: estimates a per-bin noise floor from the
//! leading frames of each utterance and attenuates bins that stay close to
//! that floor. Not competitive with a trained model, but it produces a real
//! enhancement effect for end-to-end evaluation runs.

use rustfft::num_complex::Complex;

use super::EnhancementModel;
use crate::error::Result;
use crate::transform::Spectrogram;

/// Number of leading frames used for the noise-floor estimate.
const DEFAULT_NOISE_FRAMES: usize = 10;

/// Bins below `floor * threshold` are attenuated.
const DEFAULT_THRESHOLD: f32 = 2.0;

/// Gain applied to gated bins.
const DEFAULT_ATTENUATION: f32 = 0.1;

/// Noise-floor gating in the transform domain.
#[derive(Debug, Clone)]
pub struct SpectralGateModel {
    noise_frames: usize,
    threshold: f32,
    attenuation: f32,
}

impl SpectralGateModel {
    pub fn new() -> Self {
        Self {
            noise_frames: DEFAULT_NOISE_FRAMES,
            threshold: DEFAULT_THRESHOLD,
            attenuation: DEFAULT_ATTENUATION,
        }
    }

    /// Override the gated-bin gain (0.0 silences gated bins entirely).
    pub fn with_attenuation(mut self, attenuation: f32) -> Self {
        self.attenuation = attenuation.clamp(0.0, 1.0);
        self
    }

    /// Per-bin mean magnitude over the leading frames.
    fn noise_floor(&self, spectrum: &Spectrogram) -> Vec<f32> {
        let frames = spectrum.len().min(self.noise_frames).max(1);
        let bins = spectrum.first().map(|f| f.len()).unwrap_or(0);
        let mut floor = vec![0.0_f32; bins];

        for frame in spectrum.iter().take(frames) {
            for (b, val) in frame.iter().enumerate() {
                floor[b] += val.norm();
            }
        }
        for f in floor.iter_mut() {
            *f /= frames as f32;
        }
        floor
    }
}

impl Default for SpectralGateModel {
    fn default() -> Self {
        Self::new()
    }
}

impl EnhancementModel for SpectralGateModel {
    fn name(&self) -> &str {
        "spectral-gate"
    }

    fn process_spectrum(&mut self, spectrum: &mut Spectrogram) -> Result<()> {
        if spectrum.is_empty() {
            return Ok(());
        }

        let floor = self.noise_floor(spectrum);
        for frame in spectrum.iter_mut() {
            for (b, val) in frame.iter_mut().enumerate() {
                if val.norm() < floor[b] * self.threshold {
                    *val = Complex::new(val.re * self.attenuation, val.im * self.attenuation);
                }
            }
        }
        Ok(())
    }
}
