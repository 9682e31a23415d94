//! Enhancement Model Interface
//!
//! The evaluation harness treats the enhancement model as a collaborator
//! behind a small trait: a forward pass over framed half-spectra. Two
//! first-party implementations are provided, an identity model for
//! plumbing tests and a spectral-gate denoiser for end-to-end runs
//! without an external model.

pub mod spectral_gate;

pub use spectral_gate::SpectralGateModel;

use crate::error::Result;
use crate::transform::Spectrogram;

/// A speech-enhancement model operating in the transform domain.
pub trait EnhancementModel: Send {
    /// Model name for logs and reports.
    fn name(&self) -> &str;

    /// Clear any per-utterance state before processing a new signal.
    fn reset(&mut self) {}

    /// Forward pass: rewrite the framed half-spectra in place.
    fn process_spectrum(&mut self, spectrum: &mut Spectrogram) -> Result<()>;
}

/// Identity model: leaves the spectrum untouched.
///
/// Useful for exercising the evaluation plumbing, where the "enhanced"
/// signal should score like the noisy input.
#[derive(Debug, Default)]
pub struct PassthroughModel;

impl PassthroughModel {
    pub fn new() -> Self {
        Self
    }
}

impl EnhancementModel for PassthroughModel {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn process_spectrum(&mut self, _spectrum: &mut Spectrogram) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::num_complex::Complex;

    #[test]
    fn test_passthrough_leaves_spectrum_unchanged() {
        let mut model = PassthroughModel::new();
        let mut spec: Spectrogram = vec![vec![Complex::new(0.5, -0.25); 9]; 4];
        let before = spec.clone();

        model.reset();
        model.process_spectrum(&mut spec).unwrap();
        assert_eq!(spec, before);
    }
}
