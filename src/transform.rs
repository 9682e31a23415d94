//! Spectral Transform
//!
//! Overlap-add STFT used as the enhancement domain: analysis produces framed
//! half-spectra for the model's forward pass, synthesis reconstructs audio.
//! The evaluation loop also pushes clean and noisy signals through a full
//! analysis/synthesis round trip so every compared signal carries the same
//! framing artifacts as the enhanced output.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::audio::Signal;
use crate::error::{Result, SpevalError};

/// Framed half-spectrum representation: one `Vec<Complex<f32>>` of
/// `frame_size / 2 + 1` bins per frame.
pub type Spectrogram = Vec<Vec<Complex<f32>>>;

/// Stateful analysis/synthesis transform at a fixed sample rate.
///
/// Uses a square-root Hann window on both sides with 50% overlap, which
/// reconstructs the frame interior exactly; the first and last half-frame
/// are tapered.
pub struct Stft {
    sample_rate: u32,
    frame_size: usize,
    hop_size: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
}

impl Stft {
    /// Create a transform with an explicit frame size (must be even).
    pub fn new(sample_rate: u32, frame_size: usize) -> Result<Self> {
        if sample_rate == 0 {
            return Err(SpevalError::InvalidRate { rate: sample_rate });
        }
        if frame_size < 2 || frame_size % 2 != 0 {
            return Err(SpevalError::InvalidFrameSize { size: frame_size });
        }

        let window: Vec<f32> = (0..frame_size)
            .map(|i| {
                let hann = 0.5
                    * (1.0
                        - (2.0 * std::f32::consts::PI * i as f32 / frame_size as f32).cos());
                hann.sqrt()
            })
            .collect();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_size);
        let ifft = planner.plan_fft_inverse(frame_size);

        Ok(Self {
            sample_rate,
            frame_size,
            hop_size: frame_size / 2,
            window,
            fft,
            ifft,
        })
    }

    /// Create a transform with a 20 ms frame at the given rate.
    pub fn with_default_frames(sample_rate: u32) -> Result<Self> {
        let frame = ((sample_rate / 50) & !1).max(2) as usize;
        Self::new(sample_rate, frame)
    }

    /// Sample rate the transform operates at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Analysis frame length in samples.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Hop length between frames in samples.
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Number of frequency bins per frame.
    pub fn num_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    /// Transform samples into framed half-spectra.
    ///
    /// The tail is zero-padded to a whole number of hops, so inputs of equal
    /// length always produce spectrograms of equal shape.
    pub fn analysis(&self, samples: &[f32]) -> Spectrogram {
        let n_frames = samples.len().div_ceil(self.hop_size);
        let n_bins = self.num_bins();
        let mut spec = Vec::with_capacity(n_frames);

        let mut buf = vec![Complex::new(0.0_f32, 0.0); self.frame_size];
        for frame in 0..n_frames {
            let start = frame * self.hop_size;
            for (i, slot) in buf.iter_mut().enumerate() {
                let sample = samples.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex::new(sample * self.window[i], 0.0);
            }
            self.fft.process(&mut buf);
            spec.push(buf[..n_bins].to_vec());
        }

        spec
    }

    /// Reconstruct audio from framed half-spectra by inverse FFT and
    /// overlap-add.
    pub fn synthesis(&self, spec: &Spectrogram) -> Vec<f32> {
        if spec.is_empty() {
            return Vec::new();
        }

        let n_frames = spec.len();
        let out_len = (n_frames - 1) * self.hop_size + self.frame_size;
        let n_bins = self.num_bins();
        let scale = 1.0 / self.frame_size as f32;
        let mut output = vec![0.0_f32; out_len];

        let mut buf = vec![Complex::new(0.0_f32, 0.0); self.frame_size];
        for (frame, bins) in spec.iter().enumerate() {
            // Rebuild the full spectrum from the half-spectrum by conjugate
            // symmetry before the inverse transform.
            for (k, slot) in buf.iter_mut().enumerate() {
                *slot = if k < n_bins {
                    bins.get(k).copied().unwrap_or_else(|| Complex::new(0.0, 0.0))
                } else {
                    bins[self.frame_size - k].conj()
                };
            }
            self.ifft.process(&mut buf);

            let start = frame * self.hop_size;
            for i in 0..self.frame_size {
                output[start + i] += buf[i].re * scale * self.window[i];
            }
        }

        output
    }

    /// Push a signal through analysis and synthesis.
    ///
    /// Output length depends only on input length, so equal-length inputs
    /// stay comparable sample-by-sample afterwards.
    pub fn round_trip(&self, signal: &Signal) -> Result<Signal> {
        if signal.sample_rate != self.sample_rate {
            return Err(SpevalError::InvalidRate {
                rate: signal.sample_rate,
            });
        }
        let spec = self.analysis(&signal.samples);
        Signal::new(self.synthesis(&spec), self.sample_rate)
    }
}
