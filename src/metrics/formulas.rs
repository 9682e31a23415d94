//! Built-in objective measures.
//!
//! Scale-invariant SDR, broadband and segmental SNR, and a compact
//! short-time objective intelligibility (STOI) measure. Everything
//! accumulates in f64 and reports f32.
//!
//! Callers are responsible for rate conversion: STOI requires 10 kHz
//! input, segmental SNR derives its frame length from the signal rate,
//! and the SDR/SNR measures are rate agnostic.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::audio::Signal;
use crate::error::{Result, SpevalError};

/// Sample rate the STOI measure operates at.
pub const STOI_RATE: u32 = 10_000;

const STOI_FRAME: usize = 256;
const STOI_HOP: usize = 128;
const STOI_NFFT: usize = 512;
const STOI_BANDS: usize = 15;
const STOI_BAND_BASE_HZ: f64 = 150.0;
const STOI_SEGMENT: usize = 30;
const STOI_DYN_RANGE_DB: f64 = 40.0;
const STOI_CLIP_DB: f64 = 15.0;

const SSNR_FRAME_MS: f64 = 30.0;
const SSNR_MIN_DB: f64 = -10.0;
const SSNR_MAX_DB: f64 = 35.0;

const EPS: f64 = f64::EPSILON;

// ====== Scale-invariant SDR ======

/// Scale-invariant signal-to-distortion ratio in dB.
///
/// Projects the estimate onto the reference and compares projected energy
/// against the residual, so a constant gain on the estimate does not move
/// the score. Mismatched lengths are truncated to the shorter signal.
pub fn si_sdr(reference: &[f32], estimate: &[f32]) -> Result<f32> {
    let n = reference.len().min(estimate.len());
    if n == 0 {
        return Err(SpevalError::EmptyAudio);
    }

    let mut rss = 0.0f64;
    let mut rse = 0.0f64;
    for i in 0..n {
        let r = reference[i] as f64;
        rss += r * r;
        rse += r * estimate[i] as f64;
    }

    let a = (EPS + rse) / (rss + EPS);

    let mut s_true = 0.0f64;
    let mut s_res = 0.0f64;
    for i in 0..n {
        let t = a * reference[i] as f64;
        let e = estimate[i] as f64 - t;
        s_true += t * t;
        s_res += e * e;
    }

    Ok((10.0 * ((EPS + s_true) / (EPS + s_res)).log10()) as f32)
}

// ====== Broadband SNR ======

/// Signal-to-noise ratio in dB, with the noise taken as the sample-wise
/// difference between reference and estimate.
pub fn snr(reference: &[f32], estimate: &[f32]) -> Result<f32> {
    let n = reference.len().min(estimate.len());
    if n == 0 {
        return Err(SpevalError::EmptyAudio);
    }

    let mut signal = 0.0f64;
    let mut noise = 0.0f64;
    for i in 0..n {
        let r = reference[i] as f64;
        let d = r - estimate[i] as f64;
        signal += r * r;
        noise += d * d;
    }

    Ok((10.0 * ((EPS + signal) / (EPS + noise)).log10()) as f32)
}

// ====== Segmental SNR ======

/// Segmental SNR in dB over 30 ms frames with 75% overlap.
///
/// Per-frame ratios are clamped to [-10, 35] dB before averaging so silent
/// and saturated frames cannot dominate the mean.
pub fn ssnr(reference: &Signal, estimate: &Signal) -> Result<f32> {
    if reference.sample_rate != estimate.sample_rate {
        return Err(SpevalError::FormulaFailed {
            metric: "SSNR".to_string(),
            reason: format!(
                "sample rates differ ({} vs {})",
                reference.sample_rate, estimate.sample_rate
            ),
        });
    }

    let n = reference.samples.len().min(estimate.samples.len());
    let win = (reference.sample_rate as f64 * SSNR_FRAME_MS / 1000.0).round() as usize;
    let skip = (win / 4).max(1);

    if win == 0 || n < win {
        return Err(SpevalError::FormulaFailed {
            metric: "SSNR".to_string(),
            reason: format!("signal shorter than one {} ms frame", SSNR_FRAME_MS),
        });
    }

    let mut total = 0.0f64;
    let mut frames = 0usize;
    let mut start = 0usize;
    while start + win <= n {
        let mut signal = 0.0f64;
        let mut noise = 0.0f64;
        for i in start..start + win {
            let r = reference.samples[i] as f64;
            let d = r - estimate.samples[i] as f64;
            signal += r * r;
            noise += d * d;
        }
        let frame_db = 10.0 * (signal / (noise + EPS) + EPS).log10();
        total += frame_db.clamp(SSNR_MIN_DB, SSNR_MAX_DB);
        frames += 1;
        start += skip;
    }

    Ok((total / frames as f64) as f32)
}

// ====== STOI ======

/// Short-time objective intelligibility, in [0, 1] for typical inputs.
///
/// Compact rendition of the Taal et al. measure: signals are framed at
/// 25.6 ms / 50% overlap, silent frames are removed using the clean
/// signal's 40 dB dynamic range, frame spectra are folded into 15
/// one-third octave bands, and band envelopes are compared over 30-frame
/// segments after normalization and clipping.
///
/// Both signals must be at [`STOI_RATE`].
pub fn stoi(clean: &Signal, degraded: &Signal) -> Result<f32> {
    if clean.sample_rate != STOI_RATE || degraded.sample_rate != STOI_RATE {
        return Err(SpevalError::FormulaFailed {
            metric: "STOI".to_string(),
            reason: format!(
                "requires {} Hz input, got {} and {}",
                STOI_RATE, clean.sample_rate, degraded.sample_rate
            ),
        });
    }

    let n = clean.samples.len().min(degraded.samples.len());
    let window = hann(STOI_FRAME);
    let x_frames = frame_signal(&clean.samples[..n], &window);
    let y_frames = frame_signal(&degraded.samples[..n], &window);

    // Silent frame removal, driven by the clean signal's energy profile.
    let energies = frame_energies_db(&x_frames);
    let max_energy = energies.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let kept: Vec<usize> = energies
        .iter()
        .enumerate()
        .filter(|(_, &e)| e > max_energy - STOI_DYN_RANGE_DB)
        .map(|(m, _)| m)
        .collect();

    if kept.len() < STOI_SEGMENT {
        return Err(SpevalError::FormulaFailed {
            metric: "STOI".to_string(),
            reason: format!(
                "only {} active frames, need at least {}",
                kept.len(),
                STOI_SEGMENT
            ),
        });
    }

    let bands = third_octave_bands(STOI_RATE as f64, STOI_NFFT, STOI_BANDS);
    let x_bands = band_envelopes(&x_frames, &kept, &bands);
    let y_bands = band_envelopes(&y_frames, &kept, &bands);

    let n_frames = kept.len();
    let n_segments = n_frames - STOI_SEGMENT + 1;
    let clip = 1.0 + 10f64.powf(STOI_CLIP_DB / 20.0);

    let mut total = 0.0f64;
    for start in 0..n_segments {
        for j in 0..STOI_BANDS {
            let x_seg = &x_bands[j][start..start + STOI_SEGMENT];
            let y_seg = &y_bands[j][start..start + STOI_SEGMENT];

            let x_norm: f64 = x_seg.iter().map(|v| v * v).sum::<f64>().sqrt();
            let y_norm: f64 = y_seg.iter().map(|v| v * v).sum::<f64>().sqrt();
            let alpha = x_norm / (y_norm + EPS);

            let y_prime: Vec<f64> = y_seg
                .iter()
                .zip(x_seg)
                .map(|(&y, &x)| (alpha * y).min(x * clip))
                .collect();

            total += correlation(x_seg, &y_prime);
        }
    }

    Ok((total / (STOI_BANDS * n_segments) as f64) as f32)
}

/// Symmetric Hann window without the zero endpoints.
fn hann(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let phase = std::f64::consts::TAU * (i + 1) as f64 / (len + 1) as f64;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Windowed full frames, 50% overlap.
fn frame_signal(samples: &[f32], window: &[f64]) -> Vec<Vec<f64>> {
    let frame = window.len();
    if samples.len() < frame {
        return Vec::new();
    }

    (0..=(samples.len() - frame) / STOI_HOP)
        .map(|m| {
            let start = m * STOI_HOP;
            samples[start..start + frame]
                .iter()
                .zip(window)
                .map(|(&s, &w)| s as f64 * w)
                .collect()
        })
        .collect()
}

fn frame_energies_db(frames: &[Vec<f64>]) -> Vec<f64> {
    frames
        .iter()
        .map(|f| {
            let norm = f.iter().map(|v| v * v).sum::<f64>().sqrt();
            20.0 * (norm + EPS).log10()
        })
        .collect()
}

/// FFT bin indices per one-third octave band, centers at 150 * 2^(j/3) Hz.
fn third_octave_bands(rate: f64, nfft: usize, n_bands: usize) -> Vec<Vec<usize>> {
    let bin_hz = rate / nfft as f64;
    let edge = 2f64.powf(1.0 / 6.0);

    (0..n_bands)
        .map(|j| {
            let center = STOI_BAND_BASE_HZ * 2f64.powf(j as f64 / 3.0);
            let low = center / edge;
            let high = center * edge;
            (0..=nfft / 2)
                .filter(|&k| {
                    let f = k as f64 * bin_hz;
                    f >= low && f < high
                })
                .collect()
        })
        .collect()
}

/// Band magnitude envelopes for the kept frames: [band][frame].
fn band_envelopes(frames: &[Vec<f64>], kept: &[usize], bands: &[Vec<usize>]) -> Vec<Vec<f64>> {
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(STOI_NFFT);
    let mut buf = vec![Complex::new(0.0, 0.0); STOI_NFFT];

    let mut envelopes = vec![vec![0.0f64; kept.len()]; bands.len()];
    for (out_m, &m) in kept.iter().enumerate() {
        buf.fill(Complex::new(0.0, 0.0));
        for (i, &s) in frames[m].iter().enumerate() {
            buf[i] = Complex::new(s, 0.0);
        }
        fft.process(&mut buf);

        for (j, band) in bands.iter().enumerate() {
            let power: f64 = band.iter().map(|&k| buf[k].norm_sqr()).sum();
            envelopes[j][out_m] = power.sqrt();
        }
    }
    envelopes
}

/// Pearson correlation with an epsilon-guarded denominator.
fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;

    let mut num = 0.0f64;
    let mut dx = 0.0f64;
    let mut dy = 0.0f64;
    for (&a, &b) in x.iter().zip(y) {
        let a = a - mx;
        let b = b - my;
        num += a * b;
        dx += a * a;
        dy += b * b;
    }

    num / (dx.sqrt() * dy.sqrt() + EPS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_noise(n: usize, seed: u64) -> Vec<f32> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0) as f32
            })
            .collect()
    }

    fn speech_like(n: usize) -> Vec<f32> {
        // Broadband noise with a slow amplitude envelope so every frame
        // carries energy and envelopes vary across segments.
        pseudo_noise(n, 7)
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let env = 0.6 + 0.4 * (std::f64::consts::TAU * i as f64 / 997.0).sin();
                (s as f64 * env) as f32
            })
            .collect()
    }

    #[test]
    fn test_si_sdr_identical_signals_score_high_and_finite() {
        let score = si_sdr(&[1.0, 1.0, 1.0, 1.0], &[1.0, 1.0, 1.0, 1.0]).unwrap();
        assert!(score.is_finite(), "score must stay finite, got {}", score);
        assert!(score > 100.0, "expected > 100 dB, got {}", score);
    }

    #[test]
    fn test_si_sdr_is_scale_invariant() {
        let reference = pseudo_noise(512, 3);
        let scaled: Vec<f32> = reference.iter().map(|s| s * 0.25).collect();
        let score = si_sdr(&reference, &scaled).unwrap();
        assert!(score > 100.0, "gain must not change the score, got {}", score);
    }

    #[test]
    fn test_si_sdr_known_value() {
        // Projection leaves equal true and residual energy: exactly 0 dB.
        let score = si_sdr(&[1.0, 0.0], &[1.0, 1.0]).unwrap();
        assert!(score.abs() < 1e-4, "expected 0 dB, got {}", score);
    }

    #[test]
    fn test_si_sdr_truncates_to_shorter_signal() {
        let a = si_sdr(&[1.0, 0.0, 0.7], &[1.0, 1.0]).unwrap();
        let b = si_sdr(&[1.0, 0.0], &[1.0, 1.0]).unwrap();
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn test_si_sdr_degrades_with_noise() {
        let reference = pseudo_noise(2048, 11);
        let light: Vec<f32> = reference.iter().map(|s| s + 0.01).collect();
        let heavy: Vec<f32> = reference.iter().map(|s| s + 0.3).collect();
        let a = si_sdr(&reference, &light).unwrap();
        let b = si_sdr(&reference, &heavy).unwrap();
        assert!(a > b, "more noise must score lower: {} vs {}", a, b);
    }

    #[test]
    fn test_si_sdr_rejects_empty_input() {
        assert!(matches!(si_sdr(&[], &[]), Err(SpevalError::EmptyAudio)));
    }

    #[test]
    fn test_snr_known_value() {
        // Signal energy 2, noise energy 1: 10*log10(2) ~ 3.01 dB.
        let score = snr(&[1.0, 1.0], &[1.0, 0.0]).unwrap();
        assert!((score - 3.0103).abs() < 1e-3, "got {}", score);
    }

    #[test]
    fn test_snr_identical_signals_score_high() {
        let reference = pseudo_noise(256, 5);
        let score = snr(&reference, &reference).unwrap();
        assert!(score > 100.0 && score.is_finite());
    }

    #[test]
    fn test_ssnr_identical_signals_hit_the_upper_clamp() {
        let samples = pseudo_noise(16000, 9);
        let reference = Signal::new(samples.clone(), 16000).unwrap();
        let estimate = Signal::new(samples, 16000).unwrap();
        let score = ssnr(&reference, &estimate).unwrap();
        assert!((score - 35.0).abs() < 1e-4, "got {}", score);
    }

    #[test]
    fn test_ssnr_stays_inside_the_clamp_range() {
        let reference = Signal::new(pseudo_noise(16000, 13), 16000).unwrap();
        let estimate = Signal::new(pseudo_noise(16000, 17), 16000).unwrap();
        let score = ssnr(&reference, &estimate).unwrap();
        assert!((-10.0..=35.0).contains(&score), "got {}", score);
    }

    #[test]
    fn test_ssnr_rejects_sub_frame_input() {
        let reference = Signal::new(vec![0.1; 100], 16000).unwrap();
        let estimate = Signal::new(vec![0.1; 100], 16000).unwrap();
        assert!(matches!(
            ssnr(&reference, &estimate),
            Err(SpevalError::FormulaFailed { .. })
        ));
    }

    #[test]
    fn test_ssnr_rejects_mismatched_rates() {
        let reference = Signal::new(vec![0.1; 16000], 16000).unwrap();
        let estimate = Signal::new(vec![0.1; 8000], 8000).unwrap();
        assert!(ssnr(&reference, &estimate).is_err());
    }

    #[test]
    fn test_stoi_identical_signals_score_near_one() {
        let samples = speech_like(20000);
        let clean = Signal::new(samples.clone(), STOI_RATE).unwrap();
        let degraded = Signal::new(samples, STOI_RATE).unwrap();
        let score = stoi(&clean, &degraded).unwrap();
        assert!(score > 0.99, "identical input should be ~1, got {}", score);
        assert!(score <= 1.01);
    }

    #[test]
    fn test_stoi_drops_under_heavy_noise() {
        let samples = speech_like(20000);
        let noise = pseudo_noise(20000, 23);
        let noisy: Vec<f32> = samples
            .iter()
            .zip(&noise)
            .map(|(&s, &n)| s + 2.0 * n)
            .collect();

        let clean = Signal::new(samples.clone(), STOI_RATE).unwrap();
        let clean_est = Signal::new(samples, STOI_RATE).unwrap();
        let degraded = Signal::new(noisy, STOI_RATE).unwrap();

        let good = stoi(&clean, &clean_est).unwrap();
        let bad = stoi(&clean, &degraded).unwrap();
        assert!(
            good - bad > 0.1,
            "noise should cost intelligibility: {} vs {}",
            good,
            bad
        );
    }

    #[test]
    fn test_stoi_rejects_wrong_sample_rate() {
        let clean = Signal::new(vec![0.1; 16000], 16000).unwrap();
        let degraded = Signal::new(vec![0.1; 16000], 16000).unwrap();
        let err = stoi(&clean, &degraded).unwrap_err();
        assert!(matches!(err, SpevalError::FormulaFailed { .. }));
    }

    #[test]
    fn test_stoi_rejects_short_input() {
        // 1000 samples is under 30 frames at 256/128 framing.
        let samples = pseudo_noise(1000, 29);
        let clean = Signal::new(samples.clone(), STOI_RATE).unwrap();
        let degraded = Signal::new(samples, STOI_RATE).unwrap();
        assert!(matches!(
            stoi(&clean, &degraded),
            Err(SpevalError::FormulaFailed { .. })
        ));
    }

    #[test]
    fn test_third_octave_bands_cover_every_band() {
        let bands = third_octave_bands(STOI_RATE as f64, STOI_NFFT, STOI_BANDS);
        assert_eq!(bands.len(), STOI_BANDS);
        for (j, band) in bands.iter().enumerate() {
            assert!(!band.is_empty(), "band {} has no bins", j);
        }
        // First band sits around 150 Hz: bins 7 and 8 at 19.5 Hz spacing.
        assert_eq!(bands[0], vec![7, 8]);
    }

    #[test]
    fn test_correlation_bounds() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y_up = [2.0, 4.0, 6.0, 8.0];
        let y_down = [8.0, 6.0, 4.0, 2.0];
        assert!((correlation(&x, &y_up) - 1.0).abs() < 1e-9);
        assert!((correlation(&x, &y_down) + 1.0).abs() < 1e-9);
    }
}
