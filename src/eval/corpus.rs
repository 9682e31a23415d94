//! Paired-corpus evaluation.
//!
//! Walks matched clean/noisy file lists, enhances each noisy signal, and
//! feeds every selected metric the enhanced output plus the noisy baseline.
//! Reference and baseline signals pass through one analysis/synthesis
//! round trip first so all three signals share the same framing and edge
//! taper before scoring.

use std::path::PathBuf;

use indexmap::IndexMap;

use super::progress::Progress;
use super::{basename, report, EvalOptions};
use crate::audio::{load_audio, ResampleMethod};
use crate::enhance::enhance;
use crate::error::{Result, SpevalError};
use crate::metrics::pool::Dispatcher;
use crate::metrics::registry::build_metric;
use crate::metrics::{formulas, Metric};
use crate::model::EnhancementModel;
use crate::transform::Stft;

/// Rate the input sanity probe runs at, independent of the model rate.
const PROBE_RATE: u32 = 16_000;

/// Evaluate an enhancement model over a paired corpus.
///
/// Clean and noisy lists must align index-by-index. Returns the merged
/// per-label means of every selected metric, with each metric's noisy
/// baseline listed before its enhanced counterpart.
///
/// # Arguments
/// * `model` - Enhancement model under test
/// * `stft` - Analysis/synthesis transform, fixes the processing rate
/// * `clean_files` - Reference recordings
/// * `noisy_files` - Degraded recordings, same order as `clean_files`
/// * `options` - Metric selection, worker count, reports, callbacks
pub fn evaluate_corpus(
    model: &mut dyn EnhancementModel,
    stft: &Stft,
    clean_files: &[PathBuf],
    noisy_files: &[PathBuf],
    mut options: EvalOptions,
) -> Result<IndexMap<String, f32>> {
    if clean_files.len() != noisy_files.len() {
        return Err(SpevalError::CorpusMismatch {
            clean: clean_files.len(),
            noisy: noisy_files.len(),
        });
    }

    log::info!(
        "Evaluating {} file pairs at {} Hz with metrics [{}]",
        clean_files.len(),
        stft.sample_rate(),
        options.metrics.join(", ")
    );

    let dispatcher = Dispatcher::new(options.n_workers);
    let mut metrics: Vec<Box<dyn Metric>> = Vec::with_capacity(options.metrics.len());
    for name in &options.metrics {
        let effective = if options.use_octave && name.eq_ignore_ascii_case("composite") {
            "composite-octave"
        } else {
            name.as_str()
        };
        metrics.push(build_metric(
            effective,
            stft.sample_rate(),
            &dispatcher,
            &options.bindings,
        )?);
    }

    let mut progress = Progress::new(clean_files.len(), options.log_percent);
    let mut input_scores: Vec<f32> = Vec::with_capacity(clean_files.len());

    for (clean_path, noisy_path) in clean_files.iter().zip(noisy_files) {
        // Input sanity probe: how degraded is this pair before enhancement.
        {
            let clean = load_audio(clean_path, Some(PROBE_RATE), ResampleMethod::SincFast)?;
            let noisy = load_audio(noisy_path, Some(PROBE_RATE), ResampleMethod::SincFast)?;
            input_scores.push(formulas::si_sdr(&clean.samples, &noisy.samples)?);
        }

        let clean = load_audio(clean_path, Some(stft.sample_rate()), ResampleMethod::SincBest)?;
        let noisy = load_audio(noisy_path, Some(stft.sample_rate()), ResampleMethod::SincBest)?;

        let enhanced = enhance(model, stft, &noisy, options.highpass_cutoff)?;
        let clean = stft.round_trip(&clean)?;
        let noisy = stft.round_trip(&noisy)?;

        let filename = basename(clean_path);
        for metric in &mut metrics {
            metric.add(Some(&clean), &enhanced, Some(&noisy), filename)?;
        }

        if let Some(callback) = options.save_callback.as_mut() {
            callback(clean_path, &enhanced)?;
        }
        progress.tick();
    }

    let mut means = IndexMap::new();
    for metric in &mut metrics {
        means.extend(metric.mean()?);
    }

    if !input_scores.is_empty() {
        let avg = input_scores.iter().map(|&v| v as f64).sum::<f64>()
            / input_scores.len() as f64;
        log::info!("Mean input SISDR over {} pairs: {:.2} dB", input_scores.len(), avg);
    }

    if let Some(path) = &options.csv_enhanced {
        report::write_csv(path, &report::collect_rows(&metrics, false))?;
    }
    if let Some(path) = &options.csv_noisy {
        report::write_csv(path, &report::collect_rows(&metrics, true))?;
    }

    Ok(means)
}
