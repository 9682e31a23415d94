//! No-reference evaluation.
//!
//! Walks noisy files alone: each file is enhanced and both the enhanced
//! output and the raw noisy input are scored by no-reference metrics,
//! remote MOS predictors in the usual deployment. No framing
//! normalization is applied since nothing is compared sample-by-sample.

use std::path::PathBuf;

use indexmap::IndexMap;

use super::progress::Progress;
use super::{basename, report, EvalOptions};
use crate::audio::{load_audio, ResampleMethod};
use crate::enhance::enhance;
use crate::error::Result;
use crate::metrics::pool::Dispatcher;
use crate::metrics::registry::build_noref_metric;
use crate::metrics::{Metric, MosCredentials};
use crate::model::EnhancementModel;
use crate::transform::Stft;

/// Evaluate an enhancement model over unpaired noisy files.
///
/// Builds the named no-reference metrics (remote scoring needs
/// `credentials`) and returns their merged per-label means.
pub fn evaluate_noref(
    model: &mut dyn EnhancementModel,
    stft: &Stft,
    noisy_files: &[PathBuf],
    credentials: &MosCredentials,
    options: EvalOptions,
) -> Result<IndexMap<String, f32>> {
    let dispatcher = Dispatcher::new(options.n_workers);
    let mut metrics: Vec<Box<dyn Metric>> = Vec::with_capacity(options.metrics.len());
    for name in &options.metrics {
        metrics.push(build_noref_metric(
            name,
            stft.sample_rate(),
            credentials,
            &dispatcher,
        )?);
    }

    evaluate_noref_with_metrics(model, stft, noisy_files, metrics, options)
}

/// Same loop with caller-supplied metric instances.
pub fn evaluate_noref_with_metrics(
    model: &mut dyn EnhancementModel,
    stft: &Stft,
    noisy_files: &[PathBuf],
    mut metrics: Vec<Box<dyn Metric>>,
    mut options: EvalOptions,
) -> Result<IndexMap<String, f32>> {
    log::info!(
        "Scoring {} noisy files at {} Hz without references",
        noisy_files.len(),
        stft.sample_rate()
    );

    let mut progress = Progress::new(noisy_files.len(), options.log_percent);

    for noisy_path in noisy_files {
        let noisy = load_audio(noisy_path, Some(stft.sample_rate()), ResampleMethod::SincBest)?;
        let enhanced = enhance(model, stft, &noisy, options.highpass_cutoff)?;

        let filename = basename(noisy_path);
        for metric in &mut metrics {
            metric.add(None, &enhanced, Some(&noisy), filename)?;
        }

        if let Some(callback) = options.save_callback.as_mut() {
            callback(noisy_path, &enhanced)?;
        }
        progress.tick();
    }

    let mut means = IndexMap::new();
    for metric in &mut metrics {
        means.extend(metric.mean()?);
    }

    if let Some(path) = &options.csv_enhanced {
        report::write_csv(path, &report::collect_rows(&metrics, false))?;
    }
    if let Some(path) = &options.csv_noisy {
        report::write_csv(path, &report::collect_rows(&metrics, true))?;
    }

    Ok(means)
}
