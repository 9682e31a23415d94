//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command: corpus discovery,
//! model construction, the evaluation call, and result presentation.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{info, warn};
use walkdir::WalkDir;

use crate::audio::{save_audio, Signal};
use crate::cli::{EvaluateArgs, ModelKind, NorefArgs};
use crate::error::{Result, SpevalError};
use crate::eval::{self, EvalOptions, SaveCallback};
use crate::metrics::MosCredentials;
use crate::model::{EnhancementModel, PassthroughModel, SpectralGateModel};
use crate::transform::Stft;

/// Run paired-corpus evaluation.
pub fn evaluate(args: EvaluateArgs) -> Result<()> {
    info!(
        "Evaluating corpus: clean={} noisy={}",
        args.clean_dir.display(),
        args.noisy_dir.display()
    );

    let clean_files = discover_wavs(&args.clean_dir)?;
    let noisy_files = discover_wavs(&args.noisy_dir)?;
    let (clean_files, noisy_files) = pair_by_filename(clean_files, noisy_files);
    if clean_files.is_empty() {
        return Err(SpevalError::EmptyCorpus {
            dir: format!(
                "{} paired with {}",
                args.clean_dir.display(),
                args.noisy_dir.display()
            ),
        });
    }

    let stft = Stft::with_default_frames(args.sample_rate)?;
    let mut model = build_model(args.model);

    let options = EvalOptions {
        metrics: args.metrics,
        n_workers: args.workers,
        log_percent: args.log_percent,
        csv_enhanced: args.csv_enh,
        csv_noisy: args.csv_noisy,
        save_callback: save_into(args.output_dir.as_deref())?,
        highpass_cutoff: args.hp_cutoff,
        use_octave: args.octave,
        ..EvalOptions::corpus_defaults()
    };

    let means = eval::evaluate_corpus(
        model.as_mut(),
        &stft,
        &clean_files,
        &noisy_files,
        options,
    )?;

    println!("=== Evaluation Results ({}) ===", model.name());
    print!("{}", format_mean_table(&means));
    Ok(())
}

/// Run no-reference evaluation against the remote MOS service.
pub fn evaluate_noref(args: NorefArgs) -> Result<()> {
    info!("Scoring corpus without references: {}", args.noisy_dir.display());

    let noisy_files = discover_wavs(&args.noisy_dir)?;
    let credentials = MosCredentials::from_env()?;

    let stft = Stft::with_default_frames(args.sample_rate)?;
    let mut model = build_model(args.model);

    let options = EvalOptions {
        metrics: args.metrics,
        n_workers: args.workers,
        log_percent: args.log_percent,
        csv_enhanced: args.csv_enh,
        csv_noisy: args.csv_noisy,
        save_callback: save_into(args.output_dir.as_deref())?,
        highpass_cutoff: args.hp_cutoff,
        ..EvalOptions::noref_defaults()
    };

    let means = eval::evaluate_noref(
        model.as_mut(),
        &stft,
        &noisy_files,
        &credentials,
        options,
    )?;

    println!("=== MOS Results ({}) ===", model.name());
    print!("{}", format_mean_table(&means));
    Ok(())
}

/// Collect WAV files under a directory, sorted by path.
pub fn discover_wavs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SpevalError::FileNotFound {
            path: dir.display().to_string(),
            source: None,
        });
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("wav"))
                .unwrap_or(false)
        })
        .map(|entry| entry.path().to_path_buf())
        .collect();

    if files.is_empty() {
        return Err(SpevalError::EmptyCorpus {
            dir: dir.display().to_string(),
        });
    }

    files.sort();
    Ok(files)
}

/// Align two file lists by basename, preserving clean-side order.
///
/// Clean files without a same-named noisy partner are skipped with a
/// warning rather than failing the whole run.
pub fn pair_by_filename(
    clean: Vec<PathBuf>,
    noisy: Vec<PathBuf>,
) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut paired_clean = Vec::with_capacity(clean.len());
    let mut paired_noisy = Vec::with_capacity(clean.len());

    for clean_path in clean {
        let name = clean_path.file_name();
        match noisy.iter().find(|n| n.file_name() == name) {
            Some(noisy_path) => {
                paired_clean.push(clean_path);
                paired_noisy.push(noisy_path.clone());
            }
            None => warn!(
                "No noisy partner for '{}', skipping",
                clean_path.display()
            ),
        }
    }

    (paired_clean, paired_noisy)
}

fn build_model(kind: ModelKind) -> Box<dyn EnhancementModel> {
    match kind {
        ModelKind::Passthrough => Box::new(PassthroughModel),
        ModelKind::SpectralGate => Box::new(SpectralGateModel::new()),
    }
}

/// Save callback writing enhanced audio under `dir`, keyed by source name.
fn save_into(dir: Option<&Path>) -> Result<Option<SaveCallback>> {
    let Some(dir) = dir else {
        return Ok(None);
    };
    std::fs::create_dir_all(dir)?;

    let dir = dir.to_path_buf();
    Ok(Some(Box::new(move |source: &Path, enhanced: &Signal| {
        let name = source
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "enhanced.wav".into());
        save_audio(&dir.join(name), enhanced)
    })))
}

/// Render per-label means as an aligned two-column table.
pub fn format_mean_table(means: &IndexMap<String, f32>) -> String {
    if means.is_empty() {
        return "(no scores recorded)\n".to_string();
    }

    let width = means.keys().map(|k| k.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (label, value) in means {
        out.push_str(&format!("{:<width$}  {:>10.4}\n", label, value, width = width));
    }
    out
}
