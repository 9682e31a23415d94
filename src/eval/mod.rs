//! Evaluation loops over speech corpora.
//!
//! [`evaluate_corpus`] walks paired clean/noisy files and scores the
//! enhanced output against the clean reference; [`evaluate_noref`] walks
//! noisy files alone and scores through no-reference metrics. Both share
//! [`EvalOptions`] for metric selection, worker count, progress cadence,
//! and report outputs.

pub mod corpus;
pub mod noref;
pub mod progress;
pub mod report;

pub use corpus::evaluate_corpus;
pub use noref::{evaluate_noref, evaluate_noref_with_metrics};
pub use progress::Progress;
pub use report::{collect_rows, write_csv};

use std::path::{Path, PathBuf};

use crate::audio::Signal;
use crate::error::Result;
use crate::metrics::FormulaBindings;

/// Invoked after each file with the source path and the enhanced signal,
/// typically to write the enhanced audio next to the input corpus.
pub type SaveCallback = Box<dyn FnMut(&Path, &Signal) -> Result<()>>;

/// Knobs shared by both evaluation loops.
pub struct EvalOptions {
    /// Metric names, resolved case-insensitively.
    pub metrics: Vec<String>,
    /// Worker threads for metric computation; zero or negative runs every
    /// formula inline on the calling thread.
    pub n_workers: i32,
    /// Progress cadence in percent; values outside (0, 100) disable it.
    pub log_percent: u32,
    /// Per-file CSV report for enhanced scores.
    pub csv_enhanced: Option<PathBuf>,
    /// Per-file CSV report for noisy-baseline scores.
    pub csv_noisy: Option<PathBuf>,
    pub save_callback: Option<SaveCallback>,
    /// Optional highpass cutoff in Hz applied to enhanced output.
    pub highpass_cutoff: Option<f32>,
    /// Use the Octave-backed composite binding when `composite` is selected.
    pub use_octave: bool,
    pub bindings: FormulaBindings,
}

impl EvalOptions {
    /// Defaults for paired-corpus evaluation.
    pub fn corpus_defaults() -> Self {
        Self {
            metrics: vec!["stoi".to_string(), "sisdr".to_string()],
            n_workers: 4,
            log_percent: 10,
            csv_enhanced: None,
            csv_noisy: None,
            save_callback: None,
            highpass_cutoff: None,
            use_octave: false,
            bindings: FormulaBindings::default(),
        }
    }

    /// Defaults for no-reference evaluation, sized for network-bound
    /// remote scoring.
    pub fn noref_defaults() -> Self {
        Self {
            metrics: vec!["p808".to_string()],
            n_workers: 8,
            ..Self::corpus_defaults()
        }
    }
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self::corpus_defaults()
    }
}

pub(crate) fn basename(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}
