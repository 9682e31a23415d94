//! CLI Module
//!
//! Command-line interface for the speech enhancement evaluation harness.

pub mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Speech enhancement evaluation harness
#[derive(Parser, Debug)]
#[command(name = "speval")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate enhancement quality over a paired clean/noisy corpus
    #[command(name = "evaluate")]
    Evaluate(EvaluateArgs),

    /// Score enhancement output with no-reference MOS predictors
    #[command(name = "evaluate-noref")]
    EvaluateNoref(NorefArgs),
}

/// Built-in enhancement models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelKind {
    /// Identity model, scores the analysis/synthesis chain itself
    Passthrough,
    /// Spectral gate driven by a leading-frame noise floor estimate
    SpectralGate,
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory of clean reference WAV files
    #[arg(long)]
    pub clean_dir: PathBuf,

    /// Directory of noisy WAV files with matching names
    #[arg(long)]
    pub noisy_dir: PathBuf,

    /// Comma-separated metric names
    #[arg(short, long, value_delimiter = ',', default_values_t = [String::from("stoi"), String::from("sisdr")])]
    pub metrics: Vec<String>,

    /// Worker threads for metric computation; 0 runs inline
    #[arg(short, long, default_value_t = 4)]
    pub workers: i32,

    /// Progress cadence in percent; 0 disables progress logging
    #[arg(long, default_value_t = 10)]
    pub log_percent: u32,

    /// Write per-file enhanced scores to this CSV
    #[arg(long)]
    pub csv_enh: Option<PathBuf>,

    /// Write per-file noisy-baseline scores to this CSV
    #[arg(long)]
    pub csv_noisy: Option<PathBuf>,

    /// Save enhanced audio into this directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Highpass cutoff in Hz applied to enhanced output
    #[arg(long)]
    pub hp_cutoff: Option<f32>,

    /// Use the Octave-backed composite measure
    #[arg(long)]
    pub octave: bool,

    /// Enhancement model under test
    #[arg(long, value_enum, default_value_t = ModelKind::Passthrough)]
    pub model: ModelKind,

    /// Processing sample rate in Hz
    #[arg(short = 'r', long, default_value_t = 16000)]
    pub sample_rate: u32,
}

#[derive(Args, Debug)]
pub struct NorefArgs {
    /// Directory of noisy WAV files
    #[arg(long)]
    pub noisy_dir: PathBuf,

    /// Comma-separated no-reference metric names
    #[arg(short, long, value_delimiter = ',', default_values_t = [String::from("p808")])]
    pub metrics: Vec<String>,

    /// Worker threads for remote scoring; 0 runs inline
    #[arg(short, long, default_value_t = 8)]
    pub workers: i32,

    /// Progress cadence in percent; 0 disables progress logging
    #[arg(long, default_value_t = 10)]
    pub log_percent: u32,

    /// Write per-file enhanced scores to this CSV
    #[arg(long)]
    pub csv_enh: Option<PathBuf>,

    /// Write per-file noisy-baseline scores to this CSV
    #[arg(long)]
    pub csv_noisy: Option<PathBuf>,

    /// Save enhanced audio into this directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Highpass cutoff in Hz applied to enhanced output
    #[arg(long)]
    pub hp_cutoff: Option<f32>,

    /// Enhancement model under test
    #[arg(long, value_enum, default_value_t = ModelKind::Passthrough)]
    pub model: ModelKind,

    /// Processing sample rate in Hz
    #[arg(short = 'r', long, default_value_t = 16000)]
    pub sample_rate: u32,
}
