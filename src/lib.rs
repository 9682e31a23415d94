//! Speval - Speech Enhancement Evaluation Harness
//!
//! Speval measures how much a speech enhancement model actually improves
//! degraded audio. It runs a model over a corpus, scores the output with
//! standard objective measures, and reports per-file and mean results
//! against the unprocessed noisy baseline.
//!
//! # Architecture
//!
//! - Audio layer: WAV I/O, mixdown, and sample rate conversion
//! - Transform: windowed analysis/synthesis the models operate inside
//! - Metrics: accumulate/aggregate protocol over local, pooled, and
//!   remote scoring backends
//! - Eval: corpus walkers tying enhancement and scoring together

pub mod audio;
pub mod cli;
pub mod enhance;
pub mod error;
pub mod eval;
pub mod metrics;
pub mod model;
pub mod retry;
pub mod transform;

pub use error::{Result, SpevalError};
