//! Metric construction by name.
//!
//! Maps user-facing metric names onto configured metric instances. The
//! lightweight measures ship built in; PESQ and the composite measure are
//! external programs in most deployments, so they are injected as
//! [`FormulaBindings`] and selecting one without a binding is a
//! configuration error, not a silent skip.

use std::sync::Arc;

use super::formulas;
use super::pool::Dispatcher;
use super::pooled::{FailurePolicy, PooledMetric};
use super::remote::{self, MosCredentials};
use super::{IntrusiveFn, Metric, MetricValue};
use crate::audio::{ResampleMethod, Resampler, Signal};
use crate::error::{Result, SpevalError};

const PESQ_WB_RATE: u32 = 16_000;
const PESQ_NB_RATE: u32 = 8_000;
const COMPOSITE_RATE: u32 = 16_000;

/// Externally supplied formulas for the measures this crate does not
/// implement itself.
#[derive(Clone, Default)]
pub struct FormulaBindings {
    /// Wideband PESQ, fed 16 kHz signals, one `PESQ` score.
    pub pesq_wb: Option<IntrusiveFn>,
    /// Narrowband PESQ, fed 8 kHz signals, one `PESQ-NB` score.
    pub pesq_nb: Option<IntrusiveFn>,
    /// Composite measure, fed 16 kHz signals, five scores in the order
    /// `PESQ`, `CSIG`, `CBAK`, `COVL`, `SSNR`.
    pub composite: Option<IntrusiveFn>,
    /// Octave-backed variant of the composite measure, same columns.
    pub composite_octave: Option<IntrusiveFn>,
}

/// Build one reference-based metric by name, case-insensitively.
///
/// `model_rate` is the rate signals arrive at; each metric carries its own
/// converter down to the rate its formula expects.
pub fn build_metric(
    name: &str,
    model_rate: u32,
    dispatcher: &Dispatcher,
    bindings: &FormulaBindings,
) -> Result<Box<dyn Metric>> {
    let normalized = name.to_lowercase();

    match normalized.as_str() {
        "sisdr" | "si-sdr" | "si_sdr" => Ok(pooled_builtin(
            &["SISDR"],
            None,
            Arc::new(|c: &Signal, d: &Signal| {
                formulas::si_sdr(&c.samples, &d.samples).map(MetricValue::Scalar)
            }),
            dispatcher,
        )),
        "stoi" => Ok(pooled_builtin(
            &["STOI"],
            Some(to_rate(model_rate, formulas::STOI_RATE)?),
            Arc::new(|c: &Signal, d: &Signal| formulas::stoi(c, d).map(MetricValue::Scalar)),
            dispatcher,
        )),
        "snr" => Ok(pooled_builtin(
            &["SNR"],
            None,
            Arc::new(|c: &Signal, d: &Signal| {
                formulas::snr(&c.samples, &d.samples).map(MetricValue::Scalar)
            }),
            dispatcher,
        )),
        "ssnr" => Ok(pooled_builtin(
            &["SSNR"],
            None,
            Arc::new(|c: &Signal, d: &Signal| formulas::ssnr(c, d).map(MetricValue::Scalar)),
            dispatcher,
        )),
        "pesq" | "pesq-wb" => Ok(pooled_bound(
            &["PESQ"],
            Some(to_rate(model_rate, PESQ_WB_RATE)?),
            bindings.pesq_wb.clone(),
            name,
            dispatcher,
        )?),
        "pesq-nb" | "pesqnb" => Ok(pooled_bound(
            &["PESQ-NB"],
            Some(to_rate(model_rate, PESQ_NB_RATE)?),
            bindings.pesq_nb.clone(),
            name,
            dispatcher,
        )?),
        "composite" => Ok(pooled_bound(
            &["PESQ", "CSIG", "CBAK", "COVL", "SSNR"],
            Some(to_rate(model_rate, COMPOSITE_RATE)?),
            bindings.composite.clone(),
            name,
            dispatcher,
        )?),
        "composite-octave" | "composite_octave" => Ok(pooled_bound(
            &["PESQ", "CSIG", "CBAK", "COVL", "SSNR"],
            Some(to_rate(model_rate, COMPOSITE_RATE)?),
            bindings.composite_octave.clone(),
            name,
            dispatcher,
        )?),
        _ => Err(SpevalError::UnknownMetric {
            name: name.to_string(),
        }),
    }
}

/// Build one no-reference metric by name, case-insensitively.
pub fn build_noref_metric(
    name: &str,
    model_rate: u32,
    credentials: &MosCredentials,
    dispatcher: &Dispatcher,
) -> Result<Box<dyn Metric>> {
    let normalized = name.to_lowercase();

    match normalized.as_str() {
        "p808" | "dnsmos" => Ok(Box::new(remote::p808_metric(
            model_rate,
            credentials,
            dispatcher.clone(),
        )?)),
        "p835" | "dnsmosp835" => Ok(Box::new(remote::p835_metric(
            model_rate,
            credentials,
            dispatcher.clone(),
        )?)),
        _ => Err(SpevalError::UnknownMetric {
            name: name.to_string(),
        }),
    }
}

fn to_rate(model_rate: u32, target: u32) -> Result<Resampler> {
    Resampler::new(model_rate, target, ResampleMethod::SincFast)
}

fn pooled_builtin(
    names: &[&str],
    resampler: Option<Resampler>,
    formula: IntrusiveFn,
    dispatcher: &Dispatcher,
) -> Box<dyn Metric> {
    Box::new(PooledMetric::intrusive(
        names.iter().map(|n| n.to_string()).collect(),
        resampler,
        dispatcher.clone(),
        formula,
        FailurePolicy::LogAndDrop,
    ))
}

fn pooled_bound(
    names: &[&str],
    resampler: Option<Resampler>,
    formula: Option<IntrusiveFn>,
    requested: &str,
    dispatcher: &Dispatcher,
) -> Result<Box<dyn Metric>> {
    let formula = formula.ok_or_else(|| SpevalError::UnboundFormula {
        name: requested.to_string(),
    })?;
    Ok(pooled_builtin(names, resampler, formula, dispatcher))
}
