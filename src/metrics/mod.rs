//! Quality Metric Engine
//!
//! Every quality measure implements the same accumulate/aggregate protocol:
//! `add` records scores per file for the enhanced signal and optionally the
//! unprocessed noisy baseline, `mean` blocks until pending asynchronous work
//! finishes and reports per-label averages, `flattened` pivots records into
//! a per-file view for CSV reports.
//!
//! Three variants cover the execution models: [`LocalMetric`] runs its
//! formula in the calling thread, [`PooledMetric`] dispatches to the shared
//! worker pool, and the remote constructors in [`remote`] score through a
//! network API with bounded retry.

pub mod formulas;
pub mod pool;
pub mod pooled;
pub mod registry;
pub mod remote;

pub use pool::{Dispatcher, TaskHandle, WorkerPool};
pub use pooled::{FailurePolicy, PooledMetric};
pub use registry::{build_metric, build_noref_metric, FormulaBindings};
pub use remote::{MosApiClient, MosCredentials};

use std::sync::Arc;

use indexmap::IndexMap;

use crate::audio::{Resampler, Signal};
use crate::error::{Result, SpevalError};

/// Per-name score lists: label -> ordered (filename, value) records.
pub type Scores = IndexMap<String, Vec<(Option<String>, f32)>>;

/// Shared intrusive formula: scores a degraded signal against its clean
/// reference. Both signals arrive at the metric's target rate.
pub type IntrusiveFn = Arc<dyn Fn(&Signal, &Signal) -> Result<MetricValue> + Send + Sync>;

/// Shared no-reference formula: scores a signal on its own.
pub type NoRefFn = Arc<dyn Fn(&Signal) -> Result<MetricValue> + Send + Sync>;

/// What a formula returns: one score, or one score per declared name.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Scalar(f32),
    Vector(Vec<f32>),
}

impl MetricValue {
    /// Flatten into positional values.
    pub fn into_vec(self) -> Vec<f32> {
        match self {
            MetricValue::Scalar(v) => vec![v],
            MetricValue::Vector(v) => v,
        }
    }
}

impl From<f32> for MetricValue {
    fn from(v: f32) -> Self {
        MetricValue::Scalar(v)
    }
}

impl From<Vec<f32>> for MetricValue {
    fn from(v: Vec<f32>) -> Self {
        MetricValue::Vector(v)
    }
}

/// The accumulate/aggregate protocol shared by every metric variant.
pub trait Metric: Send {
    /// Labels this metric reports, fixed at construction.
    fn names(&self) -> &[String];

    /// Record scores for one file.
    ///
    /// Intrusive metrics require `clean` and fail without it; no-reference
    /// metrics ignore it. When `noisy` is given, the unprocessed baseline is
    /// scored as well.
    fn add(
        &mut self,
        clean: Option<&Signal>,
        enhanced: &Signal,
        noisy: Option<&Signal>,
        filename: Option<&str>,
    ) -> Result<()>;

    /// Per-label arithmetic means over all recorded values.
    ///
    /// Blocks until every pending asynchronous result for this metric has
    /// completed; a metric never averages a partially-completed result set.
    /// Enhanced results report as `Enhanced <name>`; when baseline records
    /// exist they report as `Noisy <name>`, listed first.
    fn mean(&mut self) -> Result<IndexMap<String, f32>>;

    /// Pivot records into filename -> name -> value, selecting the enhanced
    /// or the noisy-baseline side.
    fn flattened(&self, noisy: bool) -> IndexMap<String, IndexMap<String, f32>>;
}

impl std::fmt::Debug for dyn Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metric").field("names", &self.names()).finish()
    }
}

// ============================================================================
// ScoreTable: shared accumulate/aggregate state
// ============================================================================

/// Record storage composed into every metric variant.
#[derive(Debug, Clone)]
pub struct ScoreTable {
    names: Vec<String>,
    enhanced: Scores,
    noisy: Scores,
    resampler: Option<Resampler>,
}

impl ScoreTable {
    /// Create a table for the given name set, optionally with a resampler
    /// that converts incoming signals to the formula's expected rate.
    pub fn new(names: Vec<String>, resampler: Option<Resampler>) -> Self {
        Self {
            names,
            enhanced: Scores::default(),
            noisy: Scores::default(),
            resampler,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Display label used in error messages.
    pub fn label(&self) -> String {
        self.names.join("/")
    }

    pub fn resampler(&self) -> Option<&Resampler> {
        self.resampler.as_ref()
    }

    /// Convert a signal to the formula's rate, or clone it when no
    /// conversion is configured.
    pub fn prepare(&self, signal: &Signal) -> Result<Signal> {
        match &self.resampler {
            Some(r) => r.apply(signal),
            None => Ok(signal.clone()),
        }
    }

    pub fn record_enhanced(&mut self, value: MetricValue, filename: Option<&str>) -> Result<()> {
        Self::record(&mut self.enhanced, &self.names, value, filename)
    }

    pub fn record_noisy(&mut self, value: MetricValue, filename: Option<&str>) -> Result<()> {
        Self::record(&mut self.noisy, &self.names, value, filename)
    }

    fn record(
        map: &mut Scores,
        names: &[String],
        value: MetricValue,
        filename: Option<&str>,
    ) -> Result<()> {
        let values = value.into_vec();
        if values.len() != names.len() {
            return Err(SpevalError::ScoreShape {
                metric: names.join("/"),
                expected: names.len(),
                got: values.len(),
            });
        }
        for (name, v) in names.iter().zip(values) {
            map.entry(name.clone())
                .or_default()
                .push((filename.map(|f| f.to_string()), v));
        }
        Ok(())
    }

    /// Per-label means in declared name order, baseline label before the
    /// enhanced label for each name.
    pub fn mean(&self) -> IndexMap<String, f32> {
        let mut out = IndexMap::new();
        for name in &self.names {
            if let Some(values) = self.noisy.get(name) {
                if !values.is_empty() {
                    out.insert(format!("Noisy {}", name), Self::average(values));
                }
            }
            if let Some(values) = self.enhanced.get(name) {
                if !values.is_empty() {
                    out.insert(format!("Enhanced {}", name), Self::average(values));
                }
            }
        }
        out
    }

    fn average(values: &[(Option<String>, f32)]) -> f32 {
        let sum: f64 = values.iter().map(|(_, v)| *v as f64).sum();
        (sum / values.len() as f64) as f32
    }

    /// Pivot into filename -> name -> value. Records without a filename are
    /// keyed by the empty string.
    pub fn flattened(&self, noisy: bool) -> IndexMap<String, IndexMap<String, f32>> {
        let source = if noisy { &self.noisy } else { &self.enhanced };
        let mut out: IndexMap<String, IndexMap<String, f32>> = IndexMap::new();
        for (name, records) in source {
            for (filename, value) in records {
                let key = filename.clone().unwrap_or_default();
                out.entry(key).or_default().insert(name.clone(), *value);
            }
        }
        out
    }
}

// ============================================================================
// LocalMetric: synchronous execution
// ============================================================================

/// Metric whose formula runs in the calling thread.
pub struct LocalMetric {
    table: ScoreTable,
    formula: IntrusiveFn,
}

impl LocalMetric {
    pub fn new(names: Vec<String>, resampler: Option<Resampler>, formula: IntrusiveFn) -> Self {
        Self {
            table: ScoreTable::new(names, resampler),
            formula,
        }
    }

    /// Run the formula on a prepared signal pair.
    pub fn compute_metric(&self, clean: &Signal, degraded: &Signal) -> Result<MetricValue> {
        (self.formula)(clean, degraded)
    }
}

impl Metric for LocalMetric {
    fn names(&self) -> &[String] {
        self.table.names()
    }

    fn add(
        &mut self,
        clean: Option<&Signal>,
        enhanced: &Signal,
        noisy: Option<&Signal>,
        filename: Option<&str>,
    ) -> Result<()> {
        let clean = clean.ok_or_else(|| SpevalError::MissingReference {
            metric: self.table.label(),
        })?;

        let clean = self.table.prepare(clean)?;
        let enhanced = self.table.prepare(enhanced)?;

        let value = self.compute_metric(&clean, &enhanced)?;
        self.table.record_enhanced(value, filename)?;

        if let Some(noisy) = noisy {
            let noisy = self.table.prepare(noisy)?;
            let value = self.compute_metric(&clean, &noisy)?;
            self.table.record_noisy(value, filename)?;
        }
        Ok(())
    }

    fn mean(&mut self) -> Result<IndexMap<String, f32>> {
        Ok(self.table.mean())
    }

    fn flattened(&self, noisy: bool) -> IndexMap<String, IndexMap<String, f32>> {
        self.table.flattened(noisy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(samples: &[f32]) -> Signal {
        Signal::new(samples.to_vec(), 16000).unwrap()
    }

    fn rms_delta() -> IntrusiveFn {
        Arc::new(|clean: &Signal, degraded: &Signal| {
            let c: f64 = clean.samples.iter().map(|&s| (s as f64).powi(2)).sum();
            let d: f64 = degraded.samples.iter().map(|&s| (s as f64).powi(2)).sum();
            Ok(MetricValue::Scalar((c - d) as f32))
        })
    }

    #[test]
    fn test_scalar_equals_one_element_vector() {
        let scalar = LocalMetric::new(vec!["A".into()], None, rms_delta());
        let vector = LocalMetric::new(
            vec!["A".into()],
            None,
            Arc::new(|clean: &Signal, degraded: &Signal| {
                let c: f64 = clean.samples.iter().map(|&s| (s as f64).powi(2)).sum();
                let d: f64 = degraded.samples.iter().map(|&s| (s as f64).powi(2)).sum();
                Ok(MetricValue::Vector(vec![(c - d) as f32]))
            }),
        );

        let clean = signal(&[1.0, 1.0]);
        let enh = signal(&[0.5, 0.5]);

        for mut m in [scalar, vector] {
            m.add(Some(&clean), &enh, None, Some("a.wav")).unwrap();
            let mean = m.mean().unwrap();
            assert_eq!(mean.len(), 1);
            assert!((mean["Enhanced A"] - 1.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let mut m = LocalMetric::new(
            vec!["A".into(), "B".into()],
            None,
            Arc::new(|_: &Signal, _: &Signal| Ok(MetricValue::Scalar(1.0))),
        );
        let s = signal(&[0.0, 0.0]);
        let err = m.add(Some(&s), &s, None, None).unwrap_err();
        assert!(matches!(err, SpevalError::ScoreShape { expected: 2, got: 1, .. }));
    }

    #[test]
    fn test_missing_reference_is_fatal() {
        let mut m = LocalMetric::new(vec!["A".into()], None, rms_delta());
        let s = signal(&[0.0]);
        let err = m.add(None, &s, None, None).unwrap_err();
        assert!(matches!(err, SpevalError::MissingReference { .. }));
    }

    #[test]
    fn test_mean_orders_noisy_before_enhanced() {
        let mut m = LocalMetric::new(vec!["A".into()], None, rms_delta());
        let clean = signal(&[1.0]);
        let enh = signal(&[1.0]);
        let noisy = signal(&[0.0]);
        m.add(Some(&clean), &enh, Some(&noisy), Some("a.wav")).unwrap();

        let mean = m.mean().unwrap();
        let labels: Vec<&String> = mean.keys().collect();
        assert_eq!(labels, vec!["Noisy A", "Enhanced A"]);
    }

    #[test]
    fn test_flattened_partitions_by_filename() {
        let mut m = LocalMetric::new(vec!["A".into()], None, rms_delta());
        let clean = signal(&[1.0, 1.0]);
        let enh = signal(&[1.0, 1.0]);
        let noisy = signal(&[0.0, 0.0]);

        m.add(Some(&clean), &enh, Some(&noisy), Some("a.wav")).unwrap();
        m.add(Some(&clean), &enh, Some(&noisy), Some("b.wav")).unwrap();

        let enh_flat = m.flattened(false);
        let noisy_flat = m.flattened(true);
        assert_eq!(enh_flat.len(), 2);
        assert!(enh_flat["a.wav"].contains_key("A"));
        assert!(noisy_flat["b.wav"].contains_key("A"));
        assert!((noisy_flat["a.wav"]["A"] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_unnamed_records_key_empty_string() {
        let mut m = LocalMetric::new(vec!["A".into()], None, rms_delta());
        let s = signal(&[0.5]);
        m.add(Some(&s), &s, None, None).unwrap();
        let flat = m.flattened(false);
        assert!(flat.contains_key(""));
    }
}
