//! Pooled Metric
//!
//! Dispatches formula evaluation to the shared worker pool. The enhanced
//! signal's score is awaited before `add` returns, so primary results land
//! in file order; the noisy baseline's handle is queued and drained inside
//! `mean()`, which then tears the pool down before aggregating.
//!
//! Job closures capture owned sample buffers, a cloned resampler, and the
//! shared formula. No pool handle or queue state ever crosses into a worker.

use std::collections::VecDeque;

use indexmap::IndexMap;

use super::pool::{Dispatcher, TaskHandle};
use super::{IntrusiveFn, Metric, MetricValue, NoRefFn, ScoreTable};
use crate::audio::{Resampler, Signal};
use crate::error::{Result, SpevalError};

/// What to do when an asynchronous computation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the error and drop the record; the run continues with a smaller
    /// sample count for this metric.
    LogAndDrop,
    /// Propagate the error and abort the run. Used by remote metrics, where
    /// retry exhaustion must surface.
    Fail,
}

enum PooledFormula {
    Intrusive(IntrusiveFn),
    NoReference(NoRefFn),
}

/// Metric whose formula runs on the shared dispatcher.
pub struct PooledMetric {
    table: ScoreTable,
    formula: PooledFormula,
    dispatcher: Dispatcher,
    pending: VecDeque<(Option<String>, TaskHandle<Result<MetricValue>>)>,
    policy: FailurePolicy,
}

impl PooledMetric {
    /// Pooled metric scoring degraded signals against the clean reference.
    pub fn intrusive(
        names: Vec<String>,
        resampler: Option<Resampler>,
        dispatcher: Dispatcher,
        formula: IntrusiveFn,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            table: ScoreTable::new(names, resampler),
            formula: PooledFormula::Intrusive(formula),
            dispatcher,
            pending: VecDeque::new(),
            policy,
        }
    }

    /// Pooled metric scoring each signal on its own, without a reference.
    pub fn no_reference(
        names: Vec<String>,
        resampler: Option<Resampler>,
        dispatcher: Dispatcher,
        formula: NoRefFn,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            table: ScoreTable::new(names, resampler),
            formula: PooledFormula::NoReference(formula),
            dispatcher,
            pending: VecDeque::new(),
            policy,
        }
    }

    /// Run the formula directly in the calling thread.
    pub fn compute_metric(&self, clean: Option<&Signal>, degraded: &Signal) -> Result<MetricValue> {
        match &self.formula {
            PooledFormula::Intrusive(f) => {
                let clean = clean.ok_or_else(|| SpevalError::MissingReference {
                    metric: self.table.label(),
                })?;
                f(clean, degraded)
            }
            PooledFormula::NoReference(f) => f(degraded),
        }
    }

    /// Submit one scoring job. Resampling happens inside the worker so the
    /// caller thread is not serialized on rate conversion.
    fn submit_job(
        &self,
        clean: Option<&Signal>,
        degraded: &Signal,
    ) -> Result<TaskHandle<Result<MetricValue>>> {
        let resampler = self.table.resampler().cloned();
        let degraded = degraded.clone();

        match &self.formula {
            PooledFormula::Intrusive(f) => {
                let clean = clean
                    .ok_or_else(|| SpevalError::MissingReference {
                        metric: self.table.label(),
                    })?
                    .clone();
                let f = f.clone();
                self.dispatcher.submit(move || {
                    let (clean, degraded) = match &resampler {
                        Some(r) => (r.apply(&clean)?, r.apply(&degraded)?),
                        None => (clean, degraded),
                    };
                    f(&clean, &degraded)
                })
            }
            PooledFormula::NoReference(f) => {
                let f = f.clone();
                self.dispatcher.submit(move || {
                    let degraded = match &resampler {
                        Some(r) => r.apply(&degraded)?,
                        None => degraded,
                    };
                    f(&degraded)
                })
            }
        }
    }

    /// Apply the failure policy to one failed computation.
    fn on_failure(&self, error: SpevalError, filename: Option<&str>) -> Result<()> {
        match self.policy {
            FailurePolicy::LogAndDrop => {
                log::error!(
                    "Metric {} failed on '{}': {}",
                    self.table.label(),
                    filename.unwrap_or("<unnamed>"),
                    error
                );
                Ok(())
            }
            FailurePolicy::Fail => Err(error),
        }
    }
}

impl Metric for PooledMetric {
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
        // Primary score: submit and block so it is durably recorded before
        // the loop moves to the next file.
        let handle = self.submit_job(clean, enhanced)?;
        match handle.wait() {
            Ok(Ok(value)) => self.table.record_enhanced(value, filename)?,
            Ok(Err(e)) | Err(e) => self.on_failure(e, filename)?,
        }

        // Baseline score: defer the handle for collection in mean().
        if let Some(noisy) = noisy {
            let handle = self.submit_job(clean, noisy)?;
            self.pending
                .push_back((filename.map(|f| f.to_string()), handle));
        }

        Ok(())
    }

    fn mean(&mut self) -> Result<IndexMap<String, f32>> {
        while let Some((filename, handle)) = self.pending.pop_front() {
            match handle.wait() {
                Ok(Ok(value)) => self.table.record_noisy(value, filename.as_deref())?,
                Ok(Err(e)) | Err(e) => self.on_failure(e, filename.as_deref())?,
            }
        }

        // Single-use pool: the first metric to aggregate tears it down,
        // later calls are no-ops.
        self.dispatcher.shutdown();
        Ok(self.table.mean())
    }

    fn flattened(&self, noisy: bool) -> IndexMap<String, IndexMap<String, f32>> {
        self.table.flattened(noisy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn signal(value: f32, n: usize) -> Signal {
        Signal::new(vec![value; n], 16000).unwrap()
    }

    fn energy_formula() -> IntrusiveFn {
        Arc::new(|clean: &Signal, degraded: &Signal| {
            let c: f64 = clean.samples.iter().map(|&s| (s as f64).powi(2)).sum();
            let d: f64 = degraded.samples.iter().map(|&s| (s as f64).powi(2)).sum();
            Ok(MetricValue::Scalar((c - d) as f32))
        })
    }

    #[test]
    fn test_enhanced_records_follow_file_order() {
        // Jobs sleep a varying amount; blocking on the enhanced handle must
        // still keep records in submission order.
        let formula: IntrusiveFn = Arc::new(|_: &Signal, degraded: &Signal| {
            let ms = (degraded.samples[0] * 10.0) as u64 % 7;
            std::thread::sleep(Duration::from_millis(ms));
            Ok(MetricValue::Scalar(degraded.samples[0]))
        });
        let mut m = PooledMetric::intrusive(
            vec!["E".into()],
            None,
            Dispatcher::new(4),
            formula,
            FailurePolicy::LogAndDrop,
        );

        let clean = signal(0.0, 4);
        for i in 0..8 {
            let enh = signal(i as f32, 4);
            m.add(Some(&clean), &enh, None, Some(&format!("f{}.wav", i)))
                .unwrap();
        }

        let flat = m.flattened(false);
        let files: Vec<&String> = flat.keys().collect();
        let expected: Vec<String> = (0..8).map(|i| format!("f{}.wav", i)).collect();
        assert_eq!(files, expected.iter().collect::<Vec<_>>());
        m.mean().unwrap();
    }

    #[test]
    fn test_mean_waits_for_all_baselines() {
        let mut m = PooledMetric::intrusive(
            vec!["E".into()],
            None,
            Dispatcher::new(2),
            Arc::new(|_: &Signal, d: &Signal| {
                std::thread::sleep(Duration::from_millis(3));
                Ok(MetricValue::Scalar(d.samples[0]))
            }),
            FailurePolicy::LogAndDrop,
        );

        let clean = signal(0.0, 4);
        let n = 6;
        for i in 0..n {
            let enh = signal(1.0, 4);
            let noisy = signal(2.0, 4);
            m.add(Some(&clean), &enh, Some(&noisy), Some(&format!("{}.wav", i)))
                .unwrap();
        }

        let mean = m.mean().unwrap();
        assert_eq!(m.flattened(true).len(), n);
        assert!((mean["Noisy E"] - 2.0).abs() < 1e-6);
        assert!((mean["Enhanced E"] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_enhanced_mean_covers_exactly_n_records() {
        let mut m = PooledMetric::intrusive(
            vec!["E".into()],
            None,
            Dispatcher::new(3),
            energy_formula(),
            FailurePolicy::LogAndDrop,
        );

        let clean = signal(1.0, 8);
        let n = 10;
        for i in 0..n {
            let enh = signal(0.5, 8);
            m.add(Some(&clean), &enh, None, Some(&format!("{}.wav", i)))
                .unwrap();
        }

        assert_eq!(m.flattened(false).len(), n);
        let mean = m.mean().unwrap();
        // Every pair contributes (1.0^2 - 0.5^2) * 8 = 6.0.
        assert!((mean["Enhanced E"] - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_log_and_drop_omits_failed_records() {
        let formula: IntrusiveFn = Arc::new(|_: &Signal, degraded: &Signal| {
            if degraded.samples[0] < 0.0 {
                Err(SpevalError::FormulaFailed {
                    metric: "E".into(),
                    reason: "negative probe".into(),
                })
            } else {
                Ok(MetricValue::Scalar(1.0))
            }
        });
        let mut m = PooledMetric::intrusive(
            vec!["E".into()],
            None,
            Dispatcher::new(2),
            formula,
            FailurePolicy::LogAndDrop,
        );

        let clean = signal(0.0, 4);
        m.add(Some(&clean), &signal(1.0, 4), None, Some("good.wav"))
            .unwrap();
        m.add(Some(&clean), &signal(-1.0, 4), None, Some("bad.wav"))
            .unwrap();

        let mean = m.mean().unwrap();
        let flat = m.flattened(false);
        assert_eq!(flat.len(), 1);
        assert!(flat.contains_key("good.wav"));
        assert!((mean["Enhanced E"] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fail_policy_propagates_enhanced_errors() {
        let formula: IntrusiveFn = Arc::new(|_: &Signal, _: &Signal| {
            Err(SpevalError::FormulaFailed {
                metric: "E".into(),
                reason: "down".into(),
            })
        });
        let mut m = PooledMetric::intrusive(
            vec!["E".into()],
            None,
            Dispatcher::new(1),
            formula,
            FailurePolicy::Fail,
        );

        let clean = signal(0.0, 4);
        let err = m.add(Some(&clean), &signal(1.0, 4), None, None).unwrap_err();
        assert!(matches!(err, SpevalError::FormulaFailed { .. }));
    }

    #[test]
    fn test_fail_policy_propagates_baseline_errors_in_mean() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = Arc::clone(&calls);
        // First call (enhanced) succeeds, second (baseline) fails.
        let formula: IntrusiveFn = Arc::new(move |_: &Signal, _: &Signal| {
            if calls_in.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(MetricValue::Scalar(1.0))
            } else {
                Err(SpevalError::FormulaFailed {
                    metric: "E".into(),
                    reason: "late".into(),
                })
            }
        });
        let mut m = PooledMetric::intrusive(
            vec!["E".into()],
            None,
            Dispatcher::Inline,
            formula,
            FailurePolicy::Fail,
        );

        let clean = signal(0.0, 4);
        m.add(Some(&clean), &signal(1.0, 4), Some(&signal(2.0, 4)), None)
            .unwrap();
        assert!(m.mean().is_err());
    }

    #[test]
    fn test_no_reference_ignores_clean() {
        let formula: NoRefFn =
            Arc::new(|degraded: &Signal| Ok(MetricValue::Scalar(degraded.samples[0])));
        let mut m = PooledMetric::no_reference(
            vec!["M".into()],
            None,
            Dispatcher::Inline,
            formula,
            FailurePolicy::Fail,
        );

        m.add(None, &signal(3.0, 4), Some(&signal(4.0, 4)), Some("x.wav"))
            .unwrap();
        let mean = m.mean().unwrap();
        assert!((mean["Enhanced M"] - 3.0).abs() < 1e-6);
        assert!((mean["Noisy M"] - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_shared_pool_survives_two_metric_means() {
        let dispatcher = Dispatcher::new(2);
        let mut a = PooledMetric::intrusive(
            vec!["A".into()],
            None,
            dispatcher.clone(),
            energy_formula(),
            FailurePolicy::LogAndDrop,
        );
        let mut b = PooledMetric::intrusive(
            vec!["B".into()],
            None,
            dispatcher,
            energy_formula(),
            FailurePolicy::LogAndDrop,
        );

        let clean = signal(1.0, 4);
        let enh = signal(0.5, 4);
        let noisy = signal(0.0, 4);
        a.add(Some(&clean), &enh, Some(&noisy), Some("a.wav")).unwrap();
        b.add(Some(&clean), &enh, Some(&noisy), Some("a.wav")).unwrap();

        // First mean tears the pool down; the second must still aggregate
        // its already-completed handles.
        let mean_a = a.mean().unwrap();
        let mean_b = b.mean().unwrap();
        assert!(mean_a.contains_key("Enhanced A"));
        assert!(mean_b.contains_key("Noisy B"));
    }

    #[test]
    fn test_intrusive_requires_clean() {
        let mut m = PooledMetric::intrusive(
            vec!["E".into()],
            None,
            Dispatcher::Inline,
            energy_formula(),
            FailurePolicy::Fail,
        );
        let err = m.add(None, &signal(1.0, 4), None, None).unwrap_err();
        assert!(matches!(err, SpevalError::MissingReference { .. }));
    }
}
