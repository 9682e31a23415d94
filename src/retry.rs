//! Bounded retry for fallible operations.
//!
//! Remote scoring endpoints drop requests under load, so calls are retried
//! a fixed number of times with no backoff. Per-attempt timeouts live in
//! the HTTP client; this module only counts attempts.

use std::time::Duration;

use crate::error::{Result, SpevalError};

/// Attempt budget and per-attempt timeout for one remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, timeout: Duration) -> Self {
        Self {
            max_attempts,
            timeout,
        }
    }
}

/// Run `op` until it succeeds, fails unrecoverably, or the attempt budget
/// is spent.
///
/// The closure receives the 1-based attempt number. An error rejected by
/// `is_retryable` is returned as-is without consuming further attempts.
/// Retryable failures are logged at warn level; once the budget is
/// exhausted the last error is folded into [`SpevalError::RetryExhausted`].
pub fn retry_with<T, F, P>(policy: &RetryPolicy, is_retryable: P, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
    P: Fn(&SpevalError) -> bool,
{
    let mut last: Option<SpevalError> = None;

    for attempt in 1..=policy.max_attempts {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => {
                log::warn!(
                    "Attempt {}/{} failed: {}",
                    attempt,
                    policy.max_attempts,
                    e
                );
                last = Some(e);
            }
        }
    }

    Err(SpevalError::RetryExhausted {
        attempts: policy.max_attempts,
        last: last
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts were made".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_secs(50))
    }

    fn retry_all(_: &SpevalError) -> bool {
        true
    }

    fn flaky(fail_times: u32) -> impl FnMut(u32) -> Result<u32> {
        let calls = AtomicU32::new(0);
        move |_attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < fail_times {
                Err(SpevalError::RemoteApi {
                    reason: format!("transient failure {}", n),
                    source: None,
                })
            } else {
                Ok(n)
            }
        }
    }

    #[test]
    fn test_first_attempt_success_short_circuits() {
        let mut calls = 0;
        let result = retry_with(&policy(20), retry_all, |_| {
            calls += 1;
            Ok::<_, SpevalError>(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_recovers_on_the_last_allowed_attempt() {
        // 19 failures then success still fits in a 20-attempt budget.
        let result = retry_with(&policy(20), retry_all, flaky(19));
        assert_eq!(result.unwrap(), 19);
    }

    #[test]
    fn test_exhaustion_reports_attempts_and_last_error() {
        let err = retry_with(&policy(20), retry_all, flaky(20)).unwrap_err();
        match err {
            SpevalError::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 20);
                assert!(
                    last.contains("transient failure 19"),
                    "last error should be the final attempt's, got: {}",
                    last
                );
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_non_retryable_error_returns_immediately() {
        let mut calls = 0;
        let err = retry_with(
            &policy(20),
            |e| !matches!(e, SpevalError::MissingField { .. }),
            |_| {
                calls += 1;
                Err::<(), _>(SpevalError::MissingField {
                    field: "mos".into(),
                })
            },
        )
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, SpevalError::MissingField { .. }));
    }

    #[test]
    fn test_zero_attempt_budget_never_calls_op() {
        let mut calls = 0;
        let err = retry_with(&policy(0), retry_all, |_| {
            calls += 1;
            Ok::<_, SpevalError>(())
        })
        .unwrap_err();
        assert_eq!(calls, 0);
        assert!(matches!(
            err,
            SpevalError::RetryExhausted { attempts: 0, .. }
        ));
    }

    #[test]
    fn test_attempt_numbers_are_one_based() {
        let mut seen = Vec::new();
        let _ = retry_with(&policy(3), retry_all, |attempt| {
            seen.push(attempt);
            Err::<(), _>(SpevalError::RemoteApi {
                reason: "down".into(),
                source: None,
            })
        });
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
