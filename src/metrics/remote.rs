//! Remote MOS scoring over the DNS-MOS web API.
//!
//! Builds no-reference pooled metrics whose formula posts raw samples to a
//! hosted scoring service. The service is rate limited and flaky under
//! load, so every request runs under a fixed retry budget with a long
//! per-attempt timeout. Remote failures are fatal for the run: a mean over
//! silently dropped network scores would be misleading.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::pool::Dispatcher;
use super::pooled::{FailurePolicy, PooledMetric};
use super::{MetricValue, NoRefFn};
use crate::audio::{ResampleMethod, Resampler, Signal};
use crate::error::{Result, SpevalError};
use crate::retry::{retry_with, RetryPolicy};

/// Environment variable holding the API key.
pub const AUTH_KEY_VAR: &str = "DNS_AUTH_KEY";

/// Hosted DNS-MOS service.
pub const DEFAULT_BASE_URL: &str = "https://dnsmos.azurewebsites.net";

/// Sample rate the service expects.
pub const MOS_SAMPLE_RATE: u32 = 16_000;

const P808_PATH: &str = "/score";
const P835_PATH: &str = "/v1/dnsmosp835/score";

const MAX_RETRIES: u32 = 20;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(50);

/// API key for the scoring service.
#[derive(Debug, Clone)]
pub struct MosCredentials {
    key: String,
}

impl MosCredentials {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Read the key from `DNS_AUTH_KEY`.
    pub fn from_env() -> Result<Self> {
        env::var(AUTH_KEY_VAR)
            .map(|key| Self { key })
            .map_err(|_| SpevalError::MissingCredential {
                var: AUTH_KEY_VAR.to_string(),
            })
    }
}

/// Wire payload for one scoring request.
#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    data: &'a [f32],
    filename: &'a str,
}

/// Blocking client for one DNS-MOS endpoint.
pub struct MosApiClient {
    url: String,
    fields: Vec<String>,
    auth_header: String,
    policy: RetryPolicy,
}

impl MosApiClient {
    /// Client for the P.808 endpoint (single overall MOS).
    pub fn p808(credentials: &MosCredentials) -> Self {
        Self::with_config(
            DEFAULT_BASE_URL,
            P808_PATH,
            &["mos"],
            credentials,
            RetryPolicy::new(MAX_RETRIES, REQUEST_TIMEOUT),
        )
    }

    /// Client for the P.835 endpoint (speech, background, overall MOS).
    pub fn p835(credentials: &MosCredentials) -> Self {
        Self::with_config(
            DEFAULT_BASE_URL,
            P835_PATH,
            &["mos_sig", "mos_bak", "mos_ovr"],
            credentials,
            RetryPolicy::new(MAX_RETRIES, REQUEST_TIMEOUT),
        )
    }

    /// Fully parameterized constructor, mainly for pointing at a test server.
    pub fn with_config(
        base_url: &str,
        path: &str,
        fields: &[&str],
        credentials: &MosCredentials,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            url: format!("{}{}", base_url.trim_end_matches('/'), path),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            auth_header: format!("Basic {}", credentials.key),
            policy,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Score one clip, returning the response fields in declaration order.
    ///
    /// Samples must already be at [`MOS_SAMPLE_RATE`]. The request, status
    /// check, and body decode all sit inside the retry loop; only field
    /// extraction runs after a successful round trip. Every transport and
    /// decode error counts as retryable.
    pub fn score(&self, samples: &[f32]) -> Result<Vec<f32>> {
        let payload = ScoreRequest {
            data: samples,
            filename: "audio.wav",
        };

        let body = retry_with(
            &self.policy,
            |e| matches!(e, SpevalError::RemoteApi { .. }),
            |_attempt| self.post_once(&payload),
        )?;
        self.extract_scores(&body)
    }

    fn post_once(&self, payload: &ScoreRequest) -> Result<serde_json::Value> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.policy.timeout)
            .build()
            .map_err(|e| SpevalError::RemoteApi {
                reason: "failed to build HTTP client".to_string(),
                source: Some(e),
            })?;

        let response = client
            .post(&self.url)
            .header("Authorization", &self.auth_header)
            .json(payload)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    SpevalError::RemoteApi {
                        reason: format!(
                            "request timed out after {}s",
                            self.policy.timeout.as_secs()
                        ),
                        source: Some(e),
                    }
                } else if e.is_connect() {
                    SpevalError::RemoteApi {
                        reason: format!("cannot reach {}", self.url),
                        source: Some(e),
                    }
                } else {
                    SpevalError::RemoteApi {
                        reason: "request failed".to_string(),
                        source: Some(e),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpevalError::RemoteApi {
                reason: format!("endpoint returned {}", status),
                source: None,
            });
        }

        response
            .json::<serde_json::Value>()
            .map_err(|e| SpevalError::RemoteApi {
                reason: "invalid response body".to_string(),
                source: Some(e),
            })
    }

    fn extract_scores(&self, body: &serde_json::Value) -> Result<Vec<f32>> {
        self.fields
            .iter()
            .map(|field| {
                body.get(field)
                    .and_then(|v| v.as_f64())
                    .map(|v| v as f32)
                    .ok_or_else(|| SpevalError::MissingField {
                        field: field.clone(),
                    })
            })
            .collect()
    }
}

// ====== Metric constructors ======

/// P.808 metric reporting a single `MOS` column.
pub fn p808_metric(
    model_rate: u32,
    credentials: &MosCredentials,
    dispatcher: Dispatcher,
) -> Result<PooledMetric> {
    mos_metric(
        vec!["MOS".to_string()],
        MosApiClient::p808(credentials),
        model_rate,
        dispatcher,
    )
}

/// P.835 metric reporting `SIGMOS`, `BAKMOS`, and `OVLMOS` columns.
pub fn p835_metric(
    model_rate: u32,
    credentials: &MosCredentials,
    dispatcher: Dispatcher,
) -> Result<PooledMetric> {
    mos_metric(
        vec![
            "SIGMOS".to_string(),
            "BAKMOS".to_string(),
            "OVLMOS".to_string(),
        ],
        MosApiClient::p835(credentials),
        model_rate,
        dispatcher,
    )
}

/// Wrap an API client in a pooled no-reference metric.
///
/// Signals are resampled to the service rate inside the worker; failures
/// always abort the run.
pub fn mos_metric(
    names: Vec<String>,
    client: MosApiClient,
    model_rate: u32,
    dispatcher: Dispatcher,
) -> Result<PooledMetric> {
    let resampler = Resampler::new(model_rate, MOS_SAMPLE_RATE, ResampleMethod::SincFast)?;
    let client = Arc::new(client);
    let formula: NoRefFn =
        Arc::new(move |signal: &Signal| client.score(&signal.samples).map(MetricValue::Vector));

    Ok(PooledMetric::no_reference(
        names,
        Some(resampler),
        dispatcher,
        formula,
        FailurePolicy::Fail,
    ))
}
