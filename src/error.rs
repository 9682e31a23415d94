//! Error handling for Speval
//!
//! One crate-wide error enum. Metric formula failures are recoverable in
//! pooled contexts (logged, record dropped); configuration and remote
//! retry-exhaustion errors are fatal.

use thiserror::Error;

/// Result type alias for Speval operations
pub type Result<T> = std::result::Result<T, SpevalError>;

/// Main error type for Speval operations
#[derive(Error, Debug)]
pub enum SpevalError {
    // File Errors
    #[error("File not found: {path}")]
    FileNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Audio contains no samples")]
    EmptyAudio,

    #[error("Invalid sample rate: {rate} Hz")]
    InvalidRate { rate: u32 },

    #[error("Invalid transform frame size: {size} (must be even and nonzero)")]
    InvalidFrameSize { size: usize },

    // Metric Errors
    #[error("Unknown metric: {name}")]
    UnknownMetric { name: String },

    #[error("Metric '{name}' has no bound formula")]
    UnboundFormula { name: String },

    #[error("Metric '{metric}' returned {got} values for {expected} names")]
    ScoreShape {
        metric: String,
        expected: usize,
        got: usize,
    },

    #[error("Metric '{metric}' requires a clean reference signal")]
    MissingReference { metric: String },

    #[error("Metric '{metric}' formula failed: {reason}")]
    FormulaFailed { metric: String, reason: String },

    // Pool Errors
    #[error("Worker pool is shut down")]
    PoolClosed,

    #[error("Worker dropped its result before completion")]
    WorkerLost,

    // Remote Errors
    #[error("Missing credential: environment variable {var} is not set")]
    MissingCredential { var: String },

    #[error("Remote scoring request failed: {reason}")]
    RemoteApi {
        reason: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Remote call failed after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: String },

    #[error("Remote response is missing field '{field}'")]
    MissingField { field: String },

    // Evaluation Errors
    #[error("Corpus mismatch: {clean} clean files vs {noisy} noisy files")]
    CorpusMismatch { clean: usize, noisy: usize },

    #[error("No audio files found under {dir}")]
    EmptyCorpus { dir: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SpevalError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            SpevalError::FileNotFound { .. } => "FILE_NOT_FOUND",
            SpevalError::InvalidAudio { .. } => "INVALID_AUDIO",
            SpevalError::EmptyAudio => "EMPTY_AUDIO",
            SpevalError::InvalidRate { .. } => "INVALID_RATE",
            SpevalError::InvalidFrameSize { .. } => "INVALID_FRAME_SIZE",
            SpevalError::UnknownMetric { .. } => "UNKNOWN_METRIC",
            SpevalError::UnboundFormula { .. } => "UNBOUND_FORMULA",
            SpevalError::ScoreShape { .. } => "SCORE_SHAPE",
            SpevalError::MissingReference { .. } => "MISSING_REFERENCE",
            SpevalError::FormulaFailed { .. } => "FORMULA_FAILED",
            SpevalError::PoolClosed => "POOL_CLOSED",
            SpevalError::WorkerLost => "WORKER_LOST",
            SpevalError::MissingCredential { .. } => "MISSING_CREDENTIAL",
            SpevalError::RemoteApi { .. } => "REMOTE_API",
            SpevalError::RetryExhausted { .. } => "RETRY_EXHAUSTED",
            SpevalError::MissingField { .. } => "MISSING_FIELD",
            SpevalError::CorpusMismatch { .. } => "CORPUS_MISMATCH",
            SpevalError::EmptyCorpus { .. } => "EMPTY_CORPUS",
            SpevalError::Io(_) => "IO_ERROR",
            SpevalError::Wav(_) => "WAV_ERROR",
            SpevalError::Csv(_) => "CSV_ERROR",
            SpevalError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable inside a pooled metric computation.
    ///
    /// Recoverable errors are logged and the affected result record dropped;
    /// everything else aborts the evaluation run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SpevalError::FormulaFailed { .. }
                | SpevalError::InvalidAudio { .. }
                | SpevalError::EmptyAudio
                | SpevalError::RemoteApi { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = SpevalError::FileNotFound {
            path: "test.wav".to_string(),
            source: None,
        };
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    }

    #[test]
    fn test_formula_failures_are_recoverable() {
        let err = SpevalError::FormulaFailed {
            metric: "STOI".to_string(),
            reason: "length mismatch".to_string(),
        };
        assert!(err.is_recoverable());
        assert!(!SpevalError::PoolClosed.is_recoverable());
    }

    #[test]
    fn test_retry_exhausted_message_carries_last_error() {
        let err = SpevalError::RetryExhausted {
            attempts: 20,
            last: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("20 attempts"));
        assert!(msg.contains("connection refused"));
    }
}
