//! Error taxonomy for the retrieval core.
//!
//! Three families, matching how callers are expected to react:
//!
//! | Family | Retried | Typical cause |
//! |--------|---------|---------------|
//! | [`ValidationError`] | never | empty/oversized text, bad weights or scores, dimension mismatch |
//! | [`ProviderError::Transient`] | yes, per [`RetryPolicy`](crate::retry::RetryPolicy) | network, HTTP 429, HTTP 5xx |
//! | [`Error::Persistence`] | never | store failures (the store owns its own resilience) |
//!
//! Application code (CLI, config loading, store backends) keeps using
//! `anyhow`; these types exist where a caller needs to branch on the kind.

use crate::retry::Retryable;

/// Input or configuration that can never succeed, no matter how often it is retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("text is empty")]
    EmptyText,

    #[error("text is {len} characters, limit is {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("cannot normalize a zero-magnitude vector")]
    ZeroVector,

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("invalid score: {0}")]
    InvalidScore(String),

    #[error("invalid segmenter config: {0}")]
    InvalidConfig(String),

    #[error("unknown content type: '{0}'")]
    UnknownContentType(String),
}

/// Failure reported by (or while talking to) the embedding provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Network error, timeout, rate limit or server error. Worth retrying.
    #[error("transient provider error{}: {message}", status_suffix(.status))]
    Transient {
        status: Option<u16>,
        message: String,
    },

    /// The provider refused the request (4xx other than 429).
    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("embedding provider is disabled")]
    Disabled,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }
}

/// Top-level error returned by the embedding generator, ingest and backfill layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("persistence error: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

impl Error {
    /// Wrap a store failure. Store backends return `anyhow::Error`.
    pub fn persistence(err: anyhow::Error) -> Self {
        Error::Persistence(err)
    }
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Provider(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_provider_errors_retry() {
        let transient = Error::Provider(ProviderError::Transient {
            status: Some(429),
            message: "slow down".into(),
        });
        assert!(transient.is_retryable());

        let rejected = Error::Provider(ProviderError::Rejected {
            status: 401,
            message: "bad key".into(),
        });
        assert!(!rejected.is_retryable());
        assert!(!Error::Validation(ValidationError::EmptyText).is_retryable());
        assert!(!Error::persistence(anyhow::anyhow!("disk full")).is_retryable());
    }

    #[test]
    fn test_transient_display_includes_status() {
        let e = ProviderError::Transient {
            status: Some(503),
            message: "unavailable".into(),
        };
        assert_eq!(e.to_string(), "transient provider error (503): unavailable");

        let e = ProviderError::Transient {
            status: None,
            message: "connection reset".into(),
        };
        assert_eq!(e.to_string(), "transient provider error: connection reset");
    }
}
