//! Error taxonomy for the fetch core.
//!
//! # Propagation
//! ```text
//! Session attempt error (Network, UpstreamStatus, Parse, FetchTimeout)
//!     → retried locally by resilience::retries
//!     → wrapped in ExhaustedRetries once the loop ends
//!
//! UpstreamUnavailable / PoolExhausted / InvalidRequest / Shutdown
//!     → returned to the caller unchanged
//! ```
//!
//! `FetchError` is `Clone` so a coalesced fetch can hand the same outcome
//! to every waiter.

use std::time::Duration;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Every failure the orchestrator can surface.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Circuit for the upstream is open.
    #[error("upstream {target} is unavailable, retry after {retry_after:?}")]
    UpstreamUnavailable { target: String, retry_after: Duration },

    /// A single attempt exceeded its deadline.
    #[error("attempt timed out after {0:?}")]
    FetchTimeout(Duration),

    /// All attempts failed; carries the last attempt's error.
    #[error("gave up after {attempts} attempt(s): {last}")]
    ExhaustedRetries { attempts: u32, last: Box<FetchError> },

    /// The task queue stayed full for the whole enqueue deadline.
    #[error("task queue full, waited {0:?}")]
    PoolExhausted(Duration),

    /// A proxy list source could not be refreshed.
    #[error("proxy source {source_name} failed: {message}")]
    ProxySource { source_name: String, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("upstream answered with status {status}")]
    UpstreamStatus { status: u16 },

    #[error("could not parse upstream response: {0}")]
    Parse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("orchestrator is shutting down")]
    Shutdown,

    #[error("internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Whether another attempt may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::FetchTimeout(_) | FetchError::Network(_) | FetchError::Parse(_) => true,
            FetchError::UpstreamStatus { status } => {
                matches!(*status, 408 | 425 | 429) || *status >= 500
            }
            _ => false,
        }
    }

    /// Errors the retry loop hands back without wrapping.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FetchError::UpstreamUnavailable { .. }
                | FetchError::PoolExhausted(_)
                | FetchError::InvalidRequest(_)
                | FetchError::Shutdown
                | FetchError::ExhaustedRetries { .. }
        )
    }

    /// Suggested delay before the caller tries again, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::UpstreamUnavailable { retry_after, .. } => Some(*retry_after),
            FetchError::PoolExhausted(waited) => Some(*waited),
            _ => None,
        }
    }

    /// The innermost attempt error (unwraps `ExhaustedRetries`).
    pub fn last_error(&self) -> &FetchError {
        match self {
            FetchError::ExhaustedRetries { last, .. } => last.last_error(),
            other => other,
        }
    }

    /// Short machine-readable label, used in JSON bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::UpstreamUnavailable { .. } => "upstream_unavailable",
            FetchError::FetchTimeout(_) => "fetch_timeout",
            FetchError::ExhaustedRetries { .. } => "exhausted_retries",
            FetchError::PoolExhausted(_) => "pool_exhausted",
            FetchError::ProxySource { .. } => "proxy_source_error",
            FetchError::Network(_) => "network",
            FetchError::UpstreamStatus { .. } => "upstream_status",
            FetchError::Parse(_) => "parse",
            FetchError::InvalidRequest(_) => "invalid_request",
            FetchError::Shutdown => "shutdown",
            FetchError::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return FetchError::UpstreamStatus { status: status.as_u16() };
        }
        if e.is_decode() {
            return FetchError::Parse(e.to_string());
        }
        FetchError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(FetchError::UpstreamStatus { status: 503 }.is_retryable());
        assert!(FetchError::UpstreamStatus { status: 429 }.is_retryable());
        assert!(!FetchError::UpstreamStatus { status: 404 }.is_retryable());
        assert!(FetchError::FetchTimeout(Duration::from_secs(1)).is_retryable());
        assert!(!FetchError::PoolExhausted(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn test_last_error_unwraps_nested() {
        let err = FetchError::ExhaustedRetries {
            attempts: 3,
            last: Box::new(FetchError::UpstreamStatus { status: 502 }),
        };
        assert_eq!(err.last_error(), &FetchError::UpstreamStatus { status: 502 });
        assert_eq!(err.kind(), "exhausted_retries");
        assert!(err.retry_after().is_none());
    }
}
