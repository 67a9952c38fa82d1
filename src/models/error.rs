//! Error types for codegenie.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (invalid input, not found, rate limited)
//! - I^B materialized: Infrastructure failures (network, timeout, upstream status)
//! - K_i violated: Internal invariant violations (bugs)

use thiserror::Error;

/// Top-level error type for codegenie.
#[derive(Debug, Error)]
pub enum CodegenieError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED - Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded for '{action}'. Please wait.")]
    RateLimited { action: String, retry_after_secs: f64 },

    #[error("Security: {0}")]
    Security(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED - Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{source_name} returned status {status}")]
    UpstreamStatus { source_name: String, status: u16 },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED - Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CodegenieError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::RateLimited { .. } => true,
            Self::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Get retry delay hint in seconds, if applicable.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Result type alias for codegenie.
pub type Result<T> = std::result::Result<T, CodegenieError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_retryable_classification() {
        assert!(CodegenieError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(CodegenieError::UpstreamStatus {
            source_name: "wikipedia".to_string(),
            status: 503,
        }
        .is_retryable());
        assert!(!CodegenieError::UpstreamStatus {
            source_name: "wikipedia".to_string(),
            status: 404,
        }
        .is_retryable());
        assert!(!CodegenieError::InvalidInput("empty".to_string()).is_retryable());
    }

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        let err = CodegenieError::RateLimited {
            action: "goal_execution".to_string(),
            retry_after_secs: 12.5,
        };
        assert_eq!(err.retry_after(), Some(12.5));
        assert_eq!(CodegenieError::Internal("x".to_string()).retry_after(), None);
    }
}
