//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM is not configured: {0}")]
    NotConfigured(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Check if this is a rate limit error
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// Check if this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::Network(_) => true,
            LlmError::ApiError { status, .. } => *status >= 500 || *status == 408,
            LlmError::NotConfigured(_) | LlmError::InvalidResponse(_) | LlmError::Json(_) => false,
        }
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let limited = LlmError::RateLimited {
            retry_after: Duration::from_secs(30),
        };
        assert!(limited.is_rate_limit());
        assert!(limited.is_retryable());
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(30)));

        let server = LlmError::ApiError {
            status: 503,
            message: "overloaded".to_string(),
        };
        assert!(server.is_retryable());
        assert!(!server.is_rate_limit());
        assert_eq!(server.retry_after(), None);

        let client = LlmError::ApiError {
            status: 401,
            message: "bad key".to_string(),
        };
        assert!(!client.is_retryable());
        assert!(!LlmError::NotConfigured("no key".to_string()).is_retryable());
    }
}
