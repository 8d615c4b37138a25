//! Error types for LLM provider transport.

use reqwest::StatusCode;
use thiserror::Error;

use crate::domain::errors::OrchestratorError;

/// Errors from the provider HTTP surface.
#[derive(Error, Debug, Clone)]
pub enum LlmApiError {
    /// Malformed request body or parameters (400)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication failed (401)
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Transient server-side error (500, 502, 503, 504, 529)
    #[error("Server error ({0}): {1}")]
    ServerError(StatusCode, String),

    /// Connection failed, timeout, DNS, etc.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Unexpected status code
    #[error("Unknown error ({0}): {1}")]
    UnknownError(StatusCode, String),
}

impl LlmApiError {
    /// Create an error from HTTP status code, response body, and the
    /// `Retry-After` header when present.
    pub fn from_status(status: StatusCode, body: String, retry_after_secs: Option<u64>) -> Self {
        match status.as_u16() {
            400 => Self::InvalidRequest(body),
            401 | 403 => Self::InvalidApiKey,
            429 => Self::RateLimited { retry_after_secs: retry_after_secs.unwrap_or(2) },
            500 | 502 | 503 | 504 | 529 => Self::ServerError(status, body),
            _ => Self::UnknownError(status, body),
        }
    }

    /// Check if the error is transient and should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError(_, _) | Self::NetworkError(_)
        )
    }
}

impl From<LlmApiError> for OrchestratorError {
    fn from(err: LlmApiError) -> Self {
        match err {
            LlmApiError::RateLimited { retry_after_secs } => {
                OrchestratorError::RateLimited { retry_after_secs }
            }
            other => OrchestratorError::LlmUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_400_is_permanent() {
        let error = LlmApiError::from_status(StatusCode::BAD_REQUEST, "bad".to_string(), None);
        assert!(matches!(error, LlmApiError::InvalidRequest(_)));
        assert!(!error.is_transient());
    }

    #[test]
    fn test_from_status_429_carries_retry_after() {
        let error = LlmApiError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new(), Some(7));
        assert!(matches!(error, LlmApiError::RateLimited { retry_after_secs: 7 }));
        assert!(error.is_transient());
    }

    #[test]
    fn test_from_status_429_defaults_retry_after() {
        let error = LlmApiError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new(), None);
        assert!(matches!(error, LlmApiError::RateLimited { retry_after_secs: 2 }));
    }

    #[test]
    fn test_server_errors_transient() {
        for code in [500u16, 502, 503, 504, 529] {
            let status = StatusCode::from_u16(code).unwrap();
            let error = LlmApiError::from_status(status, String::new(), None);
            assert!(error.is_transient(), "status {code} should be transient");
        }
    }

    #[test]
    fn test_rate_limited_maps_to_domain_error() {
        let err: OrchestratorError = LlmApiError::RateLimited { retry_after_secs: 3 }.into();
        assert!(matches!(err, OrchestratorError::RateLimited { retry_after_secs: 3 }));
    }
}
