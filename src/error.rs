//! Error types for the cache and request layers
//!
//! Provides unified error handling using thiserror.

use serde_json::Value;
use thiserror::Error;

// == Cache Error Enum ==
/// Errors raised inside the cache tiers.
///
/// These never reach callers of [`CacheManager`](crate::cache::CacheManager):
/// every variant is logged and turned into a cache miss.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Durable entry could not be deserialized
    #[error("Corrupted cache entry '{key}': {reason}")]
    Corruption { key: String, reason: String },

    /// Durable store I/O failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Value could not be serialized for the durable tier
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

// == Request Error Enum ==
/// Errors surfaced by [`ApiClient`](crate::client::ApiClient).
#[derive(Error, Debug)]
pub enum RequestError {
    /// No response was obtained (connect, DNS, per-attempt timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A response arrived with a non-2xx status
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        status: u16,
        message: String,
        body: Value,
    },

    /// Every attempt failed; wraps the last failure
    #[error("Request failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<RequestError>,
    },

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RequestError {
    /// Transport failures and non-2xx responses may be retried.
    ///
    /// No distinction is made between 4xx and 5xx.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RequestError::Transport(_) | RequestError::HttpStatus { .. }
        )
    }

    /// HTTP status of the underlying failure, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::HttpStatus { status, .. } => Some(*status),
            RequestError::RetryExhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Short machine-readable name used in error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::Transport(_) => "transport_error",
            RequestError::HttpStatus { .. } => "http_status_error",
            RequestError::RetryExhausted { .. } => "retry_exhausted",
            RequestError::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            RequestError::InvalidRequest(err.to_string())
        } else {
            RequestError::Transport(err.to_string())
        }
    }
}

// == Result Type Aliases ==
/// Convenience Result type for cache tier operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Convenience Result type for the request client.
pub type Result<T> = std::result::Result<T, RequestError>;

/// Renders an error and its source chain as `outer: inner: root`.
pub fn describe_error(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RequestError::Transport("refused".into()).is_retryable());
        assert!(RequestError::HttpStatus {
            status: 404,
            message: "Not Found".into(),
            body: Value::Null,
        }
        .is_retryable());
        assert!(!RequestError::InvalidRequest("bad".into()).is_retryable());
    }

    #[test]
    fn test_status_unwraps_retry_exhausted() {
        let err = RequestError::RetryExhausted {
            attempts: 3,
            source: Box::new(RequestError::HttpStatus {
                status: 503,
                message: "Service Unavailable".into(),
                body: Value::Null,
            }),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.kind(), "retry_exhausted");
    }

    #[test]
    fn test_describe_error_includes_source_chain() {
        let err = RequestError::RetryExhausted {
            attempts: 2,
            source: Box::new(RequestError::Transport("connection refused".into())),
        };
        let text = describe_error(&err);
        assert!(text.starts_with("Request failed after 2 attempts"));
        assert!(text.ends_with("Transport error: connection refused"));
    }
}
