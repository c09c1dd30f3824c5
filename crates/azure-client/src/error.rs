//! Azure client errors

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when interacting with Azure Resource Manager
#[derive(Debug, Error)]
pub enum AzureError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// ARM returned an error that is not retryable
    #[error("Azure API error ({status}): {code}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// ARM error code
        code: String,
        /// ARM error message
        message: String,
    },

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// `If-Match` precondition did not hold (412)
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Throttled (429) or server-side failure (5xx)
    #[error("Azure API unavailable ({status}): {message}")]
    Retryable {
        /// HTTP status code
        status: u16,
        /// `Retry-After` hint, when the service sent one
        retry_after: Option<Duration>,
        /// Response body or reason
        message: String,
    },

    /// A long-running operation reached a terminal failure state
    #[error("Operation failed: {code}: {message}")]
    OperationFailed {
        /// ARM error code (or final provisioning state)
        code: String,
        /// ARM error message
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (401/403)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Invalid request (e.g. malformed resume token or missing header)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// ARM error envelope: `{"error": {"code": "...", "message": "..."}}`
#[derive(Debug, serde::Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl AzureError {
    /// Map a non-success ARM response to an error.
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: &str, what: &str) -> Self {
        let (code, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => (envelope.error.code, envelope.error.message),
            Err(_) => (String::new(), body.to_string()),
        };
        match status {
            404 => AzureError::NotFound(format!("{}: {}", what, message)),
            412 => AzureError::PreconditionFailed(format!("{}: {}", what, message)),
            401 | 403 => AzureError::Authentication(format!("{}: {} {}", what, code, message)),
            429 | 500..=599 => AzureError::Retryable {
                status,
                retry_after,
                message: format!("{}: {} {}", what, code, message),
            },
            _ => AzureError::Api {
                status,
                code,
                message: format!("{}: {}", what, message),
            },
        }
    }

    /// Whether the error means the resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, AzureError::NotFound(_))
    }

    /// Whether an `If-Match` precondition failed
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, AzureError::PreconditionFailed(_))
    }

    /// Whether retrying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AzureError::Retryable { .. } => true,
            AzureError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Server-provided retry hint
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AzureError::Retryable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
