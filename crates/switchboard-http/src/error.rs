//! Error types for Switchboard transport operations.

use thiserror::Error;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while talking to the messaging backend.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unauthorized ({0})")]
    Unauthorized(u16),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Connection closed")]
    Closed,

    #[error("Operation timed out")]
    Timeout,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return TransportError::Timeout;
        }
        if let Some(status) = err.status() {
            if crate::client::is_access_denied_status(status.as_u16()) {
                return TransportError::Unauthorized(status.as_u16());
            }
        }
        TransportError::Http(err.to_string())
    }
}

impl From<url::ParseError> for TransportError {
    fn from(err: url::ParseError) -> Self {
        TransportError::Config(err.to_string())
    }
}

impl TransportError {
    /// Check if this error is worth retrying on the next tick or reconnect.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Http(_)
            | TransportError::WebSocket(_)
            | TransportError::Closed
            | TransportError::Timeout => true,
            TransportError::Status { status, .. } => crate::client::is_retryable_status(*status),
            _ => false,
        }
    }

    /// Check if this is an access denied error.
    #[inline]
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        matches!(self, TransportError::Unauthorized(_))
    }

    /// Check if the payload itself was unusable.
    #[inline]
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, TransportError::Json(_) | TransportError::Malformed(_))
    }
}
