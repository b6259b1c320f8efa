//! Error taxonomy for the synchronization core.

use switchboard_http::TransportError;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by the sync components.
///
/// Transport failures are folded into this taxonomy at the component that
/// produced them; the reconciliation engine itself never fails on input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("Credential expired or rejected")]
    AuthExpired,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Send failed: {reason}")]
    SendFailed { content: String, reason: String },

    #[error("An identical message is already pending")]
    DuplicateSubmission,

    #[error("No failed send with key {0}")]
    NotResubmittable(Uuid),

    #[error("No conversation is open")]
    NoConversation,

    #[error("Reconciliation engine has stopped")]
    EngineClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        if err.is_access_denied() {
            SyncError::AuthExpired
        } else if err.is_malformed() {
            SyncError::MalformedPayload(err.to_string())
        } else {
            SyncError::TransientNetwork(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl SyncError {
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::TransientNetwork(_))
    }

    #[inline]
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        matches!(self, SyncError::AuthExpired)
    }
}
