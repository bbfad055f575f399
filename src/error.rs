//! Error taxonomy of the synchronization layer.
//!
//! | Kind | Raised when | Handling |
//! |------|-------------|----------|
//! | `Validation` | input rejected before any network call | surfaced, never retried |
//! | `Network` | transport failure, timeout, abort | mutations roll back, polls retry |
//! | `NotFound` | the server confirms a resource is gone | expected, logged at debug |
//! | `CacheInconsistency` | `304` with no cached body | one forced retry, logged as error |
//! | `ServerRejected` | well-formed error response | surfaced, never retried |
//!
//! Malformed success payloads are `InvalidResponse`; callers treat them like
//! a failed mutation.

use context_sync_core::models::Method;

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("network error: {message}")]
    Network { message: String, timed_out: bool },

    #[error("request aborted")]
    Aborted,

    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("cache inconsistency: {method} {url} returned 304 but nothing is cached; retry without validator")]
    CacheInconsistency { method: Method, url: String },

    #[error("server rejected request ({status}): {message}")]
    ServerRejected { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Coarse classification used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Network,
    NotFound,
    CacheInconsistency,
    ServerRejected,
    Storage,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Validation(_) => ErrorKind::Validation,
            SyncError::Network { .. } | SyncError::Aborted => ErrorKind::Network,
            SyncError::NotFound { .. } => ErrorKind::NotFound,
            SyncError::CacheInconsistency { .. } => ErrorKind::CacheInconsistency,
            SyncError::ServerRejected { .. } | SyncError::InvalidResponse(_) => {
                ErrorKind::ServerRejected
            }
            SyncError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. })
    }

    pub fn timeout(url: &str) -> Self {
        SyncError::Network {
            message: format!("request to {} timed out", url),
            timed_out: true,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        SyncError::Network {
            message: message.into(),
            timed_out: false,
        }
    }
}

impl SyncError {
    pub fn storage(err: anyhow::Error) -> Self {
        SyncError::Storage(format!("{:#}", err))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidResponse(err.to_string())
    }
}
