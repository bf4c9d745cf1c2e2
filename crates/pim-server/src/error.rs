//! Error types for the server core (§7). `HandlerError` is what handlers
//! (C7) and the undo-adjacent store operations throw; it always carries a
//! stable [`ErrorCategory`] alongside a human-readable message, so the
//! session boundary (§4.6) can convert it to a tagged failure response
//! without losing the category a client might branch on.

use pim_model::ErrorCategory;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{category}: {message}")]
pub struct HandlerError {
    pub category: ErrorCategory,
    pub message: String,
}

impl HandlerError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NotFound, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Rejected, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Malformed, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::PermissionDenied, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Conflict, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Transient, message)
    }
}

impl From<crate::store::StoreError> for HandlerError {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::NotFound(msg) => HandlerError::not_found(msg),
            crate::store::StoreError::Conflict(msg) => HandlerError::conflict(msg),
            crate::store::StoreError::Backend(msg) => HandlerError::transient(msg),
        }
    }
}

/// Converts a handler outcome into a wire [`pim_protocol::Response`] (§4.6
/// error discipline): a command whose handler throws is replied to with a
/// tagged failure carrying the message; the session remains usable.
pub fn to_failure_response(err: &HandlerError) -> pim_protocol::Response {
    pim_protocol::Response::Failure {
        message: err.message.clone(),
        category: err.category,
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable PIM_BROKER_CONFDIR is not set")]
    MissingConfDirEnv,
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ini::Error,
    },
}
