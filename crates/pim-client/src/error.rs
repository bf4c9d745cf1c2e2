//! Error types for the client-side undo engine and invitation policy (§7,
//! §10.7). `BackendError` is what a [`crate::backend::ChangeBackend`]
//! implementation returns; it always carries the same stable
//! [`ErrorCategory`] the server core uses, so `AlreadyDeleted` races can be
//! told apart from an ordinary `Transient` failure (§10.7).

use pim_model::ErrorCategory;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{category}: {message}")]
pub struct BackendError {
    pub category: ErrorCategory,
    pub message: String,
}

impl BackendError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self { category, message: message.into() }
    }

    pub fn already_deleted(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::AlreadyDeleted, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Transient, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Conflict, message)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailerError {
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
}
