//! Failures produced by domain logic itself, as opposed to the stores and
//! the job broker, which carry their own error types.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic domain failure. Synchronous callers get these directly;
/// job handlers translate them into retry-or-discard decisions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input failed validation (empty item list, malformed email, blank
    /// display name).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// No live record for the given email, token, or region.
    #[error("not found")]
    NotFound,

    /// The operation collides with existing state (duplicate subscription,
    /// resubscribe inside the cooldown window).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
