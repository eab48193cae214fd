//! Pipeline error type: domain, store, and queue failures in one place.

use thiserror::Error;

use restock_core::DomainError;
use restock_queue::JobStoreError;

use crate::stores::StoreError;

/// Error surfaced by synchronous pipeline calls (ingestion, lifecycle,
/// admin). Asynchronous job failures never reach callers; they surface
/// through the queue's failure accounting instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Validation / not-found / conflict, rejected synchronously.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Region or subscriber store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Job broker failure while enqueueing.
    #[error("queue error: {0}")]
    Queue(#[from] JobStoreError),

    /// A job payload failed to serialize.
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::Domain(DomainError::NotFound))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, PipelineError::Domain(DomainError::Conflict(_)))
    }
}
