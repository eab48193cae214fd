//! Persistence ports and their in-memory implementations.

pub mod region;
pub mod subscriber;

pub use region::{AppliedReport, InMemoryRegionStore, RegionStore};
pub use subscriber::{InMemorySubscriberStore, SubscriberStore};

use thiserror::Error;

/// Storage-level failure (not a domain outcome).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    Poisoned,
    #[error("storage error: {0}")]
    Storage(String),
}
