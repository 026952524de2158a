//! Storage Layer
//!
//! Defines the storage collaborator the pipeline writes through, an
//! in-memory implementation, and the staging buffer that batches raw
//! samples into it.

mod buffer;
mod records;
mod repository;

pub use buffer::{BufferManager, FlushConfig};
pub use records::{ClassificationLabel, TripSummary};
pub use repository::{InMemoryRepository, Storage};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Lock error: {0}")]
    Lock(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}
