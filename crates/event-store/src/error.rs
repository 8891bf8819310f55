use thiserror::Error;

use crate::{PersistenceId, Version};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The expected version did not match the actual version on append.
    #[error(
        "Concurrency conflict for {persistence_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        persistence_id: PersistenceId,
        expected: Version,
        actual: Version,
    },

    /// The batch of events was malformed (empty, mixed keys, version gaps).
    #[error("Invalid append batch: {0}")]
    InvalidBatch(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
