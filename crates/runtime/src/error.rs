use event_store::EventStoreError;
use thiserror::Error;

/// Errors raised inside the entity runtime.
///
/// Any of these is fatal to the running entity instance: it stops and is
/// re-activated from the journal on the next send, so no partial state is
/// ever observable after a failed append.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The journal refused or failed an append/replay.
    #[error("journal error: {0}")]
    Journal(#[from] EventStoreError),

    /// A recovered event payload could not be decoded.
    #[error("event decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
