use async_trait::async_trait;

use crate::{EventEnvelope, EventStoreError, PersistenceId, Result, Snapshot, Version};

/// Options for appending events to the store.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected version of the journal key for optimistic concurrency
    /// control. If None, no version check is performed.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the key to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the key to be empty (new entity).
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// Core trait for event journal implementations.
///
/// The journal is append-only and linearizable per key. All implementations
/// must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to the store.
    ///
    /// Events are appended atomically; either all succeed or none do.
    /// If `options.expected_version` is set, the operation fails with
    /// `ConcurrencyConflict` when the current version doesn't match.
    ///
    /// Returns the new version of the key after appending.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// Replays all events for a key in version order (oldest first).
    async fn events_for(&self, persistence_id: &PersistenceId) -> Result<Vec<EventEnvelope>>;

    /// Replays events for a key starting from a specific version.
    ///
    /// Useful when resuming from a snapshot.
    async fn events_for_from_version(
        &self,
        persistence_id: &PersistenceId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Returns the current version of a key, or None if it has no events.
    async fn current_version(&self, persistence_id: &PersistenceId) -> Result<Option<Version>>;

    /// Saves a snapshot of an entity's state, replacing any existing one.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Retrieves the latest snapshot for a key, if any.
    async fn snapshot_for(&self, persistence_id: &PersistenceId) -> Result<Option<Snapshot>>;
}

/// Validates a batch of events before appending.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidBatch(
            "cannot append an empty event list".to_string(),
        ));
    };

    // All events must be for the same key
    for event in events.iter().skip(1) {
        if event.persistence_id != first.persistence_id {
            return Err(EventStoreError::InvalidBatch(
                "all events must share one persistence id".to_string(),
            ));
        }
    }

    // Versions must be sequential
    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidBatch(format!(
                "event versions must be sequential, expected {expected_version}, got {}",
                event.version
            )));
        }
    }

    Ok(())
}
