use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    EventEnvelope, EventStoreError, PersistenceId, Result, Snapshot, Version,
    store::{AppendOptions, EventStore, validate_events_for_append},
};

/// In-memory journal implementation.
///
/// Backs every test and the single-process wiring; a durable backend
/// implements the same [`EventStore`] contract.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<EventEnvelope>>>,
    snapshots: Arc<RwLock<HashMap<PersistenceId, Snapshot>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored across all keys.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Clears all events and snapshots.
    pub async fn clear(&self) {
        self.events.write().await.clear();
        self.snapshots.write().await.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        validate_events_for_append(&events)?;

        let persistence_id = events[0].persistence_id.clone();
        let mut store = self.events.write().await;

        let current_version = store
            .iter()
            .filter(|e| e.persistence_id == persistence_id)
            .map(|e| e.version)
            .max()
            .unwrap_or(Version::initial());

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                persistence_id,
                expected,
                actual: current_version,
            });
        }

        // Unique (key, version) constraint simulation
        let first_new_version = events[0].version;
        if first_new_version <= current_version {
            return Err(EventStoreError::ConcurrencyConflict {
                persistence_id,
                expected: options.expected_version.unwrap_or(current_version),
                actual: current_version,
            });
        }

        let last_version = events
            .last()
            .map(|e| e.version)
            .unwrap_or(Version::initial());
        store.extend(events);

        Ok(last_version)
    }

    async fn events_for(&self, persistence_id: &PersistenceId) -> Result<Vec<EventEnvelope>> {
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| &e.persistence_id == persistence_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn events_for_from_version(
        &self,
        persistence_id: &PersistenceId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| &e.persistence_id == persistence_id && e.version >= from_version)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn current_version(&self, persistence_id: &PersistenceId) -> Result<Option<Version>> {
        let store = self.events.read().await;
        let version = store
            .iter()
            .filter(|e| &e.persistence_id == persistence_id)
            .map(|e| e.version)
            .max();
        Ok(version)
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.persistence_id.clone(), snapshot);
        Ok(())
    }

    async fn snapshot_for(&self, persistence_id: &PersistenceId) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(persistence_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_event(
        persistence_id: &PersistenceId,
        version: Version,
        event_type: &str,
    ) -> EventEnvelope {
        EventEnvelope::builder()
            .persistence_id(persistence_id.clone())
            .event_type(event_type)
            .version(version)
            .payload_raw(serde_json::json!({"test": true}))
            .build()
    }

    #[tokio::test]
    async fn append_single_event() {
        let store = InMemoryEventStore::new();
        let key = PersistenceId::of("BankAccount", "A1");
        let event = create_test_event(&key, Version::first(), "TestEvent");

        let result = store.append(vec![event], AppendOptions::expect_new()).await;
        assert_eq!(result.unwrap(), Version::first());

        let events = store.events_for(&key).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn append_multiple_events() {
        let store = InMemoryEventStore::new();
        let key = PersistenceId::of("BankAccount", "A1");

        let events = vec![
            create_test_event(&key, Version::new(1), "Event1"),
            create_test_event(&key, Version::new(2), "Event2"),
            create_test_event(&key, Version::new(3), "Event3"),
        ];

        let result = store.append(events, AppendOptions::expect_new()).await;
        assert_eq!(result.unwrap(), Version::new(3));

        let stored = store.events_for(&key).await.unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn concurrency_conflict_on_wrong_version() {
        let store = InMemoryEventStore::new();
        let key = PersistenceId::of("BankAccount", "A1");

        let event1 = create_test_event(&key, Version::first(), "Event1");
        store
            .append(vec![event1], AppendOptions::expect_new())
            .await
            .unwrap();

        let event2 = create_test_event(&key, Version::new(2), "Event2");
        let result = store
            .append(
                vec![event2],
                AppendOptions::expect_version(Version::initial()),
            )
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn append_with_correct_expected_version() {
        let store = InMemoryEventStore::new();
        let key = PersistenceId::of("BankAccount", "A1");

        let event1 = create_test_event(&key, Version::first(), "Event1");
        store
            .append(vec![event1], AppendOptions::expect_new())
            .await
            .unwrap();

        let event2 = create_test_event(&key, Version::new(2), "Event2");
        let result = store
            .append(
                vec![event2],
                AppendOptions::expect_version(Version::first()),
            )
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let store = InMemoryEventStore::new();
        let a1 = PersistenceId::of("BankAccount", "A1");
        let a2 = PersistenceId::of("BankAccount", "A2");

        store
            .append(
                vec![create_test_event(&a1, Version::first(), "Event1")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();
        store
            .append(
                vec![create_test_event(&a2, Version::first(), "Event2")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        assert_eq!(store.events_for(&a1).await.unwrap().len(), 1);
        assert_eq!(store.events_for(&a2).await.unwrap().len(), 1);
        assert_eq!(
            store.current_version(&a1).await.unwrap(),
            Some(Version::first())
        );
    }

    #[tokio::test]
    async fn events_from_version() {
        let store = InMemoryEventStore::new();
        let key = PersistenceId::of("Saga", "t1");

        let events = vec![
            create_test_event(&key, Version::new(1), "Event1"),
            create_test_event(&key, Version::new(2), "Event2"),
            create_test_event(&key, Version::new(3), "Event3"),
        ];
        store.append(events, AppendOptions::new()).await.unwrap();

        let from_v2 = store
            .events_for_from_version(&key, Version::new(2))
            .await
            .unwrap();
        assert_eq!(from_v2.len(), 2);
        assert_eq!(from_v2[0].version, Version::new(2));
        assert_eq!(from_v2[1].version, Version::new(3));
    }

    #[tokio::test]
    async fn current_version_of_missing_key() {
        let store = InMemoryEventStore::new();
        let key = PersistenceId::of("BankAccount", "missing");
        assert_eq!(store.current_version(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn snapshot_save_and_retrieve() {
        let store = InMemoryEventStore::new();
        let key = PersistenceId::of("BankAccount", "A1");

        let snapshot = Snapshot::new(
            key.clone(),
            Version::new(5),
            serde_json::json!({"state": "saved"}),
        );
        store.save_snapshot(snapshot).await.unwrap();

        let retrieved = store.snapshot_for(&key).await.unwrap().unwrap();
        assert_eq!(retrieved.persistence_id, key);
        assert_eq!(retrieved.version, Version::new(5));
    }

    #[tokio::test]
    async fn snapshot_not_found() {
        let store = InMemoryEventStore::new();
        let key = PersistenceId::of("BankAccount", "A1");
        assert!(store.snapshot_for(&key).await.unwrap().is_none());
    }
}
