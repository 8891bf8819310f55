//! The entity contract and its journal handle.

use std::sync::Arc;

use async_trait::async_trait;
use event_store::{
    AppendOptions, DomainEvent, EventEnvelope, EventStore, PersistenceId, Version,
};

use crate::error::RuntimeError;

/// A persistent, addressable entity.
///
/// Implementations are driven by a [`Router`](crate::Router): on activation
/// the journal is replayed through [`recover`](Entity::recover), then
/// commands are handled strictly one at a time. Persisting through the
/// [`Journal`] is the only suspension point; an event must be durable before
/// any of its effects (replies, sends) are visible to other entities.
#[async_trait]
pub trait Entity: Send + Sized + 'static {
    /// The mailbox message type of this entity.
    type Command: Send + 'static;

    /// Returns the entity type name, used as the journal key prefix.
    fn entity_type() -> &'static str;

    /// Folds one recovered event into state during activation.
    fn recover(&mut self, envelope: &EventEnvelope) -> Result<(), RuntimeError>;

    /// Called once after activation replay completes.
    ///
    /// Entities that owe messages to others (e.g. a coordinator with
    /// outstanding commands) resume sending here.
    fn on_recovered(&mut self) {}

    /// Handles a single command.
    ///
    /// Returning an error stops this entity instance; the next send
    /// re-activates it from the journal.
    async fn handle(
        &mut self,
        command: Self::Command,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError>;
}

/// Append handle for one entity's journal key.
///
/// Tracks the current version so every append carries an optimistic
/// version expectation. With a single writer per key this only trips when
/// two instances of the same entity briefly overlap after a crash.
pub struct Journal {
    store: Arc<dyn EventStore>,
    persistence_id: PersistenceId,
    version: Version,
}

impl Journal {
    /// Creates a handle positioned at the start of the key.
    pub fn new(store: Arc<dyn EventStore>, persistence_id: PersistenceId) -> Self {
        Self {
            store,
            persistence_id,
            version: Version::initial(),
        }
    }

    /// Returns the journal key.
    pub fn persistence_id(&self) -> &PersistenceId {
        &self.persistence_id
    }

    /// Returns the version of the last persisted event.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Loads all events for the key and positions the handle after the
    /// last one.
    pub async fn replay(&mut self) -> Result<Vec<EventEnvelope>, RuntimeError> {
        let events = self.store.events_for(&self.persistence_id).await?;
        if let Some(last) = events.last() {
            self.version = last.version;
        }
        Ok(events)
    }

    /// Durably appends one event and advances the version.
    pub async fn persist<E: DomainEvent>(&mut self, event: &E) -> Result<Version, RuntimeError> {
        let next = self.version.next();
        let envelope = EventEnvelope::builder()
            .event_type(event.event_type())
            .persistence_id(self.persistence_id.clone())
            .version(next)
            .payload(event)?
            .build();

        self.store
            .append(vec![envelope], AppendOptions::expect_version(self.version))
            .await?;
        self.version = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_store::InMemoryEventStore;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Pinged {
        count: u32,
    }

    impl DomainEvent for Pinged {
        fn event_type(&self) -> &'static str {
            "Pinged"
        }
    }

    #[tokio::test]
    async fn persist_advances_version() {
        let store = Arc::new(InMemoryEventStore::new());
        let key = PersistenceId::of("Test", "t1");
        let mut journal = Journal::new(store.clone(), key.clone());

        assert_eq!(journal.version(), Version::initial());
        journal.persist(&Pinged { count: 1 }).await.unwrap();
        journal.persist(&Pinged { count: 2 }).await.unwrap();
        assert_eq!(journal.version(), Version::new(2));

        let events = store.events_for(&key).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "Pinged");
    }

    #[tokio::test]
    async fn replay_positions_after_last_event() {
        let store = Arc::new(InMemoryEventStore::new());
        let key = PersistenceId::of("Test", "t1");

        let mut writer = Journal::new(store.clone(), key.clone());
        writer.persist(&Pinged { count: 1 }).await.unwrap();
        writer.persist(&Pinged { count: 2 }).await.unwrap();

        let mut reader = Journal::new(store, key);
        let events = reader.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(reader.version(), Version::new(2));

        // Appending after replay continues the sequence
        reader.persist(&Pinged { count: 3 }).await.unwrap();
        assert_eq!(reader.version(), Version::new(3));
    }

    #[tokio::test]
    async fn overlapping_writers_conflict() {
        let store = Arc::new(InMemoryEventStore::new());
        let key = PersistenceId::of("Test", "t1");

        let mut a = Journal::new(store.clone(), key.clone());
        let mut b = Journal::new(store, key);

        a.persist(&Pinged { count: 1 }).await.unwrap();
        let result = b.persist(&Pinged { count: 1 }).await;
        assert!(matches!(result, Err(RuntimeError::Journal(_))));
    }
}
