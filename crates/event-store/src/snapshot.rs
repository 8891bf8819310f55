use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PersistenceId, Version};

/// A snapshot of an entity's state at a specific version.
///
/// Snapshots shorten recovery by providing a starting point, avoiding a
/// full replay from the beginning of the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The journal key this snapshot belongs to.
    pub persistence_id: PersistenceId,

    /// The version of the entity at the time of the snapshot.
    pub version: Version,

    /// When the snapshot was created.
    pub timestamp: DateTime<Utc>,

    /// The serialized entity state.
    pub state: serde_json::Value,
}

impl Snapshot {
    /// Creates a new snapshot.
    pub fn new(persistence_id: PersistenceId, version: Version, state: serde_json::Value) -> Self {
        Self {
            persistence_id,
            version,
            timestamp: Utc::now(),
            state,
        }
    }

    /// Creates a snapshot from a serializable state.
    pub fn from_state<T: Serialize>(
        persistence_id: PersistenceId,
        version: Version,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            persistence_id,
            version,
            timestamp: Utc::now(),
            state: serde_json::to_value(state)?,
        })
    }

    /// Deserializes the snapshot state into a concrete type.
    pub fn into_state<T: for<'de> Deserialize<'de>>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state)
    }
}
