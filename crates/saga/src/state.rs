//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► AwaitingReady ──┬──► Committing ──► Completed(Committed)
///                             └──► RollingBack ──► Completed(RolledBack)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaStatus {
    /// No `SagaStarted` event has been applied yet.
    #[default]
    Pending,

    /// Participants are staging their deltas.
    AwaitingReady,

    /// All participants were ready; clears are being collected.
    Committing,

    /// A rejection or the deadline forced a rollback; reversals are being
    /// collected.
    RollingBack,

    /// The saga reached its outcome (terminal state).
    Completed,
}

impl SagaStatus {
    /// Returns true if the prepare phase is still open.
    pub fn is_awaiting_ready(&self) -> bool {
        matches!(self, SagaStatus::AwaitingReady)
    }

    /// Returns true once commit or rollback has been decided.
    pub fn is_decided(&self) -> bool {
        matches!(
            self,
            SagaStatus::Committing | SagaStatus::RollingBack | SagaStatus::Completed
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Pending => "Pending",
            SagaStatus::AwaitingReady => "AwaitingReady",
            SagaStatus::Committing => "Committing",
            SagaStatus::RollingBack => "RollingBack",
            SagaStatus::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Global outcome of a completed saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaOutcome {
    /// Every participant cleared its staged delta.
    Committed,

    /// Every staged delta was reversed.
    RolledBack,
}

impl SagaOutcome {
    /// Returns the outcome name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaOutcome::Committed => "Committed",
            SagaOutcome::RolledBack => "RolledBack",
        }
    }
}

impl std::fmt::Display for SagaOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
