//! Persisted saga events.

use chrono::{DateTime, Utc};
use common::{AccountNumber, TransactionId};
use domain::{Operation, RejectionReason};
use event_store::DomainEvent;
use serde::{Deserialize, Serialize};

use crate::state::SagaOutcome;

/// Events that can occur during a saga's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// Saga accepted its command list and started the prepare phase.
    SagaStarted(SagaStartedData),

    /// A participant durably staged its delta.
    ParticipantReady(ParticipantData),

    /// A participant refused to stage.
    ParticipantRejected(ParticipantRejectedData),

    /// All participants were ready; commit is the decision.
    CommitDecided(DecisionData),

    /// A rejection or the deadline made rollback the decision.
    RollbackDecided(DecisionData),

    /// A participant committed its staged delta.
    ParticipantCleared(ParticipantData),

    /// A participant reversed its staged delta.
    ParticipantReversed(ParticipantData),

    /// The saga reached its global outcome.
    SagaCompleted(SagaCompletedData),
}

impl DomainEvent for SagaEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::ParticipantReady(_) => "ParticipantReady",
            SagaEvent::ParticipantRejected(_) => "ParticipantRejected",
            SagaEvent::CommitDecided(_) => "CommitDecided",
            SagaEvent::RollbackDecided(_) => "RollbackDecided",
            SagaEvent::ParticipantCleared(_) => "ParticipantCleared",
            SagaEvent::ParticipantReversed(_) => "ParticipantReversed",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
        }
    }
}

/// Data for SagaStarted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaStartedData {
    /// The transaction driven by this saga.
    pub tx_id: TransactionId,

    /// The fixed command list; the participant set is its distinct
    /// account numbers.
    pub commands: Vec<Operation>,

    /// Prepare-phase deadline.
    pub deadline: DateTime<Utc>,
}

/// Data for participant acknowledgement events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantData {
    pub tx_id: TransactionId,
    pub account_number: AccountNumber,
}

/// Data for ParticipantRejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRejectedData {
    pub tx_id: TransactionId,
    pub account_number: AccountNumber,
    pub reason: RejectionReason,
}

/// Data for the commit/rollback decision events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionData {
    pub tx_id: TransactionId,
}

/// Data for SagaCompleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaCompletedData {
    pub tx_id: TransactionId,
    pub outcome: SagaOutcome,
}

// Convenience constructors
impl SagaEvent {
    /// Creates a SagaStarted event.
    pub fn started(tx_id: TransactionId, commands: Vec<Operation>, deadline: DateTime<Utc>) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            tx_id,
            commands,
            deadline,
        })
    }

    /// Creates a ParticipantReady event.
    pub fn participant_ready(tx_id: TransactionId, account_number: AccountNumber) -> Self {
        SagaEvent::ParticipantReady(ParticipantData {
            tx_id,
            account_number,
        })
    }

    /// Creates a ParticipantRejected event.
    pub fn participant_rejected(
        tx_id: TransactionId,
        account_number: AccountNumber,
        reason: RejectionReason,
    ) -> Self {
        SagaEvent::ParticipantRejected(ParticipantRejectedData {
            tx_id,
            account_number,
            reason,
        })
    }

    /// Creates a CommitDecided event.
    pub fn commit_decided(tx_id: TransactionId) -> Self {
        SagaEvent::CommitDecided(DecisionData { tx_id })
    }

    /// Creates a RollbackDecided event.
    pub fn rollback_decided(tx_id: TransactionId) -> Self {
        SagaEvent::RollbackDecided(DecisionData { tx_id })
    }

    /// Creates a ParticipantCleared event.
    pub fn participant_cleared(tx_id: TransactionId, account_number: AccountNumber) -> Self {
        SagaEvent::ParticipantCleared(ParticipantData {
            tx_id,
            account_number,
        })
    }

    /// Creates a ParticipantReversed event.
    pub fn participant_reversed(tx_id: TransactionId, account_number: AccountNumber) -> Self {
        SagaEvent::ParticipantReversed(ParticipantData {
            tx_id,
            account_number,
        })
    }

    /// Creates a SagaCompleted event.
    pub fn completed(tx_id: TransactionId, outcome: SagaOutcome) -> Self {
        SagaEvent::SagaCompleted(SagaCompletedData { tx_id, outcome })
    }
}
