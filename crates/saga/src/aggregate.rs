//! Transfer saga aggregate.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::{AccountNumber, TransactionId};
use domain::{Aggregate, Operation};
use serde::{Deserialize, Serialize};

use crate::error::StartSagaError;
use crate::events::SagaEvent;
use crate::state::{SagaOutcome, SagaStatus};

/// A participant command the saga still owes for its current status.
#[derive(Debug, Clone, PartialEq)]
pub enum OutstandingCommand {
    /// Stage the operation on its account.
    Start(Operation),

    /// Commit the staged delta on the account.
    Commit(AccountNumber),

    /// Reverse the staged delta on the account.
    Rollback(AccountNumber),
}

/// An event-sourced money-movement saga.
///
/// Pure fold of the saga's events: the fixed command list plus the
/// participant acknowledgement sets. Replaying a completed saga's log
/// rehydrates the terminal state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferSaga {
    tx_id: Option<TransactionId>,
    status: SagaStatus,
    commands: Vec<Operation>,
    deadline: Option<DateTime<Utc>>,
    ready: BTreeSet<AccountNumber>,
    rejected: BTreeSet<AccountNumber>,
    cleared: BTreeSet<AccountNumber>,
    reversed: BTreeSet<AccountNumber>,
    outcome: Option<SagaOutcome>,
}

impl Aggregate for TransferSaga {
    type Event = SagaEvent;
    type Error = StartSagaError;

    fn aggregate_type() -> &'static str {
        "Saga"
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            SagaEvent::SagaStarted(data) => {
                self.tx_id = Some(data.tx_id);
                self.commands = data.commands;
                self.deadline = Some(data.deadline);
                self.status = SagaStatus::AwaitingReady;
            }
            SagaEvent::ParticipantReady(data) => {
                self.ready.insert(data.account_number);
            }
            SagaEvent::ParticipantRejected(data) => {
                self.rejected.insert(data.account_number);
            }
            SagaEvent::CommitDecided(_) => {
                self.status = SagaStatus::Committing;
            }
            SagaEvent::RollbackDecided(_) => {
                self.status = SagaStatus::RollingBack;
            }
            SagaEvent::ParticipantCleared(data) => {
                self.cleared.insert(data.account_number);
            }
            SagaEvent::ParticipantReversed(data) => {
                self.reversed.insert(data.account_number);
            }
            SagaEvent::SagaCompleted(data) => {
                self.status = SagaStatus::Completed;
                self.outcome = Some(data.outcome);
            }
        }
    }
}

// Query methods
impl TransferSaga {
    /// Returns true once `SagaStarted` has been applied.
    pub fn is_started(&self) -> bool {
        self.tx_id.is_some()
    }

    /// Returns the saga status.
    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// Returns the global outcome, once completed.
    pub fn outcome(&self) -> Option<SagaOutcome> {
        self.outcome
    }

    /// Returns the prepare-phase deadline.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Returns the fixed command list.
    pub fn commands(&self) -> &[Operation] {
        &self.commands
    }

    /// Returns the distinct account numbers of the command list.
    pub fn participants(&self) -> BTreeSet<AccountNumber> {
        self.commands
            .iter()
            .map(|op| op.account_number().clone())
            .collect()
    }

    /// Participants that acknowledged staging.
    pub fn ready(&self) -> &BTreeSet<AccountNumber> {
        &self.ready
    }

    /// Participants that refused to stage.
    pub fn rejected(&self) -> &BTreeSet<AccountNumber> {
        &self.rejected
    }

    /// Participants that committed their delta.
    pub fn cleared(&self) -> &BTreeSet<AccountNumber> {
        &self.cleared
    }

    /// Participants that reversed their delta.
    pub fn reversed(&self) -> &BTreeSet<AccountNumber> {
        &self.reversed
    }

    /// Returns true when every participant acknowledged staging.
    pub fn all_ready(&self) -> bool {
        self.participants()
            .iter()
            .all(|account| self.ready.contains(account))
    }

    /// Returns true when every participant answered ready or rejected.
    pub fn all_answered(&self) -> bool {
        self.participants()
            .iter()
            .all(|account| self.ready.contains(account) || self.rejected.contains(account))
    }

    /// Returns true when every participant cleared its delta.
    pub fn commit_complete(&self) -> bool {
        self.participants()
            .iter()
            .all(|account| self.cleared.contains(account))
    }

    /// Returns true when the rollback has nothing left outstanding: every
    /// participant has answered and every staged delta is reversed.
    pub fn rollback_complete(&self) -> bool {
        self.all_answered()
            && self
                .ready
                .iter()
                .all(|account| self.reversed.contains(account))
    }

    /// Commands still unacknowledged for the current status.
    ///
    /// Drives the initial fan-out, tick-based retries and post-recovery
    /// resumption alike.
    pub fn outstanding_commands(&self) -> Vec<OutstandingCommand> {
        let mut outstanding = Vec::new();
        match self.status {
            SagaStatus::Pending | SagaStatus::Completed => {}
            SagaStatus::AwaitingReady => {
                self.push_unanswered_starts(&mut outstanding);
            }
            SagaStatus::Committing => {
                for account in self.participants() {
                    if !self.cleared.contains(&account) {
                        outstanding.push(OutstandingCommand::Commit(account));
                    }
                }
            }
            SagaStatus::RollingBack => {
                // unanswered participants must still stage-or-reject
                // before the rollback can complete
                self.push_unanswered_starts(&mut outstanding);
                for account in &self.ready {
                    if !self.reversed.contains(account) {
                        outstanding.push(OutstandingCommand::Rollback(account.clone()));
                    }
                }
            }
        }
        outstanding
    }

    fn push_unanswered_starts(&self, outstanding: &mut Vec<OutstandingCommand>) {
        for op in &self.commands {
            let account = op.account_number();
            if !self.ready.contains(account) && !self.rejected.contains(account) {
                outstanding.push(OutstandingCommand::Start(op.clone()));
            }
        }
    }

    /// Returns a snapshot of the externally-visible saga state.
    pub fn summary(&self) -> SagaSummary {
        SagaSummary {
            status: self.status,
            outcome: self.outcome,
            ready: self.ready.clone(),
            rejected: self.rejected.clone(),
            cleared: self.cleared.clone(),
            reversed: self.reversed.clone(),
        }
    }
}

/// Externally-visible saga state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaSummary {
    pub status: SagaStatus,
    pub outcome: Option<SagaOutcome>,
    pub ready: BTreeSet<AccountNumber>,
    pub rejected: BTreeSet<AccountNumber>,
    pub cleared: BTreeSet<AccountNumber>,
    pub reversed: BTreeSet<AccountNumber>,
}
