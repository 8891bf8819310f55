//! Saga coordinator commands.

use chrono::{DateTime, Utc};
use common::{AccountNumber, Amount, TransactionId};
use domain::{Operation, ParticipantAck};
use tokio::sync::oneshot;

use crate::aggregate::SagaSummary;
use crate::error::StartSagaError;

/// Commands accepted by a saga coordinator entity.
#[derive(Debug)]
pub enum SagaCommand {
    /// Begin the saga (idempotent once started).
    Start(StartSaga),

    /// Acknowledgement from a participant account.
    Ack(ParticipantAck),

    /// Timeout/retry signal carrying the observed current time.
    Tick(DateTime<Utc>),

    /// Read the current saga state; has no effect.
    Get(GetSagaState),
}

/// Starts a saga over a fixed command list.
#[derive(Debug)]
pub struct StartSaga {
    pub tx_id: TransactionId,
    pub commands: Vec<Operation>,
    /// Acknowledgement path back to the external caller.
    pub reply_to: Option<oneshot::Sender<Result<(), StartSagaError>>>,
}

impl StartSaga {
    /// Builds the command list from the wire-level deposit and withdrawal
    /// lists. The participant set is the distinct account numbers.
    pub fn new(
        tx_id: TransactionId,
        deposits: impl IntoIterator<Item = (AccountNumber, Amount)>,
        withdrawals: impl IntoIterator<Item = (AccountNumber, Amount)>,
    ) -> Self {
        let commands = deposits
            .into_iter()
            .map(|(account, amount)| Operation::deposit(account, amount))
            .chain(
                withdrawals
                    .into_iter()
                    .map(|(account, amount)| Operation::withdraw(account, amount)),
            )
            .collect();
        Self {
            tx_id,
            commands,
            reply_to: None,
        }
    }
}

/// Queries the saga's current state snapshot.
#[derive(Debug)]
pub struct GetSagaState {
    pub reply_to: oneshot::Sender<SagaSummary>,
}
