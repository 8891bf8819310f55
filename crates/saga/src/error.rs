//! Saga error types.

use common::AccountNumber;
use thiserror::Error;

/// Reasons a `StartSaga` request is refused before any event is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartSagaError {
    /// A saga needs at least one deposit or withdrawal.
    #[error("a saga needs at least one command")]
    NoCommands,

    /// Every amount must be strictly positive.
    #[error("amount must be positive for account {account}")]
    NonPositiveAmount { account: AccountNumber },

    /// A participant can stage at most one delta per transaction.
    #[error("account {account} appears more than once")]
    DuplicateParticipant { account: AccountNumber },

    /// Transaction and account identifiers must be non-empty.
    #[error("blank identifier in request")]
    BlankIdentifier,
}

/// Errors surfaced by the public [`Bank`](crate::Bank) API.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request was refused by validation.
    #[error("saga request rejected: {0}")]
    Rejected(#[from] StartSagaError),

    /// The entity stopped before answering.
    #[error("entity did not reply: {0}")]
    NoReply(#[from] tokio::sync::oneshot::error::RecvError),
}
