//! Bank account entity: aggregate, events, commands and mailbox behavior.

pub mod aggregate;
pub mod commands;
pub mod entity;
pub mod events;
pub mod state;

pub use aggregate::{BankAccount, BankAccountSummary, TransactionOutcome};
pub use commands::{
    AccountCommand, CommitTransaction, CoordinatorRef, CreateBankAccount, GetBankAccountState,
    Operation, ParticipantAck, RejectionReason, RollbackTransaction, StartTransaction,
};
pub use entity::BankAccountEntity;
pub use events::{AccountEvent, StagedOperation};
pub use state::AccountStatus;
