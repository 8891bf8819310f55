//! Bank account domain.
//!
//! A bank account is an event-sourced entity holding a balance and a
//! staging area for at most one in-flight transaction. It participates in
//! two-phase money movements driven by a saga coordinator: deltas are
//! staged durably, then cleared or reversed on the coordinator's decision.

pub mod account;
pub mod aggregate;

pub use account::{
    AccountCommand, AccountEvent, AccountStatus, BankAccount, BankAccountEntity,
    BankAccountSummary, CommitTransaction, CoordinatorRef, CreateBankAccount,
    GetBankAccountState, Operation, ParticipantAck, RejectionReason, RollbackTransaction,
    StagedOperation, StartTransaction, TransactionOutcome,
};
pub use aggregate::Aggregate;
