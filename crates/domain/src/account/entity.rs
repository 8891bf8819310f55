//! Mailbox behavior of a bank account entity.

use std::collections::VecDeque;

use async_trait::async_trait;
use common::{AccountNumber, TransactionId};
use event_store::EventEnvelope;
use runtime::{Entity, Journal, RuntimeError};

use crate::aggregate::Aggregate;

use super::aggregate::{BankAccount, TransactionOutcome};
use super::commands::{
    AccountCommand, CommitTransaction, CoordinatorRef, CreateBankAccount, ParticipantAck,
    RejectionReason, RollbackTransaction, StartTransaction,
};
use super::events::AccountEvent;
use super::state::AccountStatus;

/// A bank account behind its mailbox.
///
/// Wraps the pure [`BankAccount`] fold with the serialization rules of the
/// two-phase protocol: while a transaction is staged, starts for other
/// transactions are stashed FIFO and replayed after the commit/rollback.
/// The stash is transient; after a crash the coordinator's at-least-once
/// retries restore it.
pub struct BankAccountEntity {
    account_number: AccountNumber,
    account: BankAccount,
    stash: VecDeque<StartTransaction>,
    stash_capacity: usize,
}

impl BankAccountEntity {
    /// Creates a blank entity for the given account number.
    pub fn new(account_number: AccountNumber, stash_capacity: usize) -> Self {
        Self {
            account_number,
            account: BankAccount::default(),
            stash: VecDeque::new(),
            stash_capacity,
        }
    }

    /// Number of commands currently stashed.
    pub fn stashed(&self) -> usize {
        self.stash.len()
    }

    async fn handle_create(
        &mut self,
        command: CreateBankAccount,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError> {
        if let Some(event) = self
            .account
            .create(command.customer_number, command.account_number)
        {
            journal.persist(&event).await?;
            self.account.apply(event);
            tracing::info!(account = %self.account_number, "bank account created");
        } else {
            tracing::debug!(account = %self.account_number, "duplicate create ignored");
        }
        if let Some(reply) = command.reply_to {
            let _ = reply.send(self.account.summary());
        }
        Ok(())
    }

    async fn handle_start(
        &mut self,
        command: StartTransaction,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError> {
        let StartTransaction {
            tx_id,
            operation,
            reply_to,
        } = command;

        match self.account.status() {
            AccountStatus::Uninitialized => {
                reply_to.tell(ParticipantAck::Rejected {
                    account_number: self.account_number.clone(),
                    tx_id,
                    reason: RejectionReason::AccountNotInitialized,
                });
            }
            AccountStatus::InTransaction => {
                if self.account.is_current(&tx_id) {
                    // retried delivery of the staged transaction
                    reply_to.tell(ParticipantAck::Ready {
                        account_number: self.account_number.clone(),
                        tx_id,
                    });
                } else if let Some(outcome) = self.account.outcome_of(&tx_id) {
                    self.ack_outcome(outcome, tx_id, &reply_to);
                } else if self.stash.len() >= self.stash_capacity {
                    tracing::warn!(
                        account = %self.account_number,
                        tx = %tx_id,
                        capacity = self.stash_capacity,
                        "stash full, rejecting"
                    );
                    reply_to.tell(ParticipantAck::Rejected {
                        account_number: self.account_number.clone(),
                        tx_id,
                        reason: RejectionReason::Busy,
                    });
                } else {
                    self.stash.push_back(StartTransaction {
                        tx_id,
                        operation,
                        reply_to,
                    });
                }
            }
            AccountStatus::Active => {
                if let Some(outcome) = self.account.outcome_of(&tx_id) {
                    self.ack_outcome(outcome, tx_id, &reply_to);
                    return Ok(());
                }
                match self.account.stage(&tx_id, operation.staged()) {
                    Ok(event) => {
                        journal.persist(&event).await?;
                        self.account.apply(event);
                        reply_to.tell(ParticipantAck::Ready {
                            account_number: self.account_number.clone(),
                            tx_id,
                        });
                    }
                    Err(reason) => {
                        tracing::debug!(
                            account = %self.account_number,
                            tx = %tx_id,
                            %reason,
                            "transaction rejected"
                        );
                        reply_to.tell(ParticipantAck::Rejected {
                            account_number: self.account_number.clone(),
                            tx_id,
                            reason,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_commit(
        &mut self,
        command: CommitTransaction,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError> {
        let CommitTransaction {
            tx_id, reply_to, ..
        } = command;

        if self.account.is_current(&tx_id) {
            if let Some(event) = self.account.clear_current() {
                journal.persist(&event).await?;
                self.account.apply(event);
            }
            reply_to.tell(ParticipantAck::Cleared {
                account_number: self.account_number.clone(),
                tx_id,
            });
        } else if let Some(outcome) = self.account.outcome_of(&tx_id) {
            self.ack_outcome(outcome, tx_id, &reply_to);
        } else {
            tracing::warn!(
                account = %self.account_number,
                tx = %tx_id,
                "commit for unknown transaction"
            );
            reply_to.tell(ParticipantAck::UnknownTransaction {
                account_number: self.account_number.clone(),
                tx_id,
            });
        }
        Ok(())
    }

    async fn handle_rollback(
        &mut self,
        command: RollbackTransaction,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError> {
        let RollbackTransaction {
            tx_id, reply_to, ..
        } = command;

        if self.account.is_current(&tx_id) {
            if let Some(event) = self.account.reverse_current() {
                journal.persist(&event).await?;
                self.account.apply(event);
            }
            reply_to.tell(ParticipantAck::Reversed {
                account_number: self.account_number.clone(),
                tx_id,
            });
        } else if let Some(outcome) = self.account.outcome_of(&tx_id) {
            self.ack_outcome(outcome, tx_id, &reply_to);
        } else {
            tracing::warn!(
                account = %self.account_number,
                tx = %tx_id,
                "rollback for unknown transaction"
            );
            reply_to.tell(ParticipantAck::UnknownTransaction {
                account_number: self.account_number.clone(),
                tx_id,
            });
        }
        Ok(())
    }

    /// Replays stashed starts after a transition back to `Active`.
    ///
    /// Each command is reprocessed as if freshly received; the first one
    /// accepted puts the account back `InTransaction` and the remainder
    /// stay stashed.
    async fn drain_stash(&mut self, journal: &mut Journal) -> Result<(), RuntimeError> {
        loop {
            if !self.account.status().is_active() {
                return Ok(());
            }
            let Some(next) = self.stash.pop_front() else {
                return Ok(());
            };
            self.handle_start(next, journal).await?;
        }
    }

    fn ack_outcome(
        &self,
        outcome: TransactionOutcome,
        tx_id: TransactionId,
        reply_to: &CoordinatorRef,
    ) {
        let ack = match outcome {
            TransactionOutcome::Cleared => ParticipantAck::Cleared {
                account_number: self.account_number.clone(),
                tx_id,
            },
            TransactionOutcome::Reversed => ParticipantAck::Reversed {
                account_number: self.account_number.clone(),
                tx_id,
            },
        };
        reply_to.tell(ack);
    }
}

#[async_trait]
impl Entity for BankAccountEntity {
    type Command = AccountCommand;

    fn entity_type() -> &'static str {
        "BankAccount"
    }

    fn recover(&mut self, envelope: &EventEnvelope) -> Result<(), RuntimeError> {
        let event: AccountEvent = envelope.payload_as()?;
        self.account.apply(event);
        Ok(())
    }

    async fn handle(
        &mut self,
        command: AccountCommand,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError> {
        match command {
            AccountCommand::Create(cmd) => self.handle_create(cmd, journal).await,
            AccountCommand::Start(cmd) => self.handle_start(cmd, journal).await,
            AccountCommand::Commit(cmd) => {
                self.handle_commit(cmd, journal).await?;
                self.drain_stash(journal).await
            }
            AccountCommand::Rollback(cmd) => {
                self.handle_rollback(cmd, journal).await?;
                self.drain_stash(journal).await
            }
            AccountCommand::Get(query) => {
                let _ = query.reply_to.send(self.account.summary());
                Ok(())
            }
        }
    }
}
