//! Saga coordinator entity.
//!
//! Drives a fixed set of deposits and withdrawals across bank accounts to
//! a global commit or rollback. The prepare phase is bounded by a
//! deadline; once decided, completion is driven purely by participant
//! acknowledgements, with tick-based re-delivery of anything outstanding.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{AccountNumber, TransactionId};
use domain::{
    AccountCommand, Aggregate, BankAccountEntity, CommitTransaction, CoordinatorRef,
    ParticipantAck, RejectionReason, RollbackTransaction, StartTransaction,
};
use event_store::EventEnvelope;
use runtime::{Clock, Entity, Journal, Router, RuntimeError};

use crate::aggregate::{OutstandingCommand, TransferSaga};
use crate::commands::{SagaCommand, StartSaga};
use crate::error::StartSagaError;
use crate::events::SagaEvent;
use crate::state::{SagaOutcome, SagaStatus};

/// The coordinator entity for one transaction.
pub struct SagaCoordinator {
    tx_id: TransactionId,
    saga: TransferSaga,
    accounts: Router<BankAccountEntity>,
    sagas: Router<SagaCoordinator>,
    clock: Arc<dyn Clock>,
    prepare_timeout: Duration,
}

impl SagaCoordinator {
    /// Creates a blank coordinator for the given transaction id.
    pub fn new(
        tx_id: TransactionId,
        accounts: Router<BankAccountEntity>,
        sagas: Router<SagaCoordinator>,
        clock: Arc<dyn Clock>,
        prepare_timeout: Duration,
    ) -> Self {
        Self {
            tx_id,
            saga: TransferSaga::default(),
            accounts,
            sagas,
            clock,
            prepare_timeout,
        }
    }

    /// The reply reference participants answer to; routes acks back into
    /// this saga's mailbox, re-activating it if it was passivated.
    fn reply_ref(&self) -> CoordinatorRef {
        self.sagas.recipient(self.tx_id.as_str(), SagaCommand::Ack)
    }

    async fn handle_start(
        &mut self,
        command: StartSaga,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError> {
        if self.saga.is_started() {
            tracing::debug!(tx = %self.tx_id, "duplicate start absorbed");
            self.dispatch_outstanding();
            if let Some(reply) = command.reply_to {
                let _ = reply.send(Ok(()));
            }
            return Ok(());
        }

        if let Err(error) = validate_start(&command) {
            tracing::warn!(tx = %self.tx_id, %error, "saga request refused");
            if let Some(reply) = command.reply_to {
                let _ = reply.send(Err(error));
            }
            return Ok(());
        }

        let deadline = self.clock.now() + self.prepare_timeout;
        let event = SagaEvent::started(self.tx_id.clone(), command.commands, deadline);
        journal.persist(&event).await?;
        self.saga.apply(event);

        metrics::counter!("saga_started_total").increment(1);
        tracing::info!(
            tx = %self.tx_id,
            participants = self.saga.participants().len(),
            %deadline,
            "saga started"
        );

        self.dispatch_outstanding();
        if let Some(reply) = command.reply_to {
            let _ = reply.send(Ok(()));
        }
        Ok(())
    }

    async fn handle_ack(
        &mut self,
        ack: ParticipantAck,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError> {
        if ack.tx_id() != &self.tx_id {
            tracing::warn!(tx = %self.tx_id, stray = %ack.tx_id(), "ack for foreign transaction ignored");
            return Ok(());
        }

        match ack {
            ParticipantAck::Ready { account_number, .. } => {
                self.on_ready(account_number, journal).await
            }
            ParticipantAck::Rejected {
                account_number,
                reason,
                ..
            } => self.on_rejected(account_number, reason, journal).await,
            ParticipantAck::Cleared { account_number, .. } => {
                self.on_cleared(account_number, journal).await
            }
            ParticipantAck::Reversed { account_number, .. } => {
                self.on_reversed(account_number, journal).await
            }
            ParticipantAck::UnknownTransaction { account_number, .. } => {
                tracing::warn!(
                    tx = %self.tx_id,
                    account = %account_number,
                    "participant does not know this transaction"
                );
                Ok(())
            }
        }
    }

    async fn on_ready(
        &mut self,
        account: AccountNumber,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError> {
        if self.saga.ready().contains(&account) || !self.saga.participants().contains(&account) {
            return Ok(());
        }

        match self.saga.status() {
            SagaStatus::AwaitingReady => {
                let event = SagaEvent::participant_ready(self.tx_id.clone(), account);
                journal.persist(&event).await?;
                self.saga.apply(event);

                if self.saga.all_ready() {
                    self.decide_commit(journal).await?;
                }
                Ok(())
            }
            SagaStatus::RollingBack => {
                // this participant staged after the decision; it must be
                // reversed like the rest
                let event = SagaEvent::participant_ready(self.tx_id.clone(), account.clone());
                journal.persist(&event).await?;
                self.saga.apply(event);
                self.send_rollback(&account);
                Ok(())
            }
            _ => {
                tracing::debug!(tx = %self.tx_id, account = %account, "ready absorbed");
                Ok(())
            }
        }
    }

    async fn on_rejected(
        &mut self,
        account: AccountNumber,
        reason: RejectionReason,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError> {
        if self.saga.rejected().contains(&account)
            || self.saga.ready().contains(&account)
            || !self.saga.participants().contains(&account)
        {
            return Ok(());
        }

        match self.saga.status() {
            SagaStatus::AwaitingReady => {
                let event =
                    SagaEvent::participant_rejected(self.tx_id.clone(), account.clone(), reason);
                journal.persist(&event).await?;
                self.saga.apply(event);

                tracing::warn!(
                    tx = %self.tx_id,
                    account = %account,
                    %reason,
                    "participant rejected, rolling back"
                );
                self.decide_rollback(journal).await
            }
            SagaStatus::RollingBack => {
                // a straggler answered the retried start with a rejection
                let event = SagaEvent::participant_rejected(self.tx_id.clone(), account, reason);
                journal.persist(&event).await?;
                self.saga.apply(event);
                self.complete_rollback_if_done(journal).await
            }
            _ => Ok(()),
        }
    }

    async fn on_cleared(
        &mut self,
        account: AccountNumber,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError> {
        if self.saga.status() != SagaStatus::Committing
            || self.saga.cleared().contains(&account)
            || !self.saga.participants().contains(&account)
        {
            return Ok(());
        }

        let event = SagaEvent::participant_cleared(self.tx_id.clone(), account);
        journal.persist(&event).await?;
        self.saga.apply(event);

        if self.saga.commit_complete() {
            self.complete(SagaOutcome::Committed, journal).await?;
        }
        Ok(())
    }

    async fn on_reversed(
        &mut self,
        account: AccountNumber,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError> {
        if self.saga.status() != SagaStatus::RollingBack
            || self.saga.reversed().contains(&account)
            || !self.saga.ready().contains(&account)
        {
            return Ok(());
        }

        let event = SagaEvent::participant_reversed(self.tx_id.clone(), account);
        journal.persist(&event).await?;
        self.saga.apply(event);

        self.complete_rollback_if_done(journal).await
    }

    async fn handle_tick(
        &mut self,
        now: DateTime<Utc>,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError> {
        match self.saga.status() {
            SagaStatus::AwaitingReady => {
                if let Some(deadline) = self.saga.deadline()
                    && now >= deadline
                {
                    tracing::warn!(tx = %self.tx_id, %deadline, "prepare deadline expired, rolling back");
                    metrics::counter!("saga_deadline_expired_total").increment(1);
                    self.decide_rollback(journal).await
                } else {
                    self.dispatch_outstanding();
                    Ok(())
                }
            }
            // the decision is final; ticks only re-deliver outstanding
            // commands
            SagaStatus::Committing | SagaStatus::RollingBack => {
                self.dispatch_outstanding();
                Ok(())
            }
            SagaStatus::Pending | SagaStatus::Completed => Ok(()),
        }
    }

    async fn decide_commit(&mut self, journal: &mut Journal) -> Result<(), RuntimeError> {
        let event = SagaEvent::commit_decided(self.tx_id.clone());
        journal.persist(&event).await?;
        self.saga.apply(event);

        metrics::counter!("saga_commit_decided_total").increment(1);
        tracing::info!(tx = %self.tx_id, "all participants ready, committing");
        self.dispatch_outstanding();
        Ok(())
    }

    async fn decide_rollback(&mut self, journal: &mut Journal) -> Result<(), RuntimeError> {
        let event = SagaEvent::rollback_decided(self.tx_id.clone());
        journal.persist(&event).await?;
        self.saga.apply(event);

        metrics::counter!("saga_rollback_decided_total").increment(1);
        self.dispatch_outstanding();

        // nothing may be outstanding at all (every participant rejected)
        self.complete_rollback_if_done(journal).await
    }

    async fn complete_rollback_if_done(&mut self, journal: &mut Journal) -> Result<(), RuntimeError> {
        if self.saga.rollback_complete() {
            self.complete(SagaOutcome::RolledBack, journal).await?;
        }
        Ok(())
    }

    async fn complete(
        &mut self,
        outcome: SagaOutcome,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError> {
        let event = SagaEvent::completed(self.tx_id.clone(), outcome);
        journal.persist(&event).await?;
        self.saga.apply(event);

        match outcome {
            SagaOutcome::Committed => metrics::counter!("saga_committed_total").increment(1),
            SagaOutcome::RolledBack => metrics::counter!("saga_rolled_back_total").increment(1),
        }
        tracing::info!(tx = %self.tx_id, %outcome, "saga completed");
        Ok(())
    }

    /// Re-sends every command the current status still owes.
    ///
    /// Participant idempotence makes re-delivery safe.
    fn dispatch_outstanding(&self) {
        for outstanding in self.saga.outstanding_commands() {
            match outstanding {
                OutstandingCommand::Start(operation) => {
                    let account = operation.account_number().clone();
                    let command = AccountCommand::Start(StartTransaction {
                        tx_id: self.tx_id.clone(),
                        operation,
                        reply_to: self.reply_ref(),
                    });
                    self.accounts.send(account.as_str(), command);
                }
                OutstandingCommand::Commit(account) => {
                    let command = AccountCommand::Commit(CommitTransaction {
                        tx_id: self.tx_id.clone(),
                        account_number: account.clone(),
                        reply_to: self.reply_ref(),
                    });
                    self.accounts.send(account.as_str(), command);
                }
                OutstandingCommand::Rollback(account) => {
                    self.send_rollback(&account);
                }
            }
        }
    }

    fn send_rollback(&self, account: &AccountNumber) {
        let command = AccountCommand::Rollback(RollbackTransaction {
            tx_id: self.tx_id.clone(),
            account_number: account.clone(),
            reply_to: self.reply_ref(),
        });
        self.accounts.send(account.as_str(), command);
    }
}

#[async_trait]
impl Entity for SagaCoordinator {
    type Command = SagaCommand;

    fn entity_type() -> &'static str {
        "Saga"
    }

    fn recover(&mut self, envelope: &EventEnvelope) -> Result<(), RuntimeError> {
        let event: SagaEvent = envelope.payload_as()?;
        self.saga.apply(event);
        Ok(())
    }

    fn on_recovered(&mut self) {
        if self.saga.is_started() && !self.saga.status().is_terminal() {
            tracing::info!(
                tx = %self.tx_id,
                status = %self.saga.status(),
                "saga recovered, resuming outstanding commands"
            );
            self.dispatch_outstanding();
        }
    }

    async fn handle(
        &mut self,
        command: SagaCommand,
        journal: &mut Journal,
    ) -> Result<(), RuntimeError> {
        match command {
            SagaCommand::Start(cmd) => self.handle_start(cmd, journal).await,
            SagaCommand::Ack(ack) => self.handle_ack(ack, journal).await,
            SagaCommand::Tick(now) => self.handle_tick(now, journal).await,
            SagaCommand::Get(query) => {
                let _ = query.reply_to.send(self.saga.summary());
                Ok(())
            }
        }
    }
}

fn validate_start(command: &StartSaga) -> Result<(), StartSagaError> {
    if command.tx_id.is_empty() {
        return Err(StartSagaError::BlankIdentifier);
    }
    if command.commands.is_empty() {
        return Err(StartSagaError::NoCommands);
    }

    let mut seen = BTreeSet::new();
    for op in &command.commands {
        let account = op.account_number();
        if account.is_empty() {
            return Err(StartSagaError::BlankIdentifier);
        }
        if !op.amount().is_positive() {
            return Err(StartSagaError::NonPositiveAmount {
                account: account.clone(),
            });
        }
        if !seen.insert(account.clone()) {
            return Err(StartSagaError::DuplicateParticipant {
                account: account.clone(),
            });
        }
    }
    Ok(())
}
