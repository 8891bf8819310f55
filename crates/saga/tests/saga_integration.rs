//! Integration tests for the money-movement saga.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use common::{AccountNumber, Amount, CustomerNumber, TransactionId};
use domain::{
    AccountCommand, AccountStatus, CommitTransaction, Operation, ParticipantAck, StartTransaction,
};
use event_store::InMemoryEventStore;
use runtime::{ManualClock, Recipient};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use saga::{Bank, BankConfig, SagaError, SagaOutcome, SagaStatus, SagaSummary, StartSagaError};
use tokio::sync::mpsc;

fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

fn a(n: &str) -> AccountNumber {
    AccountNumber::new(n)
}

fn tx(n: &str) -> TransactionId {
    TransactionId::new(n)
}

fn test_config() -> BankConfig {
    // ticks are driven manually for determinism
    BankConfig {
        tick_interval_ms: 0,
        ..BankConfig::default()
    }
}

fn ack_probe() -> (
    Recipient<ParticipantAck>,
    mpsc::UnboundedReceiver<ParticipantAck>,
) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let recipient = Recipient::new(move |ack| {
        let _ = sender.send(ack);
    });
    (recipient, receiver)
}

struct TestHarness {
    store: Arc<InMemoryEventStore>,
    clock: ManualClock,
    bank: Bank,
    config: BankConfig,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(test_config())
    }

    fn with_config(config: BankConfig) -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let clock = ManualClock::default();
        let bank = Bank::with_clock(store.clone(), config.clone(), Arc::new(clock.clone()));
        Self {
            store,
            clock,
            bank,
            config,
        }
    }

    /// Simulates a process crash: every entity is gone, the journal stays.
    fn reopen(&mut self) {
        self.bank = Bank::with_clock(
            self.store.clone(),
            self.config.clone(),
            Arc::new(self.clock.clone()),
        );
    }

    async fn create_account(&self, account: &str) {
        self.bank
            .create_account(CustomerNumber::new("cust"), a(account))
            .await
            .unwrap();
    }

    /// Funds an account through a single-participant deposit saga.
    async fn fund(&self, account: &str, value: Decimal) {
        let fund_tx = TransactionId::new(format!("fund-{account}"));
        self.bank
            .submit(fund_tx.clone(), vec![(a(account), amount(value))], vec![])
            .await
            .unwrap();
        self.wait_for_outcome(&fund_tx, SagaOutcome::Committed).await;
    }

    /// Occupies an account with a transaction that stays staged until
    /// released.
    async fn hold_account(
        &self,
        account: &str,
        hold_tx: &str,
    ) -> mpsc::UnboundedReceiver<ParticipantAck> {
        let (probe, mut acks) = ack_probe();
        self.bank.accounts().send(
            account,
            AccountCommand::Start(StartTransaction {
                tx_id: tx(hold_tx),
                operation: Operation::deposit(a(account), amount(dec!(1))),
                reply_to: probe,
            }),
        );
        match acks.recv().await {
            Some(ParticipantAck::Ready { .. }) => acks,
            other => panic!("expected Ready for hold, got {other:?}"),
        }
    }

    async fn release_account(&self, account: &str, hold_tx: &str) {
        let (probe, mut acks) = ack_probe();
        self.bank.accounts().send(
            account,
            AccountCommand::Commit(CommitTransaction {
                tx_id: tx(hold_tx),
                account_number: a(account),
                reply_to: probe,
            }),
        );
        match acks.recv().await {
            Some(ParticipantAck::Cleared { .. }) => {}
            other => panic!("expected Cleared for hold, got {other:?}"),
        }
    }

    async fn wait_for(
        &self,
        tx_id: &TransactionId,
        pred: impl Fn(&SagaSummary) -> bool,
    ) -> SagaSummary {
        for _ in 0..400 {
            let summary = self.bank.saga_state(tx_id).await.unwrap();
            if pred(&summary) {
                return summary;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        panic!("saga {tx_id} did not reach the expected state");
    }

    async fn wait_for_outcome(&self, tx_id: &TransactionId, outcome: SagaOutcome) -> SagaSummary {
        self.wait_for(tx_id, |s| s.outcome == Some(outcome)).await
    }

    async fn balance(&self, account: &str) -> Amount {
        let state = self.bank.account_state(&a(account)).await.unwrap();
        assert_eq!(state.status, AccountStatus::Active);
        assert_eq!(state.pending_balance, Decimal::ZERO);
        state.balance
    }
}

#[tokio::test]
async fn test_commit_end_to_end() {
    let h = TestHarness::new();
    h.create_account("A1").await;
    h.create_account("A2").await;
    h.fund("A1", dec!(100)).await;

    h.bank
        .submit(
            tx("s1"),
            vec![(a("A2"), amount(dec!(30)))],
            vec![(a("A1"), amount(dec!(30)))],
        )
        .await
        .unwrap();

    let summary = h.wait_for_outcome(&tx("s1"), SagaOutcome::Committed).await;
    assert_eq!(summary.status, SagaStatus::Completed);
    assert_eq!(summary.cleared, BTreeSet::from([a("A1"), a("A2")]));
    assert!(summary.reversed.is_empty());
    assert!(summary.rejected.is_empty());

    assert_eq!(h.balance("A1").await, amount(dec!(70)));
    assert_eq!(h.balance("A2").await, amount(dec!(30)));
}

#[tokio::test]
async fn test_rollback_on_insufficient_funds() {
    let h = TestHarness::new();
    h.create_account("A1").await;
    h.create_account("A2").await;

    // A2 has balance 0, so the withdrawal is rejected
    h.bank
        .submit(
            tx("s1"),
            vec![(a("A1"), amount(dec!(1)))],
            vec![(a("A2"), amount(dec!(999)))],
        )
        .await
        .unwrap();

    let summary = h.wait_for_outcome(&tx("s1"), SagaOutcome::RolledBack).await;
    assert_eq!(summary.rejected, BTreeSet::from([a("A2")]));
    assert_eq!(summary.reversed, BTreeSet::from([a("A1")]));
    assert!(summary.cleared.is_empty());
    assert!(summary.cleared.is_disjoint(&summary.reversed));

    assert_eq!(h.balance("A1").await, Amount::ZERO);
    assert_eq!(h.balance("A2").await, Amount::ZERO);
}

#[tokio::test]
async fn test_deadline_expiry_rolls_back_and_straggler_is_reversed() {
    let h = TestHarness::new();
    h.create_account("A1").await;
    h.create_account("A2").await;

    // A2 is busy with another transaction, so the saga's start is stashed
    // and never answered before the deadline
    let _hold_acks = h.hold_account("A2", "hold-1").await;

    h.bank
        .submit(
            tx("s2"),
            vec![(a("A1"), amount(dec!(1))), (a("A2"), amount(dec!(2)))],
            vec![],
        )
        .await
        .unwrap();
    h.wait_for(&tx("s2"), |s| s.ready.contains(&a("A1"))).await;

    h.clock.advance(Duration::seconds(6));
    h.bank.tick();

    // the decision is final and A1's staged delta is reversed, but the
    // saga keeps waiting for the unanswered participant
    let summary = h
        .wait_for(&tx("s2"), |s| {
            s.status == SagaStatus::RollingBack && s.reversed.contains(&a("A1"))
        })
        .await;
    assert_eq!(summary.outcome, None);

    // releasing A2 lets the stashed start be answered, and the late Ready
    // is met with an immediate rollback
    h.release_account("A2", "hold-1").await;

    let summary = h.wait_for_outcome(&tx("s2"), SagaOutcome::RolledBack).await;
    assert_eq!(summary.reversed, BTreeSet::from([a("A1"), a("A2")]));
    assert!(summary.cleared.is_empty());

    assert_eq!(h.balance("A1").await, Amount::ZERO);
    // only the hold deposit survives on A2
    assert_eq!(h.balance("A2").await, amount(dec!(1)));
}

#[tokio::test]
async fn test_saga_resumes_after_crash_and_commits() {
    let mut h = TestHarness::new();
    h.create_account("A1").await;
    h.create_account("A2").await;
    let _hold_acks = h.hold_account("A2", "hold-1").await;

    h.bank
        .submit(
            tx("s3"),
            vec![(a("A1"), amount(dec!(5))), (a("A2"), amount(dec!(5)))],
            vec![],
        )
        .await
        .unwrap();
    h.wait_for(&tx("s3"), |s| s.ready.contains(&a("A1"))).await;

    // crash: A2's stashed start is lost with the process; the journals
    // survive
    h.reopen();

    // reactivating the saga resumes its outstanding start for A2
    let summary = h.bank.saga_state(&tx("s3")).await.unwrap();
    assert_eq!(summary.status, SagaStatus::AwaitingReady);
    assert_eq!(summary.ready, BTreeSet::from([a("A1")]));

    h.release_account("A2", "hold-1").await;

    let summary = h.wait_for_outcome(&tx("s3"), SagaOutcome::Committed).await;
    assert_eq!(summary.cleared, BTreeSet::from([a("A1"), a("A2")]));

    assert_eq!(h.balance("A1").await, amount(dec!(5)));
    // hold deposit plus the saga deposit
    assert_eq!(h.balance("A2").await, amount(dec!(6)));
}

#[tokio::test]
async fn test_completed_saga_replay_rehydrates_terminal_state() {
    let mut h = TestHarness::new();
    h.create_account("A1").await;
    h.create_account("A2").await;
    h.fund("A1", dec!(10)).await;

    h.bank
        .submit(
            tx("s1"),
            vec![(a("A2"), amount(dec!(4)))],
            vec![(a("A1"), amount(dec!(4)))],
        )
        .await
        .unwrap();
    let live = h.wait_for_outcome(&tx("s1"), SagaOutcome::Committed).await;

    h.reopen();

    let replayed = h.bank.saga_state(&tx("s1")).await.unwrap();
    assert_eq!(replayed, live);
    assert_eq!(h.balance("A1").await, amount(dec!(6)));
    assert_eq!(h.balance("A2").await, amount(dec!(4)));
}

#[tokio::test]
async fn test_duplicate_submit_is_absorbed() {
    let h = TestHarness::new();
    h.create_account("A1").await;

    h.bank
        .submit(tx("s1"), vec![(a("A1"), amount(dec!(3)))], vec![])
        .await
        .unwrap();
    h.wait_for_outcome(&tx("s1"), SagaOutcome::Committed).await;

    // a retried submit acknowledges without starting anything new
    h.bank
        .submit(tx("s1"), vec![(a("A1"), amount(dec!(3)))], vec![])
        .await
        .unwrap();

    let summary = h.bank.saga_state(&tx("s1")).await.unwrap();
    assert_eq!(summary.outcome, Some(SagaOutcome::Committed));
    assert_eq!(h.balance("A1").await, amount(dec!(3)));
}

#[tokio::test]
async fn test_full_stash_answers_busy_and_saga_rolls_back() {
    let h = TestHarness::with_config(BankConfig {
        stash_capacity: 0,
        tick_interval_ms: 0,
        ..BankConfig::default()
    });
    h.create_account("A1").await;
    h.create_account("A2").await;
    let _hold_acks = h.hold_account("A2", "hold-1").await;

    h.bank
        .submit(
            tx("s4"),
            vec![(a("A1"), amount(dec!(1))), (a("A2"), amount(dec!(1)))],
            vec![],
        )
        .await
        .unwrap();

    // A2 answers Busy instead of stashing, so the rollback completes
    // without releasing the hold
    let summary = h.wait_for_outcome(&tx("s4"), SagaOutcome::RolledBack).await;
    assert_eq!(summary.rejected, BTreeSet::from([a("A2")]));
    assert_eq!(summary.reversed, BTreeSet::from([a("A1")]));
}

#[tokio::test]
async fn test_concurrent_sagas_on_one_account_are_serialized() {
    let h = TestHarness::new();
    h.create_account("A1").await;
    h.fund("A1", dec!(10)).await;

    h.bank
        .submit(tx("s5"), vec![], vec![(a("A1"), amount(dec!(4)))])
        .await
        .unwrap();
    h.bank
        .submit(tx("s6"), vec![], vec![(a("A1"), amount(dec!(5)))])
        .await
        .unwrap();

    h.wait_for_outcome(&tx("s5"), SagaOutcome::Committed).await;
    h.wait_for_outcome(&tx("s6"), SagaOutcome::Committed).await;

    assert_eq!(h.balance("A1").await, amount(dec!(1)));
}

#[tokio::test]
async fn test_submit_validation() {
    let h = TestHarness::new();

    let result = h.bank.submit(tx("v1"), vec![], vec![]).await;
    assert!(matches!(
        result,
        Err(SagaError::Rejected(StartSagaError::NoCommands))
    ));

    let result = h
        .bank
        .submit(
            tx("v2"),
            vec![(a("A1"), amount(dec!(1)))],
            vec![(a("A1"), amount(dec!(1)))],
        )
        .await;
    assert!(matches!(
        result,
        Err(SagaError::Rejected(StartSagaError::DuplicateParticipant { .. }))
    ));

    let result = h
        .bank
        .submit(tx("v3"), vec![(a("A1"), amount(dec!(0)))], vec![])
        .await;
    assert!(matches!(
        result,
        Err(SagaError::Rejected(StartSagaError::NonPositiveAmount { .. }))
    ));

    let result = h
        .bank
        .submit(tx(""), vec![(a("A1"), amount(dec!(1)))], vec![])
        .await;
    assert!(matches!(
        result,
        Err(SagaError::Rejected(StartSagaError::BlankIdentifier))
    ));
}

#[tokio::test]
async fn test_saga_against_missing_account_rolls_back() {
    let h = TestHarness::new();
    h.create_account("A1").await;

    // "ghost" was never created and rejects the start
    h.bank
        .submit(
            tx("s7"),
            vec![(a("A1"), amount(dec!(2))), (a("ghost"), amount(dec!(2)))],
            vec![],
        )
        .await
        .unwrap();

    let summary = h.wait_for_outcome(&tx("s7"), SagaOutcome::RolledBack).await;
    assert_eq!(summary.rejected, BTreeSet::from([a("ghost")]));
    assert_eq!(summary.reversed, BTreeSet::from([a("A1")]));
    assert_eq!(h.balance("A1").await, Amount::ZERO);
}

#[tokio::test]
async fn test_background_ticker_drives_deadline() {
    // real ticker enabled, short timeout: the rollback happens without
    // any manual tick
    let h = TestHarness::with_config(BankConfig {
        prepare_timeout_ms: 50,
        tick_interval_ms: 10,
        ..BankConfig::default()
    });
    h.create_account("A1").await;
    h.create_account("A2").await;
    let _hold_acks = h.hold_account("A2", "hold-1").await;

    h.bank
        .submit(
            tx("s8"),
            vec![(a("A1"), amount(dec!(1))), (a("A2"), amount(dec!(1)))],
            vec![],
        )
        .await
        .unwrap();

    // move the frozen test clock past the deadline; the background ticker
    // observes it on its own
    h.clock.advance(Duration::seconds(1));

    h.wait_for(&tx("s8"), |s| s.status == SagaStatus::RollingBack)
        .await;
}
