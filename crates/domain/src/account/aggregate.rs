//! Bank account aggregate.

use std::collections::HashMap;

use common::{AccountNumber, Amount, CustomerNumber, TransactionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::commands::RejectionReason;
use super::events::{AccountEvent, StagedOperation};
use super::state::AccountStatus;

/// Terminal outcome of a transaction on this account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOutcome {
    /// The delta was committed into the balance.
    Cleared,

    /// The delta was discarded.
    Reversed,
}

/// Bank account aggregate root.
///
/// Holds the committed balance plus the staging area for at most one
/// in-flight transaction. State is a pure fold of the account's events;
/// `balance + pending_delta` never goes negative because withdrawals are
/// guarded at staging time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BankAccount {
    /// The account's own number, set on creation.
    account_number: Option<AccountNumber>,

    /// Customer who owns the account.
    customer_number: Option<CustomerNumber>,

    /// Current lifecycle state.
    status: AccountStatus,

    /// Committed balance.
    balance: Amount,

    /// Signed sum of currently-staged deltas.
    pending_delta: Decimal,

    /// The staged transaction, if any.
    current_transaction: Option<(TransactionId, StagedOperation)>,

    /// Outcomes of finished transactions, for idempotent re-acks.
    finished: HashMap<TransactionId, TransactionOutcome>,
}

impl Aggregate for BankAccount {
    type Event = AccountEvent;
    type Error = RejectionReason;

    fn aggregate_type() -> &'static str {
        "BankAccount"
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            AccountEvent::BankAccountCreated(data) => {
                self.customer_number = Some(data.customer_number);
                self.account_number = Some(data.account_number);
                self.status = AccountStatus::Active;
            }
            AccountEvent::TransactionStarted(data) => {
                self.pending_delta = data.inner.signed_delta();
                self.current_transaction = Some((data.tx_id, data.inner));
                self.status = AccountStatus::InTransaction;
            }
            AccountEvent::TransactionCleared(data) => {
                // the staging guard keeps this sum non-negative
                if let Ok(balance) = Amount::new(self.balance.value() + self.pending_delta) {
                    self.balance = balance;
                }
                self.pending_delta = Decimal::ZERO;
                self.current_transaction = None;
                self.status = AccountStatus::Active;
                self.finished.insert(data.tx_id, TransactionOutcome::Cleared);
            }
            AccountEvent::TransactionReversed(data) => {
                self.pending_delta = Decimal::ZERO;
                self.current_transaction = None;
                self.status = AccountStatus::Active;
                self.finished
                    .insert(data.tx_id, TransactionOutcome::Reversed);
            }
        }
    }
}

// Query methods
impl BankAccount {
    /// Returns the current lifecycle state.
    pub fn status(&self) -> AccountStatus {
        self.status
    }

    /// Returns the committed balance.
    pub fn balance(&self) -> Amount {
        self.balance
    }

    /// Returns the signed sum of staged deltas.
    pub fn pending_delta(&self) -> Decimal {
        self.pending_delta
    }

    /// Returns the account number, if created.
    pub fn account_number(&self) -> Option<&AccountNumber> {
        self.account_number.as_ref()
    }

    /// Returns the id of the staged transaction, if any.
    pub fn current_transaction_id(&self) -> Option<&TransactionId> {
        self.current_transaction.as_ref().map(|(tx_id, _)| tx_id)
    }

    /// Returns true if the given transaction is the one currently staged.
    pub fn is_current(&self, tx_id: &TransactionId) -> bool {
        self.current_transaction_id() == Some(tx_id)
    }

    /// Returns the recorded outcome of a finished transaction.
    pub fn outcome_of(&self, tx_id: &TransactionId) -> Option<TransactionOutcome> {
        self.finished.get(tx_id).copied()
    }

    /// Returns a snapshot of the externally-visible state.
    pub fn summary(&self) -> BankAccountSummary {
        BankAccountSummary {
            status: self.status,
            balance: self.balance,
            pending_balance: self.pending_delta,
            current_transaction_id: self.current_transaction_id().cloned(),
        }
    }
}

// Decision methods (return events)
impl BankAccount {
    /// Opens the account. Returns `None` when it already exists
    /// (the duplicate is acknowledged as a no-op).
    pub fn create(
        &self,
        customer_number: CustomerNumber,
        account_number: AccountNumber,
    ) -> Option<AccountEvent> {
        if self.status.is_uninitialized() {
            Some(AccountEvent::created(customer_number, account_number))
        } else {
            None
        }
    }

    /// Stages a delta for a new transaction.
    ///
    /// Only valid from `Active`; withdrawals are rejected when they would
    /// overdraw the committed balance.
    pub fn stage(
        &self,
        tx_id: &TransactionId,
        staged: StagedOperation,
    ) -> Result<AccountEvent, RejectionReason> {
        if let StagedOperation::FundsWithdrawn(data) = &staged
            && self.balance < data.amount
        {
            return Err(RejectionReason::InsufficientFunds);
        }
        Ok(AccountEvent::transaction_started(tx_id.clone(), staged))
    }

    /// Commits the staged transaction, if one exists.
    pub fn clear_current(&self) -> Option<AccountEvent> {
        self.current_transaction
            .as_ref()
            .map(|(tx_id, inner)| AccountEvent::transaction_cleared(tx_id.clone(), inner.clone()))
    }

    /// Discards the staged transaction, if one exists.
    pub fn reverse_current(&self) -> Option<AccountEvent> {
        self.current_transaction
            .as_ref()
            .map(|(tx_id, inner)| AccountEvent::transaction_reversed(tx_id.clone(), inner.clone()))
    }
}

/// Externally-visible account state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccountSummary {
    pub status: AccountStatus,
    pub balance: Amount,
    pub pending_balance: Decimal,
    pub current_transaction_id: Option<TransactionId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    fn created_account() -> BankAccount {
        let mut account = BankAccount::default();
        account.apply(AccountEvent::created(
            CustomerNumber::new("cust"),
            AccountNumber::new("A1"),
        ));
        account
    }

    #[test]
    fn test_create() {
        let account = created_account();
        assert_eq!(account.status(), AccountStatus::Active);
        assert_eq!(account.balance(), Amount::ZERO);
        assert_eq!(account.pending_delta(), Decimal::ZERO);
        assert_eq!(account.account_number(), Some(&AccountNumber::new("A1")));
    }

    #[test]
    fn test_create_is_idempotent() {
        let account = created_account();
        assert!(
            account
                .create(CustomerNumber::new("other"), AccountNumber::new("A1"))
                .is_none()
        );
    }

    #[test]
    fn test_deposit_stages_and_holds() {
        let mut account = created_account();
        let staged = StagedOperation::deposited(AccountNumber::new("A1"), amount(dec!(10)));
        let event = account
            .stage(&TransactionId::new("t1"), staged)
            .unwrap();
        account.apply(event);

        assert_eq!(account.status(), AccountStatus::InTransaction);
        assert_eq!(account.balance(), Amount::ZERO);
        assert_eq!(account.pending_delta(), dec!(10));
        assert!(account.is_current(&TransactionId::new("t1")));
    }

    #[test]
    fn test_clear_applies_delta_to_balance() {
        let mut account = created_account();
        let staged = StagedOperation::deposited(AccountNumber::new("A1"), amount(dec!(10)));
        account.apply(AccountEvent::transaction_started(
            TransactionId::new("t1"),
            staged,
        ));
        account.apply(account.clear_current().unwrap());

        assert_eq!(account.status(), AccountStatus::Active);
        assert_eq!(account.balance(), amount(dec!(10)));
        assert_eq!(account.pending_delta(), Decimal::ZERO);
        assert_eq!(
            account.outcome_of(&TransactionId::new("t1")),
            Some(TransactionOutcome::Cleared)
        );
    }

    #[test]
    fn test_reverse_discards_delta() {
        let mut account = created_account();
        account.apply(AccountEvent::transaction_started(
            TransactionId::new("t1"),
            StagedOperation::deposited(AccountNumber::new("A1"), amount(dec!(11))),
        ));
        account.apply(account.reverse_current().unwrap());

        assert_eq!(account.status(), AccountStatus::Active);
        assert_eq!(account.balance(), Amount::ZERO);
        assert_eq!(
            account.outcome_of(&TransactionId::new("t1")),
            Some(TransactionOutcome::Reversed)
        );
    }

    #[test]
    fn test_withdrawal_requires_funds() {
        let account = created_account();
        let result = account.stage(
            &TransactionId::new("t1"),
            StagedOperation::withdrawn(AccountNumber::new("A1"), amount(dec!(1))),
        );
        assert_eq!(result, Err(RejectionReason::InsufficientFunds));
    }

    #[test]
    fn test_withdrawal_of_exact_balance_is_allowed() {
        let mut account = created_account();
        account.apply(AccountEvent::transaction_started(
            TransactionId::new("t1"),
            StagedOperation::deposited(AccountNumber::new("A1"), amount(dec!(5))),
        ));
        account.apply(account.clear_current().unwrap());

        let event = account
            .stage(
                &TransactionId::new("t2"),
                StagedOperation::withdrawn(AccountNumber::new("A1"), amount(dec!(5))),
            )
            .unwrap();
        account.apply(event);
        assert_eq!(account.pending_delta(), dec!(-5));

        account.apply(account.clear_current().unwrap());
        assert_eq!(account.balance(), Amount::ZERO);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let events = vec![
            AccountEvent::created(CustomerNumber::new("cust"), AccountNumber::new("A1")),
            AccountEvent::transaction_started(
                TransactionId::new("t1"),
                StagedOperation::deposited(AccountNumber::new("A1"), amount(dec!(10))),
            ),
            AccountEvent::transaction_cleared(
                TransactionId::new("t1"),
                StagedOperation::deposited(AccountNumber::new("A1"), amount(dec!(10))),
            ),
            AccountEvent::transaction_started(
                TransactionId::new("t2"),
                StagedOperation::withdrawn(AccountNumber::new("A1"), amount(dec!(5))),
            ),
            AccountEvent::transaction_reversed(
                TransactionId::new("t2"),
                StagedOperation::withdrawn(AccountNumber::new("A1"), amount(dec!(5))),
            ),
        ];

        let mut first = BankAccount::default();
        first.apply_events(events.clone());
        let mut second = BankAccount::default();
        second.apply_events(events);

        assert_eq!(first, second);
        assert_eq!(first.status(), AccountStatus::Active);
        assert_eq!(first.balance(), amount(dec!(10)));
        assert_eq!(first.pending_delta(), Decimal::ZERO);
        assert_eq!(first.current_transaction_id(), None);
    }

    #[test]
    fn test_summary_reflects_state() {
        let mut account = created_account();
        account.apply(AccountEvent::transaction_started(
            TransactionId::new("t1"),
            StagedOperation::deposited(AccountNumber::new("A1"), amount(dec!(10))),
        ));

        let summary = account.summary();
        assert_eq!(summary.status, AccountStatus::InTransaction);
        assert_eq!(summary.balance, Amount::ZERO);
        assert_eq!(summary.pending_balance, dec!(10));
        assert_eq!(
            summary.current_transaction_id,
            Some(TransactionId::new("t1"))
        );
    }

    #[test]
    fn test_serialization() {
        let mut account = created_account();
        account.apply(AccountEvent::transaction_started(
            TransactionId::new("t1"),
            StagedOperation::deposited(AccountNumber::new("A1"), amount(dec!(3))),
        ));

        let json = serde_json::to_string(&account).unwrap();
        let back: BankAccount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, account);
    }
}
