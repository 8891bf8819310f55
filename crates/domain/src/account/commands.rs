//! Account commands and coordinator acknowledgements.

use common::{AccountNumber, Amount, CustomerNumber, TransactionId};
use runtime::Recipient;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use super::aggregate::BankAccountSummary;
use super::events::StagedOperation;

/// Reasons an account refuses to stage a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum RejectionReason {
    /// The staged withdrawal would overdraw the account.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// No `CreateBankAccount` has been processed for this account.
    #[error("account not initialized")]
    AccountNotInitialized,

    /// The stash is full; the sender should treat this as a rejection.
    #[error("account busy")]
    Busy,
}

/// Acknowledgements sent to the coordinator reference carried by the
/// command envelope.
#[derive(Debug, Clone)]
pub enum ParticipantAck {
    /// The delta is durably staged.
    Ready {
        account_number: AccountNumber,
        tx_id: TransactionId,
    },

    /// The account refused to stage.
    Rejected {
        account_number: AccountNumber,
        tx_id: TransactionId,
        reason: RejectionReason,
    },

    /// The staged delta was committed into the balance.
    Cleared {
        account_number: AccountNumber,
        tx_id: TransactionId,
    },

    /// The staged delta was discarded.
    Reversed {
        account_number: AccountNumber,
        tx_id: TransactionId,
    },

    /// A commit/rollback referenced a transaction this account never
    /// staged.
    UnknownTransaction {
        account_number: AccountNumber,
        tx_id: TransactionId,
    },
}

impl ParticipantAck {
    /// Returns the acknowledging account.
    pub fn account_number(&self) -> &AccountNumber {
        match self {
            ParticipantAck::Ready { account_number, .. }
            | ParticipantAck::Rejected { account_number, .. }
            | ParticipantAck::Cleared { account_number, .. }
            | ParticipantAck::Reversed { account_number, .. }
            | ParticipantAck::UnknownTransaction { account_number, .. } => account_number,
        }
    }

    /// Returns the transaction being acknowledged.
    pub fn tx_id(&self) -> &TransactionId {
        match self {
            ParticipantAck::Ready { tx_id, .. }
            | ParticipantAck::Rejected { tx_id, .. }
            | ParticipantAck::Cleared { tx_id, .. }
            | ParticipantAck::Reversed { tx_id, .. }
            | ParticipantAck::UnknownTransaction { tx_id, .. } => tx_id,
        }
    }
}

/// Reference to the coordinator driving a transaction.
pub type CoordinatorRef = Recipient<ParticipantAck>;

/// A money movement requested of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Operation {
    /// Add funds to the account.
    DepositFunds(FundsRequest),

    /// Take funds from the account.
    WithdrawFunds(FundsRequest),
}

/// Payload of a requested movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundsRequest {
    /// The account the funds move on.
    pub account_number: AccountNumber,

    /// The absolute amount to move; must be positive.
    pub amount: Amount,
}

impl Operation {
    /// Creates a deposit request.
    pub fn deposit(account_number: AccountNumber, amount: Amount) -> Self {
        Operation::DepositFunds(FundsRequest {
            account_number,
            amount,
        })
    }

    /// Creates a withdrawal request.
    pub fn withdraw(account_number: AccountNumber, amount: Amount) -> Self {
        Operation::WithdrawFunds(FundsRequest {
            account_number,
            amount,
        })
    }

    /// Returns the target account.
    pub fn account_number(&self) -> &AccountNumber {
        match self {
            Operation::DepositFunds(data) | Operation::WithdrawFunds(data) => &data.account_number,
        }
    }

    /// Returns the absolute amount.
    pub fn amount(&self) -> Amount {
        match self {
            Operation::DepositFunds(data) | Operation::WithdrawFunds(data) => data.amount,
        }
    }

    /// Converts the request into its staged (persisted) form.
    pub fn staged(&self) -> StagedOperation {
        match self {
            Operation::DepositFunds(data) => {
                StagedOperation::deposited(data.account_number.clone(), data.amount)
            }
            Operation::WithdrawFunds(data) => {
                StagedOperation::withdrawn(data.account_number.clone(), data.amount)
            }
        }
    }
}

/// Commands accepted by a bank account entity.
#[derive(Debug)]
pub enum AccountCommand {
    /// Open the account (idempotent).
    Create(CreateBankAccount),

    /// Stage a transaction delta.
    Start(StartTransaction),

    /// Commit the staged delta of a transaction.
    Commit(CommitTransaction),

    /// Discard the staged delta of a transaction.
    Rollback(RollbackTransaction),

    /// Read the current state; has no effect.
    Get(GetBankAccountState),
}

/// Opens a bank account. A duplicate create is acknowledged as a no-op.
#[derive(Debug)]
pub struct CreateBankAccount {
    pub customer_number: CustomerNumber,
    pub account_number: AccountNumber,
    /// Acknowledgement path back to the external caller.
    pub reply_to: Option<oneshot::Sender<BankAccountSummary>>,
}

impl CreateBankAccount {
    /// Creates the command without an acknowledgement path.
    pub fn new(customer_number: CustomerNumber, account_number: AccountNumber) -> Self {
        Self {
            customer_number,
            account_number,
            reply_to: None,
        }
    }
}

/// Stages a delta for a transaction.
#[derive(Debug, Clone)]
pub struct StartTransaction {
    pub tx_id: TransactionId,
    pub operation: Operation,
    pub reply_to: CoordinatorRef,
}

/// Commits a previously staged transaction.
#[derive(Debug, Clone)]
pub struct CommitTransaction {
    pub tx_id: TransactionId,
    pub account_number: AccountNumber,
    pub reply_to: CoordinatorRef,
}

/// Reverses a previously staged transaction.
#[derive(Debug, Clone)]
pub struct RollbackTransaction {
    pub tx_id: TransactionId,
    pub account_number: AccountNumber,
    pub reply_to: CoordinatorRef,
}

/// Queries the account's current state snapshot.
#[derive(Debug)]
pub struct GetBankAccountState {
    pub reply_to: oneshot::Sender<BankAccountSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amount(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[test]
    fn test_operation_accessors() {
        let a1 = AccountNumber::new("A1");
        let deposit = Operation::deposit(a1.clone(), amount(dec!(10)));
        assert_eq!(deposit.account_number(), &a1);
        assert_eq!(deposit.amount(), amount(dec!(10)));

        let withdrawal = Operation::withdraw(a1.clone(), amount(dec!(3)));
        assert_eq!(withdrawal.account_number(), &a1);
    }

    #[test]
    fn test_operation_staged_form() {
        let a1 = AccountNumber::new("A1");
        assert_eq!(
            Operation::deposit(a1.clone(), amount(dec!(10))).staged(),
            StagedOperation::deposited(a1.clone(), amount(dec!(10)))
        );
        assert_eq!(
            Operation::withdraw(a1.clone(), amount(dec!(5))).staged(),
            StagedOperation::withdrawn(a1, amount(dec!(5)))
        );
    }

    #[test]
    fn test_operation_wire_schema() {
        let op = Operation::deposit(AccountNumber::new("A1"), amount(dec!(1)));
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "DepositFunds",
                "data": {"accountNumber": "A1", "amount": "1"}
            })
        );
    }

    #[test]
    fn test_ack_accessors() {
        let ack = ParticipantAck::Rejected {
            account_number: AccountNumber::new("A1"),
            tx_id: TransactionId::new("t1"),
            reason: RejectionReason::InsufficientFunds,
        };
        assert_eq!(ack.account_number().as_str(), "A1");
        assert_eq!(ack.tx_id().as_str(), "t1");
    }
}
