//! Persisted bank account events.

use common::{AccountNumber, Amount, CustomerNumber, TransactionId};
use event_store::DomainEvent;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Events that can occur on a bank account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AccountEvent {
    /// Account was opened.
    BankAccountCreated(BankAccountCreatedData),

    /// A transaction delta was staged and is awaiting the coordinator's
    /// decision.
    TransactionStarted(TransactionEventData),

    /// The staged delta was committed into the balance.
    TransactionCleared(TransactionEventData),

    /// The staged delta was discarded.
    TransactionReversed(TransactionEventData),
}

impl DomainEvent for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::BankAccountCreated(_) => "BankAccountCreated",
            AccountEvent::TransactionStarted(_) => "TransactionStarted",
            AccountEvent::TransactionCleared(_) => "TransactionCleared",
            AccountEvent::TransactionReversed(_) => "TransactionReversed",
        }
    }
}

/// Data for BankAccountCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccountCreatedData {
    /// Customer who owns the account.
    pub customer_number: CustomerNumber,

    /// The account's own number.
    pub account_number: AccountNumber,
}

/// Data shared by the three transaction lifecycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEventData {
    /// The transaction this delta belongs to.
    pub tx_id: TransactionId,

    /// The staged money movement.
    pub inner: StagedOperation,
}

/// A staged money movement on one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StagedOperation {
    /// Funds were staged for deposit.
    FundsDeposited(FundsMoved),

    /// Funds were staged for withdrawal.
    FundsWithdrawn(FundsMoved),
}

/// Payload of a staged movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundsMoved {
    /// The account the funds move on.
    pub account_number: AccountNumber,

    /// The absolute amount moved.
    pub amount: Amount,
}

impl StagedOperation {
    /// Creates a staged deposit.
    pub fn deposited(account_number: AccountNumber, amount: Amount) -> Self {
        StagedOperation::FundsDeposited(FundsMoved {
            account_number,
            amount,
        })
    }

    /// Creates a staged withdrawal.
    pub fn withdrawn(account_number: AccountNumber, amount: Amount) -> Self {
        StagedOperation::FundsWithdrawn(FundsMoved {
            account_number,
            amount,
        })
    }

    /// Returns the account the funds move on.
    pub fn account_number(&self) -> &AccountNumber {
        match self {
            StagedOperation::FundsDeposited(data) | StagedOperation::FundsWithdrawn(data) => {
                &data.account_number
            }
        }
    }

    /// Returns the absolute amount moved.
    pub fn amount(&self) -> Amount {
        match self {
            StagedOperation::FundsDeposited(data) | StagedOperation::FundsWithdrawn(data) => {
                data.amount
            }
        }
    }

    /// Returns the signed balance delta of this movement.
    pub fn signed_delta(&self) -> Decimal {
        match self {
            StagedOperation::FundsDeposited(data) => data.amount.value(),
            StagedOperation::FundsWithdrawn(data) => -data.amount.value(),
        }
    }
}

// Convenience constructors
impl AccountEvent {
    /// Creates a BankAccountCreated event.
    pub fn created(customer_number: CustomerNumber, account_number: AccountNumber) -> Self {
        AccountEvent::BankAccountCreated(BankAccountCreatedData {
            customer_number,
            account_number,
        })
    }

    /// Creates a TransactionStarted event.
    pub fn transaction_started(tx_id: TransactionId, inner: StagedOperation) -> Self {
        AccountEvent::TransactionStarted(TransactionEventData { tx_id, inner })
    }

    /// Creates a TransactionCleared event.
    pub fn transaction_cleared(tx_id: TransactionId, inner: StagedOperation) -> Self {
        AccountEvent::TransactionCleared(TransactionEventData { tx_id, inner })
    }

    /// Creates a TransactionReversed event.
    pub fn transaction_reversed(tx_id: TransactionId, inner: StagedOperation) -> Self {
        AccountEvent::TransactionReversed(TransactionEventData { tx_id, inner })
    }
}
