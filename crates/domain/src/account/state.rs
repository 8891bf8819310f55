//! Account state machine.

use serde::{Deserialize, Serialize};

/// The state of a bank account in its lifecycle.
///
/// State transitions:
/// ```text
/// Uninitialized ──► Active ◄──────────┐
///                     │               │
///                     └──► InTransaction (commit / rollback)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AccountStatus {
    /// No `BankAccountCreated` event has been applied yet.
    #[default]
    Uninitialized,

    /// Account is open and can stage a new transaction.
    Active,

    /// Exactly one transaction is staged and awaiting the coordinator's
    /// decision.
    InTransaction,
}

impl AccountStatus {
    /// Returns true if the account has not been created.
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, AccountStatus::Uninitialized)
    }

    /// Returns true if the account can stage a transaction.
    pub fn is_active(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }

    /// Returns true if a transaction is currently staged.
    pub fn is_in_transaction(&self) -> bool {
        matches!(self, AccountStatus::InTransaction)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Uninitialized => "Uninitialized",
            AccountStatus::Active => "Active",
            AccountStatus::InTransaction => "InTransaction",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
