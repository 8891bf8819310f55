//! Shared value objects for the banking saga workspace.

pub mod amount;
pub mod types;

pub use amount::{Amount, AmountError};
pub use types::{AccountNumber, CustomerNumber, TransactionId};
