//! Saga coordination for atomic multi-account money movements.
//!
//! A saga drives a fixed set of deposits and withdrawals across bank
//! accounts to a single global outcome. Every participant durably stages
//! its delta and acknowledges readiness; once all are ready the saga
//! commits everywhere, and on any rejection or prepare-phase timeout it
//! rolls back every staged delta. The saga itself is event-sourced, so a
//! crashed coordinator resumes from its journal and keeps retrying until
//! all outstanding participants acknowledge.

pub mod aggregate;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod state;
pub mod system;

pub use aggregate::{OutstandingCommand, SagaSummary, TransferSaga};
pub use commands::{GetSagaState, SagaCommand, StartSaga};
pub use config::BankConfig;
pub use coordinator::SagaCoordinator;
pub use error::{SagaError, StartSagaError};
pub use events::SagaEvent;
pub use state::{SagaOutcome, SagaStatus};
pub use system::Bank;
