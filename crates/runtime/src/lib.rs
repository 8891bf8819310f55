//! Addressable entity runtime.
//!
//! An entity is an independently addressable stateful unit identified by an
//! id. It owns its journal key, processes one command at a time from its
//! mailbox, and is recovered from the journal on activation. Different
//! entities run concurrently; all cross-entity interaction is message
//! passing through a [`Router`].

pub mod clock;
pub mod entity;
pub mod error;
pub mod router;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{Entity, Journal};
pub use error::RuntimeError;
pub use router::{Recipient, Router};
