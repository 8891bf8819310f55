//! Core aggregate trait.

use event_store::DomainEvent;

/// Trait for aggregates in an event-sourced system.
///
/// An aggregate is rebuilt by replaying events, generates events from
/// commands, and applies events to update state. `apply` must be pure and
/// deterministic: given the same state and event it always produces the
/// same new state, has no side effects, and never fails (events are facts
/// that have happened).
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate can produce when deciding.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name, used as the journal key prefix.
    fn aggregate_type() -> &'static str;

    /// Applies an event to the aggregate, updating its state.
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}
