//! Aggregate trait: a state type together with its transition and decision functions.

use crate::event::DomainEvent;
use crate::stream::StreamId;

/// A domain aggregate whose state is derived from its event history.
///
/// The implementing type itself serves as the aggregate's state.
/// State is built by folding domain events through the [`apply`](Aggregate::apply) method.
///
/// # Associated Types
///
/// - `Command`: the set of commands this aggregate can handle.
/// - `DomainEvent`: the set of events this aggregate can produce and apply.
/// - `Error`: command rejection / validation error.
///
/// # Contract
///
/// - [`handle`](Aggregate::handle) must be a pure decision function: no I/O, no side effects.
///   It validates a command against the current state and returns zero or more events.
///   It may be called more than once per command when a concurrent writer wins the
///   race, each time against freshly rebuilt state.
/// - [`apply`](Aggregate::apply) must be a pure, total function. It takes ownership of
///   the current state and a reference to a domain event, returning the next state.
///   Unknown event variants should be ignored for forward compatibility.
pub trait Aggregate: Default + Clone + Send + Sync + 'static {
    /// Identifies this aggregate type (e.g. "player"). Used as the stream key prefix.
    const AGGREGATE_TYPE: &'static str;

    /// The set of commands this aggregate can handle.
    type Command;

    /// The set of events this aggregate can produce and apply.
    type DomainEvent: DomainEvent;

    /// Command rejection / validation error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Validate a command against the current state and produce events.
    ///
    /// Returns `Ok(vec![])` if the command is a no-op.
    /// Returns `Err` to reject the command.
    fn handle(&self, cmd: &Self::Command) -> Result<Vec<Self::DomainEvent>, Self::Error>;

    /// Apply a single event to produce the next state.
    fn apply(self, event: &Self::DomainEvent) -> Self;
}

/// Stream key for one instance of `A`: `"<AGGREGATE_TYPE>-<instance_id>"`.
///
/// # Examples
///
/// ```
/// use chronicle_es::{stream_id_for, world::Player};
///
/// assert_eq!(stream_id_for::<Player>("p1").as_str(), "player-p1");
/// ```
pub fn stream_id_for<A: Aggregate>(instance_id: &str) -> StreamId {
    StreamId::for_entity(A::AGGREGATE_TYPE, instance_id)
}

/// Transition function for `A`, usable wherever the projector expects a
/// plain `fn(S, &E) -> S`.
pub fn reducer<A: Aggregate>() -> fn(A, &A::DomainEvent) -> A {
    A::apply
}
