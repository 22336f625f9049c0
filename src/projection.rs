//! State reconstruction by folding stored facts through a transition function.
//!
//! The same pure fold serves both current-state queries (the full stream)
//! and time-travel queries (the facts at or before an instant). Each step
//! produces a new state value, so nothing shared is ever half-updated.

use chrono::{DateTime, Utc};

use crate::aggregate::Aggregate;
use crate::event::{DomainEvent, StoredFact};
use crate::store::EventStore;
use crate::stream::{NO_STREAM, StreamId, StreamVersion};

/// A state value together with the position it was built up to.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<S> {
    /// The projected state.
    pub state: S,
    /// Version of the last fact folded into `state` ([`NO_STREAM`] if none).
    ///
    /// For a full-stream projection this is the stream's version at read
    /// time and is what an optimistic writer should pass as `Exact(_)`.
    pub stream_version: StreamVersion,
}

impl<S> Snapshot<S> {
    /// Consumes the snapshot and returns the state.
    pub fn into_state(self) -> S {
        self.state
    }
}

/// Left-fold `facts` into `initial` using `transition`.
///
/// `transition` must be deterministic (no clocks, randomness or I/O) and
/// should return the state unchanged for event variants it does not know.
/// Projecting an empty slice returns `initial` untouched.
///
/// # Examples
///
/// ```
/// use chronicle_es::project;
/// use chronicle_es::world::PlayerEvent;
///
/// let total = project(0u32, &[], |n, _: &PlayerEvent| n + 1);
/// assert_eq!(total, 0);
/// ```
pub fn project<S, E, F>(initial: S, facts: &[StoredFact<E>], mut transition: F) -> S
where
    F: FnMut(S, &E) -> S,
{
    facts
        .iter()
        .fold(initial, |state, fact| transition(state, &fact.event))
}

/// Fold a fact slice and record the version of the last fact folded.
fn snapshot_of<S, E, F>(initial: S, facts: &[StoredFact<E>], transition: F) -> Snapshot<S>
where
    F: FnMut(S, &E) -> S,
{
    Snapshot {
        stream_version: facts.last().map_or(NO_STREAM, |f| f.stream_version),
        state: project(initial, facts, transition),
    }
}

/// Project a stream's full history into its current state.
///
/// # Arguments
///
/// * `store` - Store to read from.
/// * `stream_id` - Stream to project.
/// * `initial` - State before any fact.
/// * `transition` - Pure `(state, event) -> state` step.
pub fn project_stream<E, S, St, F>(
    store: &St,
    stream_id: &StreamId,
    initial: S,
    transition: F,
) -> Snapshot<S>
where
    E: DomainEvent,
    St: EventStore<E> + ?Sized,
    F: FnMut(S, &E) -> S,
{
    snapshot_of(initial, &store.read_stream(stream_id), transition)
}

/// Project the facts of a stream that occurred at or before `instant`.
///
/// Uses the same transition as [`project_stream`]; only the input slice
/// differs. Stored facts are never modified.
pub fn project_stream_until<E, S, St, F>(
    store: &St,
    stream_id: &StreamId,
    instant: DateTime<Utc>,
    initial: S,
    transition: F,
) -> Snapshot<S>
where
    E: DomainEvent,
    St: EventStore<E> + ?Sized,
    F: FnMut(S, &E) -> S,
{
    snapshot_of(initial, &store.read_stream_until(stream_id, instant), transition)
}

/// Current state of an aggregate instance's stream.
pub fn load_aggregate<A, St>(store: &St, stream_id: &StreamId) -> Snapshot<A>
where
    A: Aggregate,
    St: EventStore<A::DomainEvent> + ?Sized,
{
    project_stream(store, stream_id, A::default(), A::apply)
}

/// State of an aggregate instance's stream as of `instant`.
pub fn load_aggregate_at<A, St>(
    store: &St,
    stream_id: &StreamId,
    instant: DateTime<Utc>,
) -> Snapshot<A>
where
    A: Aggregate,
    St: EventStore<A::DomainEvent> + ?Sized,
{
    project_stream_until(store, stream_id, instant, A::default(), A::apply)
}
