//! Event store contract and the in-memory backend.
//!
//! [`EventStore`] is the only surface collaborators depend on: guarded batch
//! appends, full / version-windowed / time-windowed reads, and current
//! version lookup. [`InMemoryEventStore`] implements it with one
//! reader-writer lock per stream, so writers to different entities never
//! serialize behind each other.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::event::{DomainEvent, FactMetadata, StoredFact};
use crate::precondition::ExpectedVersion;
use crate::stream::{NO_STREAM, StreamId, StreamVersion};

/// Result of a guarded append.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome<E> {
    /// The precondition held and every event was stored, in input order.
    Success(Vec<StoredFact<E>>),
    /// The precondition failed; nothing was written.
    ConcurrentModification {
        /// The stream's version at the time of the check.
        actual_version: StreamVersion,
    },
}

impl<E> AppendOutcome<E> {
    /// `true` for [`AppendOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The stored facts, or `None` if the append conflicted.
    pub fn into_facts(self) -> Option<Vec<StoredFact<E>>> {
        match self {
            Self::Success(facts) => Some(facts),
            Self::ConcurrentModification { .. } => None,
        }
    }
}

/// Append-only storage of per-entity fact streams.
///
/// # Contract
///
/// - Appends are atomic per batch: either every event becomes visible with
///   contiguous versions, or none does.
/// - The precondition is checked and the batch written as one step with
///   respect to other writers of the same stream.
/// - Reads return copies in stream order and never observe a partial batch.
/// - Streams are created implicitly by their first successful append and
///   are never truncated.
pub trait EventStore<E: DomainEvent>: Send + Sync {
    /// Append `events` to a stream if `expected` holds, stamping each fact
    /// with `metadata`.
    ///
    /// # Arguments
    ///
    /// * `stream_id` - The target stream.
    /// * `expected` - Version precondition evaluated under the stream lock.
    /// * `events` - Events to store, in order. An empty batch is a no-op
    ///   that returns `Success(vec![])`.
    /// * `metadata` - Audit metadata copied onto every stored fact.
    ///
    /// # Returns
    ///
    /// [`AppendOutcome::Success`] with the stored facts, or
    /// [`AppendOutcome::ConcurrentModification`] with the version observed
    /// when the precondition failed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MalformedPrecondition`] if `expected` can never
    /// be satisfied.
    fn append_with_metadata(
        &self,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        events: Vec<E>,
        metadata: FactMetadata,
    ) -> Result<AppendOutcome<E>, StoreError>;

    /// Append `events` with empty metadata.
    ///
    /// See [`append_with_metadata`](EventStore::append_with_metadata).
    fn append_to_stream(
        &self,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        events: Vec<E>,
    ) -> Result<AppendOutcome<E>, StoreError> {
        self.append_with_metadata(stream_id, expected, events, FactMetadata::default())
    }

    /// Full history of a stream, oldest first. Empty if never written.
    fn read_stream(&self, stream_id: &StreamId) -> Vec<StoredFact<E>>;

    /// Facts whose `occurred_at` is at or before `instant`, in stream order.
    fn read_stream_until(&self, stream_id: &StreamId, instant: DateTime<Utc>)
    -> Vec<StoredFact<E>>;

    /// Facts whose `stream_version` is at least `from`, in stream order.
    fn read_stream_from_version(
        &self,
        stream_id: &StreamId,
        from: StreamVersion,
    ) -> Vec<StoredFact<E>>;

    /// Highest assigned version, or [`NO_STREAM`] if the stream is empty.
    fn stream_version(&self, stream_id: &StreamId) -> StreamVersion;
}

/// One stream's facts behind its own lock.
type StreamSlot<E> = Arc<RwLock<Vec<StoredFact<E>>>>;

/// Stream slots keyed by stream ID, created on first write.
type StreamMap<E> = HashMap<StreamId, StreamSlot<E>>;

/// In-memory [`EventStore`] with per-stream locking.
///
/// The outer map lock is held only long enough to find or create a stream's
/// slot. Writers then hold that stream's write lock across the
/// check-and-append; readers hold its read lock while cloning.
///
/// `Clone` is cheap -- all internal state is `Arc`-wrapped, and clones share
/// the same streams.
///
/// # Examples
///
/// ```
/// use chronicle_es::{EventStore, ExpectedVersion, InMemoryEventStore, StreamId, world::PlayerEvent};
/// use chrono::Utc;
///
/// let store = InMemoryEventStore::<PlayerEvent>::new();
/// let id = StreamId::from("player-p1");
/// let outcome = store
///     .append_to_stream(
///         &id,
///         ExpectedVersion::NoStream,
///         vec![PlayerEvent::Created {
///             name: "Ayla".into(),
///             location: "tavern".into(),
///             max_hp: 10,
///             at: Utc::now(),
///         }],
///     )
///     .unwrap();
/// assert!(outcome.is_success());
/// assert_eq!(store.stream_version(&id), 0);
/// ```
pub struct InMemoryEventStore<E> {
    streams: Arc<RwLock<StreamMap<E>>>,
}

impl<E> Clone for InMemoryEventStore<E> {
    fn clone(&self) -> Self {
        Self {
            streams: Arc::clone(&self.streams),
        }
    }
}

impl<E> Default for InMemoryEventStore<E> {
    fn default() -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

// Manual `Debug` so `E` need not be `Debug` and fact contents stay out of logs.
impl<E> fmt::Debug for InMemoryEventStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InMemoryEventStore")
            .field("streams", &streams.len())
            .finish()
    }
}

impl<E: DomainEvent> InMemoryEventStore<E> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the stream has at least one fact.
    pub fn stream_exists(&self, stream_id: &StreamId) -> bool {
        self.stream_version(stream_id) != NO_STREAM
    }

    /// IDs of every stream holding at least one fact, sorted.
    pub fn stream_ids(&self) -> Vec<StreamId> {
        let slots: Vec<(StreamId, StreamSlot<E>)> = {
            let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);
            streams
                .iter()
                .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
                .collect()
        };
        // A slot stays empty if the first append into it panicked.
        let mut ids: Vec<StreamId> = slots
            .into_iter()
            .filter(|(_, slot)| {
                !slot
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_empty()
            })
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    /// Look up an existing slot without creating one.
    fn existing_slot(&self, stream_id: &StreamId) -> Option<StreamSlot<E>> {
        let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);
        streams.get(stream_id).cloned()
    }

    /// Create the slot for a stream's first write.
    ///
    /// Another writer may have created it since the shared-lock lookup, in
    /// which case that slot is returned.
    fn insert_slot(&self, stream_id: &StreamId) -> StreamSlot<E> {
        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(streams.entry(stream_id.clone()).or_default())
    }

    /// Clone the facts of a stream that pass `keep`, under its read lock.
    fn read_filtered(
        &self,
        stream_id: &StreamId,
        keep: impl Fn(&StoredFact<E>) -> bool,
    ) -> Vec<StoredFact<E>> {
        let Some(slot) = self.existing_slot(stream_id) else {
            return Vec::new();
        };
        let facts = slot.read().unwrap_or_else(PoisonError::into_inner);
        facts.iter().filter(|&f| keep(f)).cloned().collect()
    }
}

impl<E: DomainEvent> EventStore<E> for InMemoryEventStore<E> {
    fn append_with_metadata(
        &self,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        events: Vec<E>,
        metadata: FactMetadata,
    ) -> Result<AppendOutcome<E>, StoreError> {
        if events.is_empty() {
            return Ok(AppendOutcome::Success(Vec::new()));
        }
        if !expected.is_well_formed() {
            return Err(StoreError::MalformedPrecondition {
                stream_id: stream_id.clone(),
                expected,
            });
        }

        // Fast path: shared lock on the map. An unknown stream only gets a
        // slot once the precondition could pass against it.
        let slot = match self.existing_slot(stream_id) {
            Some(slot) => slot,
            None if !expected.is_satisfied_by(NO_STREAM, true) => {
                return Ok(rejected(stream_id, expected, NO_STREAM));
            }
            None => self.insert_slot(stream_id),
        };

        // Held for the whole check-and-append. The vector is only touched by
        // the `extend` below, which moves already-built facts and runs no
        // user code, so a poisoned lock never guards a partial batch.
        let mut facts = slot.write().unwrap_or_else(PoisonError::into_inner);

        let current = current_version(&facts);
        if !expected.is_satisfied_by(current, facts.is_empty()) {
            return Ok(rejected(stream_id, expected, current));
        }

        let mut latest = facts.last().map(|f| f.occurred_at);
        let mut stored = Vec::with_capacity(events.len());
        for (version, event) in (current + 1..).zip(events) {
            let fact = StoredFact::new(stream_id.clone(), version, event, metadata.clone());
            if let Some(prev) = latest
                && fact.occurred_at < prev
            {
                tracing::warn!(
                    stream_id = %stream_id,
                    stream_version = version,
                    occurred_at = %fact.occurred_at,
                    previous = %prev,
                    "fact timestamp precedes the stream's latest fact"
                );
            }
            latest = Some(fact.occurred_at);
            stored.push(fact);
        }

        // `E::clone` may panic; do it before the stream is touched.
        let returned = stored.clone();
        facts.extend(stored);
        tracing::debug!(
            stream_id = %stream_id,
            count = returned.len(),
            version = current_version(&facts),
            "facts appended"
        );
        Ok(AppendOutcome::Success(returned))
    }

    fn read_stream(&self, stream_id: &StreamId) -> Vec<StoredFact<E>> {
        self.read_filtered(stream_id, |_| true)
    }

    fn read_stream_until(
        &self,
        stream_id: &StreamId,
        instant: DateTime<Utc>,
    ) -> Vec<StoredFact<E>> {
        // Filter rather than take-while: caller clocks may regress.
        self.read_filtered(stream_id, |f| f.occurred_at <= instant)
    }

    fn read_stream_from_version(
        &self,
        stream_id: &StreamId,
        from: StreamVersion,
    ) -> Vec<StoredFact<E>> {
        self.read_filtered(stream_id, |f| f.stream_version >= from)
    }

    fn stream_version(&self, stream_id: &StreamId) -> StreamVersion {
        let Some(slot) = self.existing_slot(stream_id) else {
            return NO_STREAM;
        };
        let facts = slot.read().unwrap_or_else(PoisonError::into_inner);
        current_version(&facts)
    }
}

/// Log a failed precondition and build the outcome reporting it.
fn rejected<E>(
    stream_id: &StreamId,
    expected: ExpectedVersion,
    actual_version: StreamVersion,
) -> AppendOutcome<E> {
    tracing::debug!(
        stream_id = %stream_id,
        expected = %expected,
        actual_version,
        "append rejected: version precondition failed"
    );
    AppendOutcome::ConcurrentModification { actual_version }
}

/// Version of the last fact, or [`NO_STREAM`].
fn current_version<E>(facts: &[StoredFact<E>]) -> StreamVersion {
    facts.last().map_or(NO_STREAM, |f| f.stream_version)
}
