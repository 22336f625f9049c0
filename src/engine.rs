//! Command execution: read, project, decide, append, retry on conflict.
//!
//! Each attempt is one pass of a small state machine:
//!
//! ```text
//! read + project ──► decide ──► append Exact(v) ──► committed
//!                      │               │
//!                      ▼               ▼
//!                 domain error    conflict ──► next attempt (fresh read)
//! ```
//!
//! The decision function always runs outside every lock; only the store's
//! check-and-append is serialized per stream.

use chrono::{DateTime, Utc};

use crate::aggregate::Aggregate;
use crate::command::CommandContext;
use crate::error::ExecuteError;
use crate::event::{DomainEvent, StoredFact};
use crate::precondition::ExpectedVersion;
use crate::projection::{Snapshot, load_aggregate, load_aggregate_at, project_stream};
use crate::store::{AppendOutcome, EventStore};
use crate::stream::{NO_STREAM, StreamId, StreamVersion};

/// Default number of attempts before a command fails with
/// [`ExecuteError::Conflict`].
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Settings for a [`CommandEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Total attempts per command, including the first. Always at least 1.
    pub max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// A command that was durably recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<E> {
    /// Facts appended by the command. Empty if the decision produced no events.
    pub facts: Vec<StoredFact<E>>,
    /// Stream version after the command.
    pub stream_version: StreamVersion,
    /// Attempts used, counting the successful one.
    pub attempts: u32,
}

impl<E> Committed<E> {
    /// The domain events that were appended, in order.
    pub fn events(&self) -> impl Iterator<Item = &E> {
        self.facts.iter().map(|f| &f.event)
    }
}

/// Result of a single pass through the attempt loop.
enum Attempt<E, D> {
    Committed {
        facts: Vec<StoredFact<E>>,
        stream_version: StreamVersion,
    },
    Rejected(D),
    Conflict {
        actual_version: StreamVersion,
    },
}

/// Runs business decisions against the current state of a stream and
/// records their effects, retrying transparently when another writer wins
/// the race.
///
/// Generic over the store backend so a persistent implementation can be
/// swapped in behind the same [`EventStore`] contract.
///
/// # Examples
///
/// ```
/// use chronicle_es::{CommandContext, CommandEngine, InMemoryEventStore, stream_id_for};
/// use chronicle_es::world::{Player, PlayerCommand, PlayerEvent};
/// use chrono::Utc;
///
/// let engine = CommandEngine::builder(InMemoryEventStore::<PlayerEvent>::new())
///     .max_attempts(5)
///     .build();
/// let id = stream_id_for::<Player>("p1");
///
/// let committed = engine
///     .execute_aggregate::<Player>(
///         &id,
///         &PlayerCommand::Create {
///             name: "Ayla".into(),
///             location: "tavern".into(),
///             max_hp: 12,
///             at: Utc::now(),
///         },
///         &CommandContext::default().with_actor("p1"),
///     )
///     .unwrap();
/// assert_eq!(committed.stream_version, 0);
/// assert_eq!(engine.state::<Player>(&id).state.hp, 12);
/// ```
#[derive(Debug, Clone)]
pub struct CommandEngine<St> {
    store: St,
    config: EngineConfig,
}

impl<St> CommandEngine<St> {
    /// Create an engine with the default configuration.
    pub fn new(store: St) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
        }
    }

    /// Start configuring an engine over `store`.
    pub fn builder(store: St) -> CommandEngineBuilder<St> {
        CommandEngineBuilder {
            store,
            config: EngineConfig::default(),
        }
    }

    /// The store this engine writes to.
    pub fn store(&self) -> &St {
        &self.store
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute one decision against a stream.
    ///
    /// # Arguments
    ///
    /// * `stream_id` - The stream the decision is about.
    /// * `initial` - State before any fact; cloned for every attempt.
    /// * `transition` - Pure `(state, event) -> state` step used to project.
    /// * `decide` - Business decision over the projected state. May run more
    ///   than once, each time against freshly read state.
    /// * `ctx` - Metadata stamped onto every appended fact.
    ///
    /// # Returns
    ///
    /// The appended facts, the resulting stream version and the number of
    /// attempts used.
    ///
    /// # Errors
    ///
    /// * [`ExecuteError::Domain`] -- `decide` rejected the command. Returned
    ///   immediately; nothing is appended and no retry is made.
    /// * [`ExecuteError::Conflict`] -- every attempt lost the race.
    /// * [`ExecuteError::Store`] -- the store refused the append.
    pub fn execute<E, S, D, T, F>(
        &self,
        stream_id: &StreamId,
        initial: S,
        mut transition: T,
        mut decide: F,
        ctx: &CommandContext,
    ) -> Result<Committed<E>, ExecuteError<D>>
    where
        E: DomainEvent,
        St: EventStore<E>,
        S: Clone,
        D: std::error::Error + Send + Sync + 'static,
        T: FnMut(S, &E) -> S,
        F: FnMut(&S) -> Result<Vec<E>, D>,
    {
        let _span = tracing::info_span!("execute", stream_id = %stream_id).entered();
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_seen_version = NO_STREAM;

        for attempt in 1..=max_attempts {
            let outcome = self.attempt(
                stream_id,
                initial.clone(),
                &mut transition,
                &mut decide,
                ctx,
            )?;
            match outcome {
                Attempt::Committed {
                    facts,
                    stream_version,
                } => {
                    return Ok(Committed {
                        facts,
                        stream_version,
                        attempts: attempt,
                    });
                }
                Attempt::Rejected(reason) => return Err(ExecuteError::Domain(reason)),
                Attempt::Conflict { actual_version } => {
                    tracing::debug!(
                        attempt,
                        actual_version,
                        "concurrent modification, re-reading stream"
                    );
                    last_seen_version = actual_version;
                }
            }
        }

        tracing::warn!(
            attempts = max_attempts,
            last_seen_version,
            "optimistic concurrency retries exhausted"
        );
        Err(ExecuteError::Conflict {
            stream_id: stream_id.clone(),
            attempts: max_attempts,
            last_seen_version,
        })
    }

    /// One pass: read and project, decide, then append under `Exact(v)`.
    fn attempt<E, S, D, T, F>(
        &self,
        stream_id: &StreamId,
        initial: S,
        transition: &mut T,
        decide: &mut F,
        ctx: &CommandContext,
    ) -> Result<Attempt<E, D>, ExecuteError<D>>
    where
        E: DomainEvent,
        St: EventStore<E>,
        D: std::error::Error + Send + Sync + 'static,
        T: FnMut(S, &E) -> S,
        F: FnMut(&S) -> Result<Vec<E>, D>,
    {
        let Snapshot {
            state,
            stream_version,
        } = project_stream(&self.store, stream_id, initial, &mut *transition);

        let events = match decide(&state) {
            Ok(events) => events,
            Err(reason) => return Ok(Attempt::Rejected(reason)),
        };
        if events.is_empty() {
            return Ok(Attempt::Committed {
                facts: Vec::new(),
                stream_version,
            });
        }

        let outcome = self.store.append_with_metadata(
            stream_id,
            ExpectedVersion::Exact(stream_version),
            events,
            ctx.fact_metadata(),
        )?;
        Ok(match outcome {
            AppendOutcome::Success(facts) => Attempt::Committed {
                stream_version: facts.last().map_or(stream_version, |f| f.stream_version),
                facts,
            },
            AppendOutcome::ConcurrentModification { actual_version } => {
                Attempt::Conflict { actual_version }
            }
        })
    }

    /// Execute an aggregate command against the instance's stream.
    ///
    /// Projects with [`Aggregate::apply`] from `A::default()` and decides with
    /// [`Aggregate::handle`].
    ///
    /// # Errors
    ///
    /// See [`execute`](CommandEngine::execute).
    pub fn execute_aggregate<A>(
        &self,
        stream_id: &StreamId,
        cmd: &A::Command,
        ctx: &CommandContext,
    ) -> Result<Committed<A::DomainEvent>, ExecuteError<A::Error>>
    where
        A: Aggregate,
        St: EventStore<A::DomainEvent>,
    {
        self.execute(
            stream_id,
            A::default(),
            A::apply,
            |state: &A| state.handle(cmd),
            ctx,
        )
    }

    /// Current state of an aggregate instance.
    pub fn state<A>(&self, stream_id: &StreamId) -> Snapshot<A>
    where
        A: Aggregate,
        St: EventStore<A::DomainEvent>,
    {
        load_aggregate(&self.store, stream_id)
    }

    /// State of an aggregate instance as of `instant`.
    pub fn state_at<A>(&self, stream_id: &StreamId, instant: DateTime<Utc>) -> Snapshot<A>
    where
        A: Aggregate,
        St: EventStore<A::DomainEvent>,
    {
        load_aggregate_at(&self.store, stream_id, instant)
    }
}

/// Builder for configuring a [`CommandEngine`].
///
/// # Examples
///
/// ```
/// use chronicle_es::{CommandEngine, InMemoryEventStore, world::PlayerEvent};
///
/// let engine = CommandEngine::builder(InMemoryEventStore::<PlayerEvent>::new())
///     .max_attempts(10)
///     .build();
/// assert_eq!(engine.config().max_attempts, 10);
/// ```
#[derive(Debug)]
pub struct CommandEngineBuilder<St> {
    store: St,
    config: EngineConfig,
}

impl<St> CommandEngineBuilder<St> {
    /// Total attempts per command, including the first.
    ///
    /// Defaults to [`DEFAULT_MAX_ATTEMPTS`]. Zero is treated as one.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts.max(1);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Finish configuration.
    pub fn build(self) -> CommandEngine<St> {
        CommandEngine {
            store: self.store,
            config: self.config,
        }
    }
}
