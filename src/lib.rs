//! Append-only per-entity event log with optimistic concurrency control.
//!
//! Each entity (player, NPC, location) owns a stream of facts. Writers
//! append under a version precondition; readers rebuild current or
//! historical state by folding facts through a pure transition function.
//! Streams lock independently, so unrelated entities never contend.

mod aggregate;
pub use aggregate::{Aggregate, reducer, stream_id_for};
mod command;
mod engine;
mod error;
mod event;
mod precondition;
mod projection;
mod store;
mod stream;
pub mod world;

pub use command::CommandContext;
pub use engine::{CommandEngine, CommandEngineBuilder, Committed, DEFAULT_MAX_ATTEMPTS, EngineConfig};
pub use error::{ExecuteError, PreconditionError, StoreError};
pub use event::{DomainEvent, FactMetadata, StoredFact};
pub use precondition::ExpectedVersion;
pub use projection::{
    Snapshot, load_aggregate, load_aggregate_at, project, project_stream, project_stream_until,
};
pub use store::{AppendOutcome, EventStore, InMemoryEventStore};
pub use stream::{NO_STREAM, StreamId, StreamVersion};
