//! Domain event contract and the stored fact envelope.
//!
//! The store never generates timestamps: every domain event supplies its own
//! occurrence time through [`DomainEvent::occurred_at`], and the store copies
//! it onto the [`StoredFact`] unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stream::{StreamId, StreamVersion};

/// An immutable record of something that happened to one entity.
///
/// Implemented by the application's event enums. Callers are a trusted time
/// source; the timestamp is used verbatim for time-travel reads.
pub trait DomainEvent: Clone + Send + Sync + 'static {
    /// When the fact occurred, as reported by the caller.
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Infrastructure metadata stamped on every stored fact.
///
/// Copied from the [`CommandContext`](crate::CommandContext) of the write
/// that produced the fact. Empty fields are omitted when serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactMetadata {
    /// Actor identity from the command context, if provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Correlation ID from the command context, if provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Free-form metadata from the command context, if provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// One domain event plus the position the store assigned it.
///
/// Within a stream, `stream_version` values are exactly `0..count`,
/// contiguous and immutable once assigned. Callers only ever hold clones;
/// the store keeps the originals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFact<E> {
    /// Store-assigned unique identifier (UUID v4).
    pub event_id: Uuid,
    /// Stream the fact belongs to.
    pub stream_id: StreamId,
    /// Zero-based position within the stream.
    pub stream_version: StreamVersion,
    /// Caller-supplied occurrence time, copied from the event.
    pub occurred_at: DateTime<Utc>,
    /// The domain event payload.
    pub event: E,
    /// Audit metadata from the producing command.
    #[serde(default)]
    pub metadata: FactMetadata,
}

impl<E: DomainEvent> StoredFact<E> {
    /// Wrap a domain event at a freshly assigned version.
    pub(crate) fn new(
        stream_id: StreamId,
        stream_version: StreamVersion,
        event: E,
        metadata: FactMetadata,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            stream_id,
            stream_version,
            occurred_at: event.occurred_at(),
            event,
            metadata,
        }
    }
}
