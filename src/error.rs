//! Crate-level error types for appends, precondition parsing and command execution.

use crate::precondition::ExpectedVersion;
use crate::stream::{StreamId, StreamVersion};

/// Error returned by an [`EventStore`](crate::EventStore) operation.
///
/// A failed version check is *not* an error: it is reported through
/// [`AppendOutcome::ConcurrentModification`](crate::AppendOutcome).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A precondition that no stream could ever satisfy reached the store.
    ///
    /// Raised instead of degrading to [`ExpectedVersion::Any`], which would
    /// silently disable the concurrency check.
    #[error("malformed precondition {expected} for stream '{stream_id}'")]
    MalformedPrecondition {
        /// Stream the append targeted.
        stream_id: StreamId,
        /// The offending precondition.
        expected: ExpectedVersion,
    },
}

/// Error returned when parsing an [`ExpectedVersion`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    /// The text names no known precondition kind.
    #[error("unrecognized precondition: '{0}'")]
    Malformed(String),

    /// `exact:<n>` carried something other than a version `>= -1`.
    #[error("invalid expected version: '{0}'")]
    InvalidVersion(String),
}

/// Error returned when executing a command through the
/// [`CommandEngine`](crate::CommandEngine) fails.
///
/// Generic over `D`, the domain-specific rejection produced by the decision
/// function (e.g. "player is dead").
///
/// # Type Parameters
///
/// * `D` - Domain error type, must implement `Error + Send + Sync + 'static`
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError<D: std::error::Error + Send + Sync + 'static> {
    /// Command rejected by the decision function.
    ///
    /// Deterministic given the observed state, so it is never retried.
    #[error(transparent)]
    Domain(D),

    /// Optimistic concurrency retries exhausted.
    ///
    /// Every attempt lost the race to a concurrent writer. The request was
    /// valid; the caller may retry later.
    #[error(
        "optimistic concurrency conflict on '{stream_id}': \
         retries exhausted after {attempts} attempts (last seen version {last_seen_version})"
    )]
    Conflict {
        /// Stream the command targeted.
        stream_id: StreamId,
        /// Number of attempts made.
        attempts: u32,
        /// Stream version reported by the final conflict.
        last_seen_version: StreamVersion,
    },

    /// The store refused the append outright.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl<D: std::error::Error + Send + Sync + 'static> ExecuteError<D> {
    /// `true` if the command itself was invalid for the observed state.
    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Domain(_))
    }

    /// `true` if the command could not be durably committed (contention or
    /// store failure), independent of its validity.
    pub fn is_infrastructure(&self) -> bool {
        match self {
            Self::Domain(_) => false,
            Self::Conflict { .. } | Self::Store(_) => true,
        }
    }

    /// Returns the domain rejection, if that is what this error is.
    pub fn into_domain(self) -> Option<D> {
        match self {
            Self::Domain(d) => Some(d),
            Self::Conflict { .. } | Self::Store(_) => None,
        }
    }
}
