//! Write-guard intents checked atomically before an append.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PreconditionError;
use crate::stream::{NO_STREAM, StreamVersion};

/// The caller's expectation about a stream's version at append time.
///
/// Evaluated against the stream under its exclusive lock; a mismatch aborts
/// the whole batch. The set is closed: every dispatch site matches it
/// exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "version", rename_all = "snake_case")]
pub enum ExpectedVersion {
    /// Accept any current stream version (no concurrency check).
    Any,
    /// The stream must not exist yet (first write).
    NoStream,
    /// The stream must currently hold zero facts.
    EmptyStream,
    /// The stream must be at exactly this version.
    Exact(StreamVersion),
}

impl ExpectedVersion {
    /// Check this precondition against a stream's observed state.
    ///
    /// # Arguments
    ///
    /// * `current` - The stream's current version (`NO_STREAM` if empty).
    /// * `is_empty` - Whether the stream currently holds zero facts.
    ///
    /// # Returns
    ///
    /// `true` if an append guarded by this precondition may proceed.
    ///
    /// `NoStream` and `EmptyStream` both pass exactly when the stream holds
    /// no facts, because streams are never deleted or truncated.
    pub fn is_satisfied_by(self, current: StreamVersion, is_empty: bool) -> bool {
        match self {
            Self::Any => true,
            Self::NoStream => current == NO_STREAM,
            Self::EmptyStream => is_empty,
            Self::Exact(expected) => current == expected,
        }
    }

    /// Whether the precondition can ever be satisfied.
    ///
    /// `Exact(n)` with `n < NO_STREAM` names a version no stream can have.
    pub fn is_well_formed(self) -> bool {
        match self {
            Self::Any | Self::NoStream | Self::EmptyStream => true,
            Self::Exact(expected) => expected >= NO_STREAM,
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::NoStream => f.write_str("no-stream"),
            Self::EmptyStream => f.write_str("empty-stream"),
            Self::Exact(v) => write!(f, "exact:{v}"),
        }
    }
}

/// Parses the textual form produced by [`Display`](fmt::Display):
/// `any`, `no-stream`, `empty-stream` or `exact:<n>`.
///
/// # Examples
///
/// ```
/// use chronicle_es::ExpectedVersion;
///
/// let guard: ExpectedVersion = "exact:4".parse().unwrap();
/// assert_eq!(guard, ExpectedVersion::Exact(4));
/// assert!("latest".parse::<ExpectedVersion>().is_err());
/// ```
impl FromStr for ExpectedVersion {
    type Err = PreconditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "any" => Ok(Self::Any),
            "no-stream" => Ok(Self::NoStream),
            "empty-stream" => Ok(Self::EmptyStream),
            other => {
                let raw = other
                    .strip_prefix("exact:")
                    .ok_or_else(|| PreconditionError::Malformed(other.to_owned()))?;
                let version: StreamVersion = raw
                    .parse()
                    .map_err(|_| PreconditionError::InvalidVersion(raw.to_owned()))?;
                let parsed = Self::Exact(version);
                if !parsed.is_well_formed() {
                    return Err(PreconditionError::InvalidVersion(raw.to_owned()));
                }
                Ok(parsed)
            }
        }
    }
}
