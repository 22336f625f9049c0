//! Stream identity and version numbering.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a fact within its stream.
///
/// The first fact of a stream has version `0`. A stream with no facts
/// reports [`NO_STREAM`].
pub type StreamVersion = i64;

/// Version sentinel for a stream that holds no facts yet.
pub const NO_STREAM: StreamVersion = -1;

/// Opaque key naming one entity's fact sequence.
///
/// By convention the key has the form `<entity-kind>-<entity-id>`
/// (e.g. `"player-p1"`), see [`StreamId::for_entity`]. Uniqueness is a
/// naming convention only; two equal keys always denote the same stream.
///
/// # Examples
///
/// ```
/// use chronicle_es::StreamId;
///
/// let id = StreamId::for_entity("player", "p1");
/// assert_eq!(id.as_str(), "player-p1");
/// assert_eq!(id, StreamId::from("player-p1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Wrap an arbitrary key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build the conventional `<entity-kind>-<entity-id>` key.
    ///
    /// # Arguments
    ///
    /// * `kind` - Entity kind (e.g. `"player"`, `"npc"`, `"location"`).
    /// * `id` - Entity identifier within that kind.
    pub fn for_entity(kind: &str, id: &str) -> Self {
        Self(format!("{kind}-{id}"))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identifier and returns the underlying key.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}

impl From<String> for StreamId {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Lets `HashMap<StreamId, _>` be queried with a plain `&str`.
impl Borrow<str> for StreamId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
