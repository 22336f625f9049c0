//! Cross-cutting command metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::FactMetadata;

/// Cross-cutting metadata passed alongside a command.
///
/// Carries audit trail and correlation information without polluting the
/// domain event types. Fields are copied onto every [`StoredFact`](crate::StoredFact)
/// the command produces.
///
/// # Examples
///
/// ```
/// use chronicle_es::CommandContext;
/// use serde_json::json;
///
/// let ctx = CommandContext::default()
///     .with_actor("gm-7")
///     .with_correlation_id("turn-42")
///     .with_metadata(json!({"source": "api"}));
///
/// assert_eq!(ctx.actor.as_deref(), Some("gm-7"));
/// assert_eq!(ctx.correlation_id.as_deref(), Some("turn-42"));
/// assert!(ctx.metadata.is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandContext {
    /// Identity of whoever issued the command (a player, an NPC brain, a
    /// game master tool).
    pub actor: Option<String>,
    /// Correlation ID for tracing one request across several streams.
    pub correlation_id: Option<String>,
    /// Arbitrary metadata forwarded to [`FactMetadata::extra`].
    pub metadata: Option<Value>,
}

impl CommandContext {
    /// Set the actor identity.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Set the correlation ID.
    ///
    /// # Arguments
    ///
    /// * `id` - Any value convertible to `String` used to correlate this
    ///   command with writes to other streams.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set arbitrary metadata.
    pub fn with_metadata(mut self, meta: Value) -> Self {
        self.metadata = Some(meta);
        self
    }

    /// Build the metadata stamped on each fact written for this command.
    pub(crate) fn fact_metadata(&self) -> FactMetadata {
        FactMetadata {
            actor: self.actor.clone(),
            correlation_id: self.correlation_id.clone(),
            extra: self.metadata.clone(),
        }
    }
}
