//! Example domain: a player character recorded as a fact stream.
//!
//! Shows the shape collaborators give their own entities (NPCs, locations):
//! a closed event enum carrying caller-supplied timestamps, a closed command
//! enum, and an aggregate whose `handle` validates against folded state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::event::DomainEvent;

/// Projected state of a player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Whether the player has been created (guards double-create).
    pub created: bool,
    /// Display name.
    pub name: String,
    /// Current location key.
    pub location: String,
    /// Current hit points.
    pub hp: u32,
    /// Hit point ceiling.
    pub max_hp: u32,
    /// Items picked up, in order.
    pub inventory: Vec<String>,
}

impl Player {
    /// A created player with hit points left.
    pub fn is_alive(&self) -> bool {
        self.created && self.hp > 0
    }

    /// Guard for every command other than `Create`.
    fn ensure_alive(&self) -> Result<(), PlayerError> {
        if !self.created {
            return Err(PlayerError::NotFound);
        }
        if self.hp == 0 {
            return Err(PlayerError::Dead);
        }
        Ok(())
    }
}

/// Commands accepted by the [`Player`] aggregate.
///
/// Each command carries the time it happens at; the engine never reads a
/// clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PlayerCommand {
    /// Bring a new player into the world.
    Create {
        name: String,
        location: String,
        max_hp: u32,
        at: DateTime<Utc>,
    },
    /// Walk to another location.
    Move { to: String, at: DateTime<Utc> },
    /// Lose hit points.
    TakeDamage { amount: u32, at: DateTime<Utc> },
    /// Regain hit points, up to the maximum.
    Heal { amount: u32, at: DateTime<Utc> },
    /// Add an item to the inventory.
    PickUp { item: String, at: DateTime<Utc> },
}

/// Facts recorded on a player stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PlayerEvent {
    Created {
        name: String,
        location: String,
        max_hp: u32,
        at: DateTime<Utc>,
    },
    Moved {
        from: String,
        to: String,
        at: DateTime<Utc>,
    },
    Damaged {
        amount: u32,
        at: DateTime<Utc>,
    },
    Healed {
        amount: u32,
        at: DateTime<Utc>,
    },
    ItemAcquired {
        item: String,
        at: DateTime<Utc>,
    },
}

impl DomainEvent for PlayerEvent {
    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::Created { at, .. }
            | Self::Moved { at, .. }
            | Self::Damaged { at, .. }
            | Self::Healed { at, .. }
            | Self::ItemAcquired { at, .. } => *at,
        }
    }
}

/// Reasons a [`PlayerCommand`] is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayerError {
    #[error("player already exists")]
    AlreadyExists,
    #[error("player does not exist")]
    NotFound,
    #[error("player name must not be empty")]
    EmptyName,
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("player is already at '{0}'")]
    AlreadyThere(String),
    #[error("player is dead")]
    Dead,
}

impl Aggregate for Player {
    const AGGREGATE_TYPE: &'static str = "player";

    type Command = PlayerCommand;
    type DomainEvent = PlayerEvent;
    type Error = PlayerError;

    fn handle(&self, cmd: &PlayerCommand) -> Result<Vec<PlayerEvent>, PlayerError> {
        match cmd {
            PlayerCommand::Create {
                name,
                location,
                max_hp,
                at,
            } => {
                if self.created {
                    return Err(PlayerError::AlreadyExists);
                }
                if name.trim().is_empty() {
                    return Err(PlayerError::EmptyName);
                }
                if *max_hp == 0 {
                    return Err(PlayerError::InvalidAmount);
                }
                Ok(vec![PlayerEvent::Created {
                    name: name.clone(),
                    location: location.clone(),
                    max_hp: *max_hp,
                    at: *at,
                }])
            }
            PlayerCommand::Move { to, at } => {
                self.ensure_alive()?;
                if *to == self.location {
                    return Err(PlayerError::AlreadyThere(to.clone()));
                }
                Ok(vec![PlayerEvent::Moved {
                    from: self.location.clone(),
                    to: to.clone(),
                    at: *at,
                }])
            }
            PlayerCommand::TakeDamage { amount, at } => {
                self.ensure_alive()?;
                if *amount == 0 {
                    return Err(PlayerError::InvalidAmount);
                }
                Ok(vec![PlayerEvent::Damaged {
                    amount: (*amount).min(self.hp),
                    at: *at,
                }])
            }
            PlayerCommand::Heal { amount, at } => {
                self.ensure_alive()?;
                if *amount == 0 {
                    return Err(PlayerError::InvalidAmount);
                }
                let missing = self.max_hp.saturating_sub(self.hp);
                if missing == 0 {
                    return Ok(Vec::new());
                }
                Ok(vec![PlayerEvent::Healed {
                    amount: (*amount).min(missing),
                    at: *at,
                }])
            }
            PlayerCommand::PickUp { item, at } => {
                self.ensure_alive()?;
                Ok(vec![PlayerEvent::ItemAcquired {
                    item: item.clone(),
                    at: *at,
                }])
            }
        }
    }

    fn apply(mut self, event: &PlayerEvent) -> Self {
        match event {
            PlayerEvent::Created {
                name,
                location,
                max_hp,
                ..
            } => {
                self.created = true;
                self.name = name.clone();
                self.location = location.clone();
                self.hp = *max_hp;
                self.max_hp = *max_hp;
            }
            PlayerEvent::Moved { to, .. } => self.location = to.clone(),
            PlayerEvent::Damaged { amount, .. } => self.hp = self.hp.saturating_sub(*amount),
            PlayerEvent::Healed { amount, .. } => {
                self.hp = self.hp.saturating_add(*amount).min(self.max_hp);
            }
            PlayerEvent::ItemAcquired { item, .. } => self.inventory.push(item.clone()),
        }
        self
    }
}
