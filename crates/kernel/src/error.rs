use thiserror::Error;
use vessel_common::{EntityId, Location};

/// Errors raised by the host when an operation is rejected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HostError {
    #[error("entity {0} does not exist or has been removed")]
    NoSuchEntity(EntityId),

    #[error("access to {0} from a thread that does not own it")]
    WrongThread(Location),

    #[error("level {0} outside 1..=5")]
    LevelOutOfRange(i64),

    #[error("experience must not be negative, got {0}")]
    NegativeExperience(i64),

    #[error("health {health} outside (0, {max}]")]
    HealthOutOfRange { health: f64, max: f64 },

    #[error("max health must be positive, got {0}")]
    InvalidMaxHealth(f64),

    #[error("recipe {index} rejected: {reason}")]
    InvalidRecipe { index: usize, reason: &'static str },

    #[error("inventory slot {0} out of range")]
    NoSuchSlot(usize),
}
