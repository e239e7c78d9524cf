//! Merchant vessels: capture a merchant into a container item and release it
//! again, with every world access made on the thread that owns it.
//!
//! [`Coordinator`] drives both flows. The other modules are its parts:
//! configuration and messages, the container item format, cooldowns and
//! in-flight deduplication, the snapshot cache and the claim gate.
//!
//! # Invariants
//! - A flow ends in exactly one [`Outcome`]; a committed capture removes the
//!   merchant and grants one filled container, a committed release spawns
//!   exactly one merchant.
//! - A release holds its container out of the actor's inventory until it
//!   settles and returns it unless the release commits.
//! - No snapshot with missing required fields is ever applied.
//! - At most one capture per target and one release per actor and container
//!   are in flight at any time.
//! - Claim checks fail open until a claim system is ready; permission and
//!   world checks always apply.

pub mod cache;
pub mod claim;
pub mod config;
pub mod container;
pub mod cooldown;
pub mod coordinator;
pub mod error;
pub mod mapper;
pub mod messages;
pub mod outcome;

pub use cache::SnapshotCache;
pub use claim::{Capability, ClaimAction, ClaimAdapter, ClaimGate, ClaimOracle};
pub use config::{ConfigError, PermissionNames, VesselConfig};
pub use container::{ContainerId, ContainerState, ContainerStyle};
pub use cooldown::{CooldownGate, FlightGuard, FlightKey};
pub use coordinator::{
    BlockInteraction, Callback, Coordinator, EntityInteraction, PermissionOracle,
};
pub use error::CaptureError;
pub use messages::{MessageKey, Messages};
pub use outcome::{Guidance, Outcome, Rejection, Summary};
