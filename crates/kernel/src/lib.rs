//! Host kernel: the in-memory world merchants, actors and blocks live in.
//!
//! # Invariants
//! - All state mutations flow through explicit operations on [`HostWorld`].
//! - With an affinity check installed, entity and block access is only legal
//!   from the thread that owns the location involved.

pub mod actor;
pub mod block;
pub mod error;
pub mod item;
pub mod merchant;
pub mod world;

pub use actor::{Actor, INVENTORY_SIZE, Inventory};
pub use block::BlockKind;
pub use error::HostError;
pub use item::{ItemMeta, ItemStack, PersistentData, TagValue};
pub use merchant::{DEFAULT_MAX_HEALTH, Merchant, MerchantRecipe};
pub use world::{AffinityCheck, CHUNK_SIZE, DroppedItem, HostWorld, SpawnReason, WorldEvent};
