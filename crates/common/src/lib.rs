//! Shared primitives: entity ids, world locations, merchant kinds, tick timing and clocks.

mod clock;
mod merchant;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use merchant::{Biome, Profession, merchant_title};
pub use types::{
    BlockFace, BlockPos, EntityId, Location, TICK_DURATION, ticks_to_duration,
};
