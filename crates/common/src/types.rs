use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Wall-clock length of one host tick.
pub const TICK_DURATION: Duration = Duration::from_millis(50);

/// Convert a tick count into wall-clock time.
pub fn ticks_to_duration(ticks: u64) -> Duration {
    TICK_DURATION * ticks.min(u32::MAX as u64) as u32
}

/// Unique identifier for an entity (merchant or actor) in the host world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the hyphenated textual form.
    pub fn parse(text: &str) -> Option<Self> {
        Uuid::parse_str(text.trim()).ok().map(Self)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A precise position inside a named world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub position: DVec3,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            position: DVec3::new(x, y, z),
        }
    }

    /// The block this location lies in.
    pub fn block(&self) -> BlockPos {
        BlockPos {
            world: self.world.clone(),
            x: self.position.x.floor() as i32,
            y: self.position.y.floor() as i32,
            z: self.position.z.floor() as i32,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@({:.1}, {:.1}, {:.1})",
            self.world, self.position.x, self.position.y, self.position.z
        )
    }
}

/// Integer block coordinate inside a named world.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// The neighbouring block across `face`.
    pub fn relative(&self, face: BlockFace) -> Self {
        let (dx, dy, dz) = face.offset();
        Self {
            world: self.world.clone(),
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Horizontal centre of the block, at floor height.
    pub fn center(&self) -> Location {
        Location::new(
            self.world.clone(),
            self.x as f64 + 0.5,
            self.y as f64,
            self.z as f64 + 0.5,
        )
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@[{}, {}, {}]", self.world, self.x, self.y, self.z)
    }
}

/// The face of a block an interaction hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockFace {
    Up,
    Down,
    North,
    South,
    East,
    West,
}

impl BlockFace {
    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            Self::Up => (0, 1, 0),
            Self::Down => (0, -1, 0),
            Self::North => (0, 0, -1),
            Self::South => (0, 0, 1),
            Self::East => (1, 0, 0),
            Self::West => (-1, 0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_uniqueness() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn entity_id_parses_display_form() {
        let id = EntityId::new();
        assert_eq!(EntityId::parse(&id.to_string()), Some(id));
        assert_eq!(EntityId::parse("not-a-uuid"), None);
    }

    #[test]
    fn location_block_floors_negative_coordinates() {
        let loc = Location::new("world", -0.5, 64.9, 3.2);
        assert_eq!(loc.block(), BlockPos::new("world", -1, 64, 3));
    }

    #[test]
    fn relative_block_and_center() {
        let pos = BlockPos::new("world", 10, 64, -4);
        let above = pos.relative(BlockFace::Up);
        assert_eq!(above, BlockPos::new("world", 10, 65, -4));
        let c = above.center();
        assert_eq!(c.position, DVec3::new(10.5, 65.0, -3.5));
        assert_eq!(c.block(), above);
    }

    #[test]
    fn ticks_convert_to_wall_time() {
        assert_eq!(ticks_to_duration(20), Duration::from_secs(1));
        assert_eq!(ticks_to_duration(0), Duration::ZERO);
    }
}
