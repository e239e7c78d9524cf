use serde::{Deserialize, Serialize};
use std::fmt;

/// Block types the host distinguishes. Anything else is carried by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlockKind {
    #[default]
    Air,
    Stone,
    GrassBlock,
    Dirt,
    Sand,
    Water,
    Lava,
    BubbleColumn,
    Cauldron,
    WaterCauldron,
    LavaCauldron,
    PowderSnowCauldron,
    Other(String),
}

impl BlockKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Air => "air",
            Self::Stone => "stone",
            Self::GrassBlock => "grass_block",
            Self::Dirt => "dirt",
            Self::Sand => "sand",
            Self::Water => "water",
            Self::Lava => "lava",
            Self::BubbleColumn => "bubble_column",
            Self::Cauldron => "cauldron",
            Self::WaterCauldron => "water_cauldron",
            Self::LavaCauldron => "lava_cauldron",
            Self::PowderSnowCauldron => "powder_snow_cauldron",
            Self::Other(name) => name,
        }
    }

    /// Blocks the host reports as liquid.
    pub fn is_liquid(&self) -> bool {
        matches!(self, Self::Water | Self::Lava | Self::BubbleColumn)
    }

    /// Blocks that hold a fluid without being one.
    pub fn is_fluid_container(&self) -> bool {
        matches!(
            self,
            Self::WaterCauldron | Self::LavaCauldron | Self::PowderSnowCauldron
        )
    }

    pub fn is_air(&self) -> bool {
        matches!(self, Self::Air)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
