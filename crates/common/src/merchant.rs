use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade profession of a merchant. Unknown or legacy names resolve to [`Profession::None`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profession {
    #[default]
    None,
    Armorer,
    Butcher,
    Cartographer,
    Cleric,
    Farmer,
    Fisherman,
    Fletcher,
    Leatherworker,
    Librarian,
    Mason,
    Nitwit,
    Shepherd,
    Toolsmith,
    Weaponsmith,
}

impl Profession {
    pub const ALL: [Profession; 15] = [
        Self::None,
        Self::Armorer,
        Self::Butcher,
        Self::Cartographer,
        Self::Cleric,
        Self::Farmer,
        Self::Fisherman,
        Self::Fletcher,
        Self::Leatherworker,
        Self::Librarian,
        Self::Mason,
        Self::Nitwit,
        Self::Shepherd,
        Self::Toolsmith,
        Self::Weaponsmith,
    ];

    /// Stable identifier written into snapshots.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Armorer => "armorer",
            Self::Butcher => "butcher",
            Self::Cartographer => "cartographer",
            Self::Cleric => "cleric",
            Self::Farmer => "farmer",
            Self::Fisherman => "fisherman",
            Self::Fletcher => "fletcher",
            Self::Leatherworker => "leatherworker",
            Self::Librarian => "librarian",
            Self::Mason => "mason",
            Self::Nitwit => "nitwit",
            Self::Shepherd => "shepherd",
            Self::Toolsmith => "toolsmith",
            Self::Weaponsmith => "weaponsmith",
        }
    }

    /// Case-insensitive lookup; accepts namespaced (`minecraft:farmer`) and
    /// upper-case legacy (`FARMER`) spellings.
    pub fn parse(text: &str) -> Option<Self> {
        let key = normalize(text);
        Self::ALL.into_iter().find(|p| p.as_str() == key)
    }

    /// Lenient lookup that never fails.
    pub fn parse_or_default(text: &str) -> Self {
        Self::parse(text).unwrap_or_default()
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::None => "Unemployed",
            Self::Armorer => "Armorer",
            Self::Butcher => "Butcher",
            Self::Cartographer => "Cartographer",
            Self::Cleric => "Cleric",
            Self::Farmer => "Farmer",
            Self::Fisherman => "Fisherman",
            Self::Fletcher => "Fletcher",
            Self::Leatherworker => "Leatherworker",
            Self::Librarian => "Librarian",
            Self::Mason => "Mason",
            Self::Nitwit => "Nitwit",
            Self::Shepherd => "Shepherd",
            Self::Toolsmith => "Toolsmith",
            Self::Weaponsmith => "Weaponsmith",
        }
    }
}

impl fmt::Display for Profession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regional appearance type of a merchant. Unknown names resolve to [`Biome::Plains`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Biome {
    Desert,
    Jungle,
    #[default]
    Plains,
    Savanna,
    Snow,
    Swamp,
    Taiga,
}

impl Biome {
    pub const ALL: [Biome; 7] = [
        Self::Desert,
        Self::Jungle,
        Self::Plains,
        Self::Savanna,
        Self::Snow,
        Self::Swamp,
        Self::Taiga,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Desert => "desert",
            Self::Jungle => "jungle",
            Self::Plains => "plains",
            Self::Savanna => "savanna",
            Self::Snow => "snow",
            Self::Swamp => "swamp",
            Self::Taiga => "taiga",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let key = normalize(text);
        Self::ALL.into_iter().find(|b| b.as_str() == key)
    }

    pub fn parse_or_default(text: &str) -> Self {
        Self::parse(text).unwrap_or_default()
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Desert => "Desert",
            Self::Jungle => "Jungle",
            Self::Plains => "Plains",
            Self::Savanna => "Savanna",
            Self::Snow => "Snowy",
            Self::Swamp => "Swamp",
            Self::Taiga => "Taiga",
        }
    }
}

impl fmt::Display for Biome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable merchant title, e.g. `Plains Farmer` or `Desert Merchant`.
pub fn merchant_title(biome: Biome, profession: Profession) -> String {
    match profession {
        Profession::None => format!("{} Merchant", biome.display_name()),
        p => format!("{} {}", biome.display_name(), p.display_name()),
    }
}

fn normalize(text: &str) -> String {
    let trimmed = text.trim();
    let bare = trimmed.rsplit(':').next().unwrap_or(trimmed);
    bare.to_ascii_lowercase()
}
