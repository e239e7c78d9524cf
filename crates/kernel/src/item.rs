use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const BUCKET: &str = "bucket";
pub const EMERALD: &str = "emerald";
pub const STONE: &str = "stone";
pub const ENCHANTED_BOOK: &str = "enchanted_book";

/// Item kinds the host recognises. Anything else is rejected by [`ItemStack::resolve_kind`].
const KNOWN_KINDS: &[&str] = &[
    "air", "apple", "arrow", "bell", "beetroot", "beetroot_soup", "book", "bookshelf", "bread",
    "brick", "bucket", "cake", "carrot", "chainmail_boots", "chainmail_chestplate",
    "chainmail_helmet", "chainmail_leggings", "clay_ball", "coal", "compass", "cooked_chicken",
    "cooked_cod", "cooked_porkchop", "cooked_rabbit", "cooked_salmon", "cookie", "diamond",
    "diamond_axe", "diamond_boots", "diamond_chestplate", "diamond_helmet", "diamond_hoe",
    "diamond_leggings", "diamond_pickaxe", "diamond_shovel", "diamond_sword", "emerald",
    "enchanted_book", "ender_pearl", "experience_bottle", "feather", "filled_map", "flint",
    "glass", "glowstone", "gold_ingot", "golden_carrot", "gravel", "ink_sac", "iron_axe",
    "iron_boots", "iron_chestplate", "iron_helmet", "iron_hoe", "iron_ingot", "iron_leggings",
    "iron_pickaxe", "iron_shovel", "iron_sword", "item_frame", "lantern", "lapis_lazuli",
    "lava_bucket", "leather", "leather_boots", "leather_chestplate", "leather_helmet",
    "leather_horse_armor", "leather_leggings", "map", "melon", "milk_bucket", "name_tag",
    "painting", "paper", "potato", "pumpkin", "pumpkin_pie", "quartz", "rabbit_stew",
    "redstone", "saddle", "shears", "shield", "stick", "stone", "string", "suspicious_stew",
    "terracotta", "tripwire_hook", "water_bucket", "wheat", "white_wool",
];

/// A value stored under a key in an item's persistent data container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TagValue {
    Bool(bool),
    Double(f64),
    String(String),
}

/// Namespaced key/value storage attached to items and entities.
pub type PersistentData = BTreeMap<String, TagValue>;

/// Presentation and custom data carried by an item stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMeta {
    pub display_name: Option<String>,
    pub lore: Vec<String>,
    pub enchants: BTreeMap<String, u32>,
    /// Enchantments held by an enchanted book rather than applied to it.
    pub stored_enchants: BTreeMap<String, u32>,
    pub custom_model_data: Option<i32>,
    pub flags: BTreeSet<String>,
    pub unbreakable: bool,
    pub data: PersistentData,
}

impl ItemMeta {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    pub kind: String,
    pub amount: u32,
    pub meta: ItemMeta,
}

impl ItemStack {
    pub fn new(kind: impl Into<String>, amount: u32) -> Self {
        Self {
            kind: kind.into(),
            amount,
            meta: ItemMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: ItemMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn is_air(&self) -> bool {
        self.kind == "air" || self.amount == 0
    }

    pub fn max_stack_size(&self) -> u32 {
        match self.kind.as_str() {
            BUCKET | "lava_bucket" | "water_bucket" | "milk_bucket" | "ender_pearl" => 16,
            ENCHANTED_BOOK | "cake" | "saddle" | "shears" | "shield" | "compass"
            | "suspicious_stew" | "rabbit_stew" | "beetroot_soup" => 1,
            kind if kind.ends_with("_sword")
                || kind.ends_with("_axe")
                || kind.ends_with("_pickaxe")
                || kind.ends_with("_shovel")
                || kind.ends_with("_hoe")
                || kind.ends_with("_helmet")
                || kind.ends_with("_chestplate")
                || kind.ends_with("_leggings")
                || kind.ends_with("_boots") =>
            {
                1
            }
            _ => 64,
        }
    }

    /// Same kind and identical meta; amounts may differ.
    pub fn is_similar(&self, other: &ItemStack) -> bool {
        self.kind == other.kind && self.meta == other.meta
    }

    /// Canonical host identifier for `name`, or `None` if the host has no such item.
    pub fn resolve_kind(name: &str) -> Option<&'static str> {
        let trimmed = name.trim();
        let bare = trimmed.strip_prefix("minecraft:").unwrap_or(trimmed);
        let key = bare.to_ascii_lowercase();
        KNOWN_KINDS.iter().copied().find(|k| *k == key)
    }
}
