//! The frozen form of a merchant: every observable field needed to rebuild it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use vessel_common::{Biome, EntityId, Profession};

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 5;
pub const DEFAULT_MAX_HEALTH: f64 = 20.0;
pub const DEFAULT_DISCOUNT: f64 = 1.0;
pub const UNKNOWN_SOURCE: &str = "unknown";
/// Output item substituted when a trade's result cannot be read.
pub const FILLER_KIND: &str = "stone";
/// Input item substituted when a trade has no readable inputs.
pub const FALLBACK_INPUT_KIND: &str = "emerald";

/// Versioned, defaulted record of a merchant's observable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub variant_kind: Profession,
    pub biome_variant: Biome,
    pub level: u8,
    pub experience: u32,
    pub is_adult: bool,
    pub age_ticks: i32,
    pub age_locked: bool,
    pub health: f64,
    pub max_health: f64,
    pub display_name: Option<String>,
    /// Display order; re-applied in the same order.
    pub trade_offers: Vec<TradeOffer>,
    pub capture: CaptureMetadata,
    /// Milliseconds since the Unix epoch. Only drives side-cache eviction.
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub captured: bool,
    pub owner: Option<EntityId>,
    pub discount_factor: f64,
    pub creation_source: String,
}

impl Default for CaptureMetadata {
    fn default() -> Self {
        Self {
            captured: false,
            owner: None,
            discount_factor: DEFAULT_DISCOUNT,
            creation_source: UNKNOWN_SOURCE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOffer {
    /// One or two items; the first is the primary price.
    pub input_items: Vec<ItemDescriptor>,
    pub output_item: ItemDescriptor,
    /// Times the offer has been used. Never above `max_uses`.
    pub uses: u32,
    pub max_uses: u32,
    pub grants_experience: bool,
    pub experience_reward: u32,
    pub price_multiplier: f64,
    pub demand: i32,
    pub special_price_delta: i32,
}

impl TradeOffer {
    pub fn new(input_items: Vec<ItemDescriptor>, output_item: ItemDescriptor, max_uses: u32) -> Self {
        Self {
            input_items,
            output_item,
            uses: 0,
            max_uses,
            grants_experience: true,
            experience_reward: 0,
            price_multiplier: 0.0,
            demand: 0,
            special_price_delta: 0,
        }
    }

    fn normalized(mut self) -> Self {
        self.input_items = self
            .input_items
            .into_iter()
            .filter(|i| !i.kind.is_empty())
            .take(2)
            .map(ItemDescriptor::normalized)
            .collect();
        if self.input_items.is_empty() {
            self.input_items.push(ItemDescriptor::new(FALLBACK_INPUT_KIND, 1));
        }
        self.output_item = if self.output_item.kind.is_empty() {
            ItemDescriptor::filler()
        } else {
            self.output_item.normalized()
        };
        self.max_uses = self.max_uses.max(1);
        self.uses = self.uses.min(self.max_uses);
        if !self.price_multiplier.is_finite() {
            self.price_multiplier = 0.0;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemDescriptor {
    pub kind: String,
    pub count: u32,
    pub display_name: Option<String>,
    pub lore_lines: Vec<String>,
    pub enchantments: BTreeMap<String, u32>,
    /// Only meaningful for enchanted books.
    pub stored_enchantments: BTreeMap<String, u32>,
    pub custom_model_tag: Option<i32>,
    pub flags: BTreeSet<String>,
    pub unbreakable: bool,
}

impl ItemDescriptor {
    pub fn new(kind: impl Into<String>, count: u32) -> Self {
        Self {
            kind: kind.into(),
            count,
            ..Self::default()
        }
    }

    /// Inert stand-in for an unreadable trade result.
    pub fn filler() -> Self {
        Self::new(FILLER_KIND, 1)
    }

    fn normalized(mut self) -> Self {
        self.count = self.count.max(1);
        for level in self
            .enchantments
            .values_mut()
            .chain(self.stored_enchantments.values_mut())
        {
            *level = (*level).max(1);
        }
        self
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            variant_kind: Profession::default(),
            biome_variant: Biome::default(),
            level: MIN_LEVEL,
            experience: 0,
            is_adult: true,
            age_ticks: 0,
            age_locked: false,
            health: DEFAULT_MAX_HEALTH,
            max_health: DEFAULT_MAX_HEALTH,
            display_name: None,
            trade_offers: Vec::new(),
            capture: CaptureMetadata::default(),
            created_at: 0,
        }
    }
}

impl Snapshot {
    /// Force every field into its documented range.
    ///
    /// Level into 1..=5, max health positive, health into `(0, max_health]`
    /// (floored at one point where the maximum allows), trade invariants per
    /// offer. Idempotent.
    ///
    /// The health floor makes this lossy: a merchant captured below one point
    /// comes back with one point.
    pub fn normalized(mut self) -> Self {
        self.level = self.level.clamp(MIN_LEVEL, MAX_LEVEL);
        if !(self.max_health.is_finite() && self.max_health > 0.0) {
            self.max_health = DEFAULT_MAX_HEALTH;
        }
        self.health = clamp_health(self.health, self.max_health);
        if !(self.capture.discount_factor.is_finite() && self.capture.discount_factor > 0.0) {
            self.capture.discount_factor = DEFAULT_DISCOUNT;
        }
        if self.capture.creation_source.trim().is_empty() {
            self.capture.creation_source = UNKNOWN_SOURCE.to_string();
        }
        self.display_name = self.display_name.filter(|n| !n.is_empty());
        self.trade_offers = self
            .trade_offers
            .into_iter()
            .map(TradeOffer::normalized)
            .collect();
        self
    }

    pub fn trade_count(&self) -> usize {
        self.trade_offers.len()
    }
}

/// Health into `[min(1, max), max]`; NaN restores full health. Anything
/// between zero and one rounds up to one.
pub fn clamp_health(health: f64, max: f64) -> f64 {
    if health.is_nan() {
        return max;
    }
    health.clamp(max.min(1.0), max)
}
