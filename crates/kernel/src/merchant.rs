use crate::error::HostError;
use crate::item::{ItemStack, PersistentData};
use serde::{Deserialize, Serialize};
use vessel_common::{Biome, EntityId, Location, Profession};

pub const DEFAULT_MAX_HEALTH: f64 = 20.0;

/// One trade a merchant offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantRecipe {
    /// One or two inputs; the first is the primary price.
    pub ingredients: Vec<ItemStack>,
    pub result: ItemStack,
    pub uses: i32,
    pub max_uses: i32,
    pub experience_reward: bool,
    pub villager_experience: i32,
    pub price_multiplier: f64,
    pub demand: i32,
    pub special_price: i32,
}

impl MerchantRecipe {
    pub fn new(ingredients: Vec<ItemStack>, result: ItemStack, max_uses: i32) -> Self {
        Self {
            ingredients,
            result,
            uses: 0,
            max_uses,
            experience_reward: true,
            villager_experience: 0,
            price_multiplier: 0.0,
            demand: 0,
            special_price: 0,
        }
    }

    fn check(&self, index: usize) -> Result<(), HostError> {
        let reason = if self.ingredients.is_empty() {
            "no ingredients"
        } else if self.ingredients.len() > 2 {
            "more than two ingredients"
        } else if self.max_uses <= 0 {
            "max uses must be positive"
        } else if self.uses < 0 {
            "negative uses"
        } else {
            return Ok(());
        };
        Err(HostError::InvalidRecipe { index, reason })
    }
}

/// A live merchant entity.
///
/// Setters enforce the host's own rules: changing profession resets progress,
/// level and health setters reject out-of-range values rather than clamping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    id: EntityId,
    location: Location,
    profession: Profession,
    biome: Biome,
    level: u8,
    experience: i32,
    adult: bool,
    age_ticks: i32,
    age_locked: bool,
    health: f64,
    max_health: f64,
    custom_name: Option<String>,
    recipes: Vec<MerchantRecipe>,
    data: PersistentData,
    remove_when_far_away: bool,
    ai: bool,
    aware: bool,
}

impl Merchant {
    /// A merchant exactly as the host spawns it: untrained, despawnable and inert.
    pub fn fresh(id: EntityId, location: Location) -> Self {
        Self {
            id,
            location,
            profession: Profession::None,
            biome: Biome::Plains,
            level: 1,
            experience: 0,
            adult: true,
            age_ticks: 0,
            age_locked: false,
            health: DEFAULT_MAX_HEALTH,
            max_health: DEFAULT_MAX_HEALTH,
            custom_name: None,
            recipes: Vec::new(),
            data: PersistentData::new(),
            remove_when_far_away: true,
            ai: false,
            aware: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn profession(&self) -> Profession {
        self.profession
    }

    pub fn biome(&self) -> Biome {
        self.biome
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn experience(&self) -> i32 {
        self.experience
    }

    pub fn is_adult(&self) -> bool {
        self.adult
    }

    pub fn age_ticks(&self) -> i32 {
        self.age_ticks
    }

    pub fn age_locked(&self) -> bool {
        self.age_locked
    }

    pub fn health(&self) -> f64 {
        self.health
    }

    pub fn max_health(&self) -> f64 {
        self.max_health
    }

    pub fn custom_name(&self) -> Option<&str> {
        self.custom_name.as_deref()
    }

    pub fn recipes(&self) -> &[MerchantRecipe] {
        &self.recipes
    }

    pub fn data(&self) -> &PersistentData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut PersistentData {
        &mut self.data
    }

    pub fn remove_when_far_away(&self) -> bool {
        self.remove_when_far_away
    }

    pub fn has_ai(&self) -> bool {
        self.ai
    }

    pub fn is_aware(&self) -> bool {
        self.aware
    }

    /// Switching to a different profession wipes level and experience.
    pub fn set_profession(&mut self, profession: Profession) {
        if profession != self.profession {
            self.profession = profession;
            self.level = 1;
            self.experience = 0;
        }
    }

    pub fn set_biome(&mut self, biome: Biome) {
        self.biome = biome;
    }

    pub fn set_level(&mut self, level: i64) -> Result<(), HostError> {
        if !(1..=5).contains(&level) {
            return Err(HostError::LevelOutOfRange(level));
        }
        self.level = level as u8;
        Ok(())
    }

    pub fn set_experience(&mut self, experience: i64) -> Result<(), HostError> {
        if experience < 0 {
            return Err(HostError::NegativeExperience(experience));
        }
        self.experience = experience.min(i32::MAX as i64) as i32;
        Ok(())
    }

    pub fn set_adult(&mut self, adult: bool) {
        self.adult = adult;
    }

    pub fn set_age_ticks(&mut self, ticks: i32) {
        self.age_ticks = ticks;
    }

    pub fn set_age_locked(&mut self, locked: bool) {
        self.age_locked = locked;
    }

    /// Lowers current health when it exceeds the new maximum.
    pub fn set_max_health(&mut self, max: f64) -> Result<(), HostError> {
        if !(max.is_finite() && max > 0.0) {
            return Err(HostError::InvalidMaxHealth(max));
        }
        self.max_health = max;
        if self.health > max {
            self.health = max;
        }
        Ok(())
    }

    pub fn set_health(&mut self, health: f64) -> Result<(), HostError> {
        if !(health > 0.0 && health <= self.max_health) {
            return Err(HostError::HealthOutOfRange {
                health,
                max: self.max_health,
            });
        }
        self.health = health;
        Ok(())
    }

    pub fn set_custom_name(&mut self, name: Option<String>) {
        self.custom_name = name;
    }

    /// Replaces the whole trade list. Nothing is changed if any recipe is malformed.
    pub fn set_recipes(&mut self, recipes: Vec<MerchantRecipe>) -> Result<(), HostError> {
        for (index, recipe) in recipes.iter().enumerate() {
            recipe.check(index)?;
        }
        self.recipes = recipes;
        Ok(())
    }

    pub fn set_remove_when_far_away(&mut self, remove: bool) {
        self.remove_when_far_away = remove;
    }

    pub fn set_ai(&mut self, ai: bool) {
        self.ai = ai;
    }

    pub fn set_aware(&mut self, aware: bool) {
        self.aware = aware;
    }

    pub(crate) fn relocate(&mut self, location: Location) {
        self.location = location;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::EMERALD;

    fn merchant() -> Merchant {
        Merchant::fresh(EntityId::new(), Location::new("world", 0.5, 64.0, 0.5))
    }

    #[test]
    fn fresh_merchant_is_despawnable_and_inert() {
        let m = merchant();
        assert!(m.remove_when_far_away());
        assert!(!m.has_ai());
        assert!(!m.is_aware());
        assert_eq!(m.level(), 1);
    }

    #[test]
    fn profession_change_resets_progress() {
        let mut m = merchant();
        m.set_level(4).unwrap();
        m.set_experience(250).unwrap();
        m.set_profession(Profession::Librarian);
        assert_eq!(m.level(), 1);
        assert_eq!(m.experience(), 0);

        m.set_level(3).unwrap();
        m.set_profession(Profession::Librarian);
        assert_eq!(m.level(), 3, "same profession keeps progress");
    }

    #[test]
    fn level_and_health_are_range_checked() {
        let mut m = merchant();
        assert_eq!(m.set_level(0), Err(HostError::LevelOutOfRange(0)));
        assert_eq!(m.set_level(6), Err(HostError::LevelOutOfRange(6)));
        assert!(m.set_health(0.0).is_err());
        assert!(m.set_health(25.0).is_err());
        assert!(m.set_max_health(-1.0).is_err());
    }

    #[test]
    fn lowering_max_health_pulls_health_down() {
        let mut m = merchant();
        m.set_max_health(10.0).unwrap();
        assert_eq!(m.health(), 10.0);
        m.set_max_health(40.0).unwrap();
        m.set_health(35.0).unwrap();
        assert_eq!(m.health(), 35.0);
    }

    #[test]
    fn malformed_recipes_are_rejected_whole() {
        let mut m = merchant();
        let good = MerchantRecipe::new(vec![ItemStack::new(EMERALD, 1)], ItemStack::new("bread", 6), 12);
        let empty = MerchantRecipe::new(vec![], ItemStack::new("bread", 6), 12);
        let result = m.set_recipes(vec![good.clone(), empty]);
        assert!(matches!(result, Err(HostError::InvalidRecipe { index: 1, .. })));
        assert!(m.recipes().is_empty());

        let mut no_uses = good.clone();
        no_uses.max_uses = 0;
        assert!(m.set_recipes(vec![no_uses]).is_err());
        assert!(m.set_recipes(vec![good]).is_ok());
        assert_eq!(m.recipes().len(), 1);
    }
}
