//! Reads live merchants into snapshots and writes snapshots onto fresh merchants.
//!
//! Both directions must run on the thread owning the merchant.

use vessel_common::EntityId;
use vessel_kernel::item::{EMERALD, ENCHANTED_BOOK, STONE};
use vessel_kernel::{HostError, HostWorld, ItemMeta, ItemStack, Merchant, MerchantRecipe, TagValue};
use vessel_persist::model::{DEFAULT_DISCOUNT, MAX_LEVEL, MIN_LEVEL, UNKNOWN_SOURCE};
use vessel_persist::{CaptureMetadata, ItemDescriptor, Snapshot, TradeOffer, clamp_health};

/// Set on a merchant the moment it is captured.
pub const CAPTURED_TAG: &str = "vessel:captured";
/// Actor that owns the merchant, as a hyphenated id.
pub const OWNER_TAG: &str = "vessel:owner";
pub const DISCOUNT_TAG: &str = "vessel:discount";
pub const SOURCE_TAG: &str = "vessel:creation_source";

/// Snapshot of merchant `id`, or `None` if it no longer exists.
pub fn snapshot(
    world: &HostWorld,
    id: EntityId,
    now_millis: u64,
    save_trades: bool,
) -> Result<Option<Snapshot>, HostError> {
    match world.with_merchant(id, |m| read(m, now_millis, save_trades)) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(HostError::NoSuchEntity(_)) => Ok(None),
        Err(other) => Err(other),
    }
}

/// Write `snapshot` onto the freshly spawned merchant `id`.
pub fn apply(
    world: &HostWorld,
    id: EntityId,
    snapshot: &Snapshot,
    save_trades: bool,
) -> Result<(), HostError> {
    world.with_merchant_mut(id, |m| write(m, snapshot, save_trades))?
}

pub fn read(merchant: &Merchant, now_millis: u64, save_trades: bool) -> Snapshot {
    let data = merchant.data();
    let capture = CaptureMetadata {
        captured: matches!(data.get(CAPTURED_TAG), Some(TagValue::Bool(true))),
        owner: match data.get(OWNER_TAG) {
            Some(TagValue::String(owner)) => EntityId::parse(owner),
            _ => None,
        },
        discount_factor: match data.get(DISCOUNT_TAG) {
            Some(TagValue::Double(d)) => *d,
            _ => DEFAULT_DISCOUNT,
        },
        creation_source: match data.get(SOURCE_TAG) {
            Some(TagValue::String(source)) => source.clone(),
            _ => UNKNOWN_SOURCE.to_string(),
        },
    };
    let trade_offers = if save_trades {
        merchant.recipes().iter().map(offer_from_recipe).collect()
    } else {
        Vec::new()
    };
    Snapshot {
        variant_kind: merchant.profession(),
        biome_variant: merchant.biome(),
        level: merchant.level(),
        experience: merchant.experience().max(0) as u32,
        is_adult: merchant.is_adult(),
        age_ticks: merchant.age_ticks(),
        age_locked: merchant.age_locked(),
        health: merchant.health(),
        max_health: merchant.max_health(),
        display_name: merchant.custom_name().map(str::to_string),
        trade_offers,
        capture,
        created_at: now_millis,
    }
    .normalized()
}

/// Kind before progress, health after everything but trades, trades last.
/// Leaves the merchant with AI on and exempt from distance despawn.
pub fn write(merchant: &mut Merchant, snapshot: &Snapshot, save_trades: bool) -> Result<(), HostError> {
    // a profession change resets level and experience on the host
    merchant.set_profession(snapshot.variant_kind);
    merchant.set_biome(snapshot.biome_variant);
    merchant.set_level(i64::from(snapshot.level.clamp(MIN_LEVEL, MAX_LEVEL)))?;
    merchant.set_experience(i64::from(snapshot.experience))?;
    merchant.set_adult(snapshot.is_adult);
    merchant.set_age_ticks(snapshot.age_ticks);
    merchant.set_age_locked(snapshot.age_locked);
    merchant.set_custom_name(snapshot.display_name.clone().filter(|n| !n.is_empty()));

    let data = merchant.data_mut();
    data.remove(CAPTURED_TAG);
    match snapshot.capture.owner {
        Some(owner) => data.insert(OWNER_TAG.to_string(), TagValue::String(owner.to_string())),
        None => data.remove(OWNER_TAG),
    };
    data.insert(
        DISCOUNT_TAG.to_string(),
        TagValue::Double(snapshot.capture.discount_factor),
    );
    data.insert(
        SOURCE_TAG.to_string(),
        TagValue::String(snapshot.capture.creation_source.clone()),
    );

    let max = if snapshot.max_health.is_finite() && snapshot.max_health > 0.0 {
        snapshot.max_health
    } else {
        merchant.max_health()
    };
    merchant.set_max_health(max)?;
    merchant.set_health(clamp_health(snapshot.health, max))?;

    if save_trades {
        let recipes = snapshot.trade_offers.iter().map(recipe_from_offer).collect();
        merchant.set_recipes(recipes)?;
    }

    merchant.set_ai(true);
    merchant.set_aware(true);
    merchant.set_remove_when_far_away(false);
    Ok(())
}

pub fn offer_from_recipe(recipe: &MerchantRecipe) -> TradeOffer {
    TradeOffer {
        input_items: recipe.ingredients.iter().map(descriptor_from_stack).collect(),
        output_item: descriptor_from_stack(&recipe.result),
        uses: recipe.uses.max(0) as u32,
        max_uses: recipe.max_uses.max(1) as u32,
        grants_experience: recipe.experience_reward,
        experience_reward: recipe.villager_experience.max(0) as u32,
        price_multiplier: recipe.price_multiplier,
        demand: recipe.demand,
        special_price_delta: recipe.special_price,
    }
}

/// Unknown inputs are dropped and replaced by an emerald if none remain;
/// an unknown output becomes stone.
pub fn recipe_from_offer(offer: &TradeOffer) -> MerchantRecipe {
    let mut ingredients: Vec<ItemStack> = offer
        .input_items
        .iter()
        .filter_map(stack_from_descriptor)
        .take(2)
        .collect();
    if ingredients.is_empty() {
        ingredients.push(ItemStack::new(EMERALD, 1));
    }
    let result = stack_from_descriptor(&offer.output_item).unwrap_or_else(|| {
        tracing::debug!(kind = %offer.output_item.kind, "unknown trade result replaced");
        ItemStack::new(STONE, 1)
    });
    let max_uses = offer.max_uses.clamp(1, i32::MAX as u32) as i32;
    MerchantRecipe {
        ingredients,
        result,
        uses: (offer.uses.min(i32::MAX as u32) as i32).min(max_uses),
        max_uses,
        experience_reward: offer.grants_experience,
        villager_experience: offer.experience_reward.min(i32::MAX as u32) as i32,
        price_multiplier: if offer.price_multiplier.is_finite() {
            offer.price_multiplier
        } else {
            0.0
        },
        demand: offer.demand,
        special_price: offer.special_price_delta,
    }
}

pub fn descriptor_from_stack(stack: &ItemStack) -> ItemDescriptor {
    let meta = &stack.meta;
    ItemDescriptor {
        kind: stack.kind.clone(),
        count: stack.amount.max(1),
        display_name: meta.display_name.clone(),
        lore_lines: meta.lore.clone(),
        enchantments: meta.enchants.clone(),
        stored_enchantments: meta.stored_enchants.clone(),
        custom_model_tag: meta.custom_model_data,
        flags: meta.flags.clone(),
        unbreakable: meta.unbreakable,
    }
}

/// `None` when the host has no item of that kind.
pub fn stack_from_descriptor(descriptor: &ItemDescriptor) -> Option<ItemStack> {
    let kind = ItemStack::resolve_kind(&descriptor.kind)?;
    let mut stack = ItemStack::new(kind, 1);
    stack.amount = descriptor.count.clamp(1, stack.max_stack_size());
    stack.meta = ItemMeta {
        display_name: descriptor.display_name.clone(),
        lore: descriptor.lore_lines.clone(),
        enchants: descriptor
            .enchantments
            .iter()
            .map(|(id, level)| (id.clone(), (*level).max(1)))
            .collect(),
        stored_enchants: if kind == ENCHANTED_BOOK {
            descriptor
                .stored_enchantments
                .iter()
                .map(|(id, level)| (id.clone(), (*level).max(1)))
                .collect()
        } else {
            Default::default()
        },
        custom_model_data: descriptor.custom_model_tag,
        flags: descriptor.flags.clone(),
        unbreakable: descriptor.unbreakable,
        data: Default::default(),
    };
    Some(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vessel_common::{Biome, Location, Profession};
    use vessel_kernel::SpawnReason;

    fn spot() -> Location {
        Location::new("world", 1.5, 64.0, 1.5)
    }

    fn trading_farmer(world: &HostWorld) -> EntityId {
        let id = world.spawn_merchant(spot(), SpawnReason::Natural).unwrap();
        world
            .with_merchant_mut(id, |m| {
                m.set_profession(Profession::Farmer);
                m.set_biome(Biome::Taiga);
                m.set_level(3).unwrap();
                m.set_experience(150).unwrap();
                m.set_max_health(24.0).unwrap();
                m.set_health(17.5).unwrap();
                m.set_custom_name(Some("Greta".into()));
                let mut book = ItemStack::new(ENCHANTED_BOOK, 1);
                book.meta.stored_enchants.insert("mending".into(), 1);
                let mut sell = MerchantRecipe::new(
                    vec![ItemStack::new("wheat", 20)],
                    ItemStack::new(EMERALD, 1),
                    16,
                );
                sell.uses = 4;
                sell.villager_experience = 2;
                let buy = MerchantRecipe::new(
                    vec![ItemStack::new(EMERALD, 5), ItemStack::new("book", 1)],
                    book,
                    12,
                );
                m.set_recipes(vec![sell, buy]).unwrap();
            })
            .unwrap();
        id
    }

    #[test]
    fn snapshot_reads_every_field() {
        let world = HostWorld::new();
        let id = trading_farmer(&world);
        let s = snapshot(&world, id, 42, true).unwrap().unwrap();
        assert_eq!(s.variant_kind, Profession::Farmer);
        assert_eq!(s.biome_variant, Biome::Taiga);
        assert_eq!((s.level, s.experience), (3, 150));
        assert_eq!((s.health, s.max_health), (17.5, 24.0));
        assert_eq!(s.display_name.as_deref(), Some("Greta"));
        assert_eq!(s.created_at, 42);
        assert_eq!(s.trade_count(), 2);
        assert_eq!(s.trade_offers[0].uses, 4);
        assert_eq!(s.trade_offers[1].input_items.len(), 2);
        assert_eq!(
            s.trade_offers[1].output_item.stored_enchantments.get("mending"),
            Some(&1)
        );
        assert_eq!(s.capture.creation_source, UNKNOWN_SOURCE);
    }

    #[test]
    fn trades_are_skipped_when_disabled() {
        let world = HostWorld::new();
        let id = trading_farmer(&world);
        let s = snapshot(&world, id, 0, false).unwrap().unwrap();
        assert!(s.trade_offers.is_empty());
    }

    #[test]
    fn missing_merchant_is_none() {
        let world = HostWorld::new();
        assert_eq!(snapshot(&world, EntityId::new(), 0, true), Ok(None));
    }

    #[test]
    fn apply_reproduces_the_merchant() {
        let world = HostWorld::new();
        let original = trading_farmer(&world);
        let s = snapshot(&world, original, 0, true).unwrap().unwrap();

        let fresh = world.spawn_merchant(spot(), SpawnReason::Restored).unwrap();
        apply(&world, fresh, &s, true).unwrap();
        let copy = snapshot(&world, fresh, 0, true).unwrap().unwrap();
        assert_eq!(copy, s);
        world
            .with_merchant(fresh, |m| {
                assert!(m.has_ai() && m.is_aware());
                assert!(!m.remove_when_far_away());
            })
            .unwrap();
    }

    #[test]
    fn apply_clamps_out_of_range_values() {
        let world = HostWorld::new();
        let fresh = world.spawn_merchant(spot(), SpawnReason::Restored).unwrap();
        let wild = Snapshot {
            variant_kind: Profession::Mason,
            level: 9,
            health: 400.0,
            max_health: 30.0,
            ..Snapshot::default()
        };
        apply(&world, fresh, &wild, true).unwrap();
        world
            .with_merchant(fresh, |m| {
                assert_eq!(m.level(), 5);
                assert_eq!(m.health(), 30.0);
                assert_eq!(m.max_health(), 30.0);
            })
            .unwrap();
    }

    #[test]
    fn level_survives_the_profession_reset() {
        let world = HostWorld::new();
        let fresh = world.spawn_merchant(spot(), SpawnReason::Restored).unwrap();
        world
            .with_merchant_mut(fresh, |m| m.set_profession(Profession::Cleric))
            .unwrap();
        let s = Snapshot {
            variant_kind: Profession::Librarian,
            level: 4,
            experience: 90,
            ..Snapshot::default()
        };
        apply(&world, fresh, &s, true).unwrap();
        world
            .with_merchant(fresh, |m| {
                assert_eq!(m.profession(), Profession::Librarian);
                assert_eq!((m.level(), m.experience()), (4, 90));
            })
            .unwrap();
    }

    #[test]
    fn unknown_items_degrade_to_placeholders() {
        let offer = TradeOffer::new(
            vec![ItemDescriptor::new("plutonium", 1), ItemDescriptor::new("unobtainium", 1)],
            ItemDescriptor::new("antimatter", 1),
            0,
        );
        let recipe = recipe_from_offer(&offer);
        assert_eq!(recipe.ingredients, vec![ItemStack::new(EMERALD, 1)]);
        assert_eq!(recipe.result.kind, STONE);
        assert_eq!(recipe.max_uses, 1);

        let offer = TradeOffer::new(
            vec![ItemDescriptor::new("plutonium", 1), ItemDescriptor::new("WHEAT", 80)],
            ItemDescriptor::new("minecraft:bread", 3),
            10,
        );
        let recipe = recipe_from_offer(&offer);
        assert_eq!(recipe.ingredients.len(), 1);
        assert_eq!(recipe.ingredients[0].kind, "wheat");
        assert_eq!(recipe.ingredients[0].amount, 64);
        assert_eq!(recipe.result.kind, "bread");
    }

    #[test]
    fn owner_and_source_tags_round_trip() {
        let world = HostWorld::new();
        let owner = EntityId::new();
        let fresh = world.spawn_merchant(spot(), SpawnReason::Restored).unwrap();
        let s = Snapshot {
            capture: CaptureMetadata {
                captured: true,
                owner: Some(owner),
                discount_factor: 0.75,
                creation_source: "cured".into(),
            },
            ..Snapshot::default()
        };
        apply(&world, fresh, &s, true).unwrap();
        let back = snapshot(&world, fresh, 0, true).unwrap().unwrap();
        // the captured marker belongs to the vessel, not the released merchant
        assert!(!back.capture.captured);
        assert_eq!(back.capture.owner, Some(owner));
        assert_eq!(back.capture.discount_factor, 0.75);
        assert_eq!(back.capture.creation_source, "cured");
    }
}
