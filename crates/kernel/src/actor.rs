use crate::error::HostError;
use crate::item::ItemStack;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use vessel_common::{EntityId, Location};

pub const INVENTORY_SIZE: usize = 36;

/// Fixed-size slot inventory with a selected hotbar slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    slots: Vec<Option<ItemStack>>,
    held: usize,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            slots: vec![None; INVENTORY_SIZE],
            held: 0,
        }
    }
}

impl Inventory {
    pub fn held_slot(&self) -> usize {
        self.held
    }

    pub fn select(&mut self, slot: usize) -> Result<(), HostError> {
        if slot >= self.slots.len() {
            return Err(HostError::NoSuchSlot(slot));
        }
        self.held = slot;
        Ok(())
    }

    pub fn get(&self, slot: usize) -> Option<&ItemStack> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn set(&mut self, slot: usize, item: Option<ItemStack>) -> Result<(), HostError> {
        let target = self.slots.get_mut(slot).ok_or(HostError::NoSuchSlot(slot))?;
        *target = item.filter(|i| !i.is_air());
        Ok(())
    }

    pub fn held_item(&self) -> Option<&ItemStack> {
        self.get(self.held)
    }

    pub fn set_held_item(&mut self, item: Option<ItemStack>) {
        let held = self.held;
        self.slots[held] = item.filter(|i| !i.is_air());
    }

    /// Merge into similar stacks first, then fill empty slots.
    /// Returns whatever did not fit.
    pub fn add_item(&mut self, mut item: ItemStack) -> Option<ItemStack> {
        let max = item.max_stack_size();
        for stack in self.slots.iter_mut().flatten() {
            if item.amount == 0 {
                break;
            }
            if stack.is_similar(&item) && stack.amount < max {
                let moved = (max - stack.amount).min(item.amount);
                stack.amount += moved;
                item.amount -= moved;
            }
        }
        for slot in self.slots.iter_mut() {
            if item.amount == 0 {
                break;
            }
            if slot.is_none() {
                let moved = max.min(item.amount);
                let mut placed = item.clone();
                placed.amount = moved;
                *slot = Some(placed);
                item.amount -= moved;
            }
        }
        (item.amount > 0).then_some(item)
    }

    /// Total amount of items similar to `probe` across all slots.
    pub fn count_similar(&self, probe: &ItemStack) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|s| s.is_similar(probe))
            .map(|s| s.amount)
            .sum()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemStack> {
        self.slots.iter().flatten()
    }
}

/// A player-like entity that triggers interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    id: EntityId,
    name: String,
    location: Location,
    pub inventory: Inventory,
    permissions: BTreeSet<String>,
    operator: bool,
    messages: Vec<String>,
}

impl Actor {
    pub fn new(id: EntityId, name: impl Into<String>, location: Location) -> Self {
        Self {
            id,
            name: name.into(),
            location,
            inventory: Inventory::default(),
            permissions: BTreeSet::new(),
            operator: false,
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub(crate) fn relocate(&mut self, location: Location) {
        self.location = location;
    }

    pub fn grant(&mut self, permission: impl Into<String>) {
        self.permissions.insert(permission.into());
    }

    pub fn revoke(&mut self, permission: &str) {
        self.permissions.remove(permission);
    }

    pub fn set_operator(&mut self, operator: bool) {
        self.operator = operator;
    }

    /// Operators hold every permission.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.operator || self.permissions.contains(permission)
    }

    pub fn send_message(&mut self, text: impl Into<String>) {
        self.messages.push(text.into());
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn take_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{BUCKET, EMERALD};

    #[test]
    fn add_item_merges_then_fills() {
        let mut inv = Inventory::default();
        inv.set(0, Some(ItemStack::new(BUCKET, 15))).unwrap();
        assert!(inv.add_item(ItemStack::new(BUCKET, 3)).is_none());
        assert_eq!(inv.get(0).unwrap().amount, 16);
        assert_eq!(inv.get(1).unwrap().amount, 2);
    }

    #[test]
    fn full_inventory_returns_leftover() {
        let mut inv = Inventory::default();
        for slot in 0..INVENTORY_SIZE {
            inv.set(slot, Some(ItemStack::new(EMERALD, 64))).unwrap();
        }
        assert!(inv.is_full());
        let left = inv.add_item(ItemStack::new(BUCKET, 1)).unwrap();
        assert_eq!(left.amount, 1);
    }

    #[test]
    fn held_slot_selection() {
        let mut inv = Inventory::default();
        assert!(inv.select(INVENTORY_SIZE).is_err());
        inv.select(4).unwrap();
        inv.set_held_item(Some(ItemStack::new(BUCKET, 1)));
        assert_eq!(inv.get(4).map(|i| i.kind.as_str()), Some(BUCKET));
        inv.set_held_item(Some(ItemStack::new(BUCKET, 0)));
        assert!(inv.held_item().is_none());
    }

    #[test]
    fn operators_hold_every_permission() {
        let mut actor = Actor::new(EntityId::new(), "alex", Location::new("world", 0.0, 64.0, 0.0));
        assert!(!actor.has_permission("vessel.capture"));
        actor.grant("vessel.capture");
        assert!(actor.has_permission("vessel.capture"));
        actor.revoke("vessel.capture");
        actor.set_operator(true);
        assert!(actor.has_permission("anything"));
    }
}
