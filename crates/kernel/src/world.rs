use crate::actor::Actor;
use crate::block::BlockKind;
use crate::error::HostError;
use crate::item::ItemStack;
use crate::merchant::Merchant;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use vessel_affinity::EntityLocator;
use vessel_common::{BlockPos, EntityId, Location};

/// Answers "does the current thread own this location?".
pub type AffinityCheck = Arc<dyn Fn(&Location) -> bool + Send + Sync>;

/// Chunks are 16x16 block columns.
pub const CHUNK_SIZE: i32 = 16;

/// Why a merchant entered the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpawnReason {
    Natural,
    Breeding,
    /// Converted back from a zombified form.
    Cured,
    Command,
    /// Reconstructed from a captured snapshot.
    Restored,
    Custom,
}

impl SpawnReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Natural => "natural",
            Self::Breeding => "breeding",
            Self::Cured => "cured",
            Self::Command => "command",
            Self::Restored => "restored",
            Self::Custom => "custom",
        }
    }
}

/// An event record produced by every structural change to the world.
///
/// Embedders drain the log and forward entries to interested listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorldEvent {
    MerchantSpawned {
        id: EntityId,
        location: Location,
        reason: SpawnReason,
    },
    /// Removed by a plugin or game rule; not a death.
    MerchantRemoved { id: EntityId },
    MerchantDied { id: EntityId },
    MerchantMoved { id: EntityId, to: Location },
    ChunkUnloaded {
        world: String,
        chunk_x: i32,
        chunk_z: i32,
        merchants: Vec<EntityId>,
    },
    BlockChanged {
        pos: BlockPos,
        old: BlockKind,
        new: BlockKind,
    },
    ItemDropped { location: Location, item: ItemStack },
}

/// An item lying on the ground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedItem {
    pub location: Location,
    pub item: ItemStack,
}

/// The authoritative in-memory host world.
///
/// Shared across threads behind an `Arc`. When an affinity check is installed,
/// every access to an entity or block must come from the thread that owns the
/// location involved, otherwise it fails with [`HostError::WrongThread`].
/// [`HostWorld::locate`], [`HostWorld::is_valid`] and permission lookups are
/// exempt so schedulers can route work.
///
/// Closures passed to the `with_*` accessors run under the world's locks and
/// must not call back into the world.
pub struct HostWorld {
    merchants: RwLock<BTreeMap<EntityId, Merchant>>,
    actors: RwLock<BTreeMap<EntityId, Actor>>,
    blocks: RwLock<HashMap<BlockPos, BlockKind>>,
    dropped: Mutex<Vec<DroppedItem>>,
    event_log: Mutex<Vec<WorldEvent>>,
    affinity: RwLock<Option<AffinityCheck>>,
}

impl Default for HostWorld {
    fn default() -> Self {
        Self {
            merchants: RwLock::new(BTreeMap::new()),
            actors: RwLock::new(BTreeMap::new()),
            blocks: RwLock::new(HashMap::new()),
            dropped: Mutex::new(Vec::new()),
            event_log: Mutex::new(Vec::new()),
            affinity: RwLock::new(None),
        }
    }
}

impl std::fmt::Debug for HostWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostWorld")
            .field("merchants", &self.merchants.read().len())
            .field("actors", &self.actors.read().len())
            .field("affinity_checked", &self.affinity.read().is_some())
            .finish()
    }
}

impl HostWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce thread ownership on every entity and block access from now on.
    pub fn install_affinity_check(&self, check: impl Fn(&Location) -> bool + Send + Sync + 'static) {
        *self.affinity.write() = Some(Arc::new(check));
    }

    pub fn clear_affinity_check(&self) {
        *self.affinity.write() = None;
    }

    fn check(&self, location: &Location) -> Result<(), HostError> {
        let check = self.affinity.read().clone();
        match check {
            Some(owns) if !owns(location) => Err(HostError::WrongThread(location.clone())),
            _ => Ok(()),
        }
    }

    fn record(&self, event: WorldEvent) {
        self.event_log.lock().push(event);
    }

    /// Drain and return the event log.
    pub fn drain_events(&self) -> Vec<WorldEvent> {
        std::mem::take(&mut *self.event_log.lock())
    }

    /// Copy of the event log.
    pub fn events(&self) -> Vec<WorldEvent> {
        self.event_log.lock().clone()
    }

    // -- merchants ---------------------------------------------------------

    /// Spawn a fresh merchant at `location`. Returns its id.
    pub fn spawn_merchant(
        &self,
        location: Location,
        reason: SpawnReason,
    ) -> Result<EntityId, HostError> {
        self.check(&location)?;
        let id = EntityId::new();
        self.merchants
            .write()
            .insert(id, Merchant::fresh(id, location.clone()));
        tracing::debug!(%id, %location, reason = reason.as_str(), "merchant spawned");
        self.record(WorldEvent::MerchantSpawned {
            id,
            location,
            reason,
        });
        Ok(id)
    }

    pub fn with_merchant<R>(
        &self,
        id: EntityId,
        f: impl FnOnce(&Merchant) -> R,
    ) -> Result<R, HostError> {
        let merchants = self.merchants.read();
        let merchant = merchants.get(&id).ok_or(HostError::NoSuchEntity(id))?;
        self.check(merchant.location())?;
        Ok(f(merchant))
    }

    pub fn with_merchant_mut<R>(
        &self,
        id: EntityId,
        f: impl FnOnce(&mut Merchant) -> R,
    ) -> Result<R, HostError> {
        let mut merchants = self.merchants.write();
        let merchant = merchants.get_mut(&id).ok_or(HostError::NoSuchEntity(id))?;
        self.check(merchant.location())?;
        Ok(f(merchant))
    }

    fn take_merchant(&self, id: EntityId) -> Result<Merchant, HostError> {
        let mut merchants = self.merchants.write();
        let location = merchants
            .get(&id)
            .ok_or(HostError::NoSuchEntity(id))?
            .location()
            .clone();
        self.check(&location)?;
        merchants.remove(&id).ok_or(HostError::NoSuchEntity(id))
    }

    /// Remove a merchant without killing it.
    pub fn remove_merchant(&self, id: EntityId) -> Result<Merchant, HostError> {
        let merchant = self.take_merchant(id)?;
        tracing::debug!(%id, "merchant removed");
        self.record(WorldEvent::MerchantRemoved { id });
        Ok(merchant)
    }

    pub fn kill_merchant(&self, id: EntityId) -> Result<Merchant, HostError> {
        let merchant = self.take_merchant(id)?;
        self.record(WorldEvent::MerchantDied { id });
        Ok(merchant)
    }

    /// Move a merchant; the caller must own its current location.
    pub fn move_merchant(&self, id: EntityId, to: Location) -> Result<(), HostError> {
        self.with_merchant_mut(id, |m| m.relocate(to.clone()))?;
        self.record(WorldEvent::MerchantMoved { id, to });
        Ok(())
    }

    pub fn merchant_count(&self) -> usize {
        self.merchants.read().len()
    }

    pub fn merchant_ids(&self) -> Vec<EntityId> {
        self.merchants.read().keys().copied().collect()
    }

    /// Announce that a chunk column is being unloaded. Merchants stay in memory.
    pub fn unload_chunk(&self, world: &str, chunk_x: i32, chunk_z: i32) -> Vec<EntityId> {
        let merchants: Vec<EntityId> = self
            .merchants
            .read()
            .values()
            .filter(|m| {
                let b = m.location().block();
                b.world == world
                    && b.x.div_euclid(CHUNK_SIZE) == chunk_x
                    && b.z.div_euclid(CHUNK_SIZE) == chunk_z
            })
            .map(Merchant::id)
            .collect();
        self.record(WorldEvent::ChunkUnloaded {
            world: world.to_string(),
            chunk_x,
            chunk_z,
            merchants: merchants.clone(),
        });
        merchants
    }

    // -- actors ------------------------------------------------------------

    /// Register an actor. Setup-time only, not affinity checked.
    pub fn add_actor(&self, name: impl Into<String>, location: Location) -> EntityId {
        let id = EntityId::new();
        self.actors.write().insert(id, Actor::new(id, name, location));
        id
    }

    /// The actor leaves the host. The caller must own its location.
    pub fn remove_actor(&self, id: EntityId) -> Result<Actor, HostError> {
        let mut actors = self.actors.write();
        let location = actors
            .get(&id)
            .ok_or(HostError::NoSuchEntity(id))?
            .location()
            .clone();
        self.check(&location)?;
        tracing::debug!(%id, "actor left");
        actors.remove(&id).ok_or(HostError::NoSuchEntity(id))
    }

    pub fn with_actor<R>(&self, id: EntityId, f: impl FnOnce(&Actor) -> R) -> Result<R, HostError> {
        let actors = self.actors.read();
        let actor = actors.get(&id).ok_or(HostError::NoSuchEntity(id))?;
        self.check(actor.location())?;
        Ok(f(actor))
    }

    pub fn with_actor_mut<R>(
        &self,
        id: EntityId,
        f: impl FnOnce(&mut Actor) -> R,
    ) -> Result<R, HostError> {
        let mut actors = self.actors.write();
        let actor = actors.get_mut(&id).ok_or(HostError::NoSuchEntity(id))?;
        self.check(actor.location())?;
        Ok(f(actor))
    }

    pub fn move_actor(&self, id: EntityId, to: Location) -> Result<(), HostError> {
        self.with_actor_mut(id, |a| a.relocate(to))
    }

    pub fn send_message(&self, id: EntityId, text: impl Into<String>) -> Result<(), HostError> {
        self.with_actor_mut(id, |a| a.send_message(text))
    }

    /// Permission lookups are thread-safe in the host and skip the affinity check.
    pub fn has_permission(&self, id: EntityId, permission: &str) -> bool {
        self.actors
            .read()
            .get(&id)
            .is_some_and(|a| a.has_permission(permission))
    }

    // -- blocks and drops --------------------------------------------------

    pub fn set_block(&self, pos: BlockPos, kind: BlockKind) -> Result<(), HostError> {
        self.check(&pos.center())?;
        let old = if kind.is_air() {
            self.blocks.write().remove(&pos)
        } else {
            self.blocks.write().insert(pos.clone(), kind.clone())
        }
        .unwrap_or_default();
        if old != kind {
            self.record(WorldEvent::BlockChanged { pos, old, new: kind });
        }
        Ok(())
    }

    pub fn block_kind(&self, pos: &BlockPos) -> Result<BlockKind, HostError> {
        self.check(&pos.center())?;
        Ok(self.blocks.read().get(pos).cloned().unwrap_or_default())
    }

    pub fn is_liquid(&self, pos: &BlockPos) -> Result<bool, HostError> {
        Ok(self.block_kind(pos)?.is_liquid())
    }

    pub fn drop_item(&self, location: Location, item: ItemStack) -> Result<(), HostError> {
        self.check(&location)?;
        self.dropped.lock().push(DroppedItem {
            location: location.clone(),
            item: item.clone(),
        });
        self.record(WorldEvent::ItemDropped { location, item });
        Ok(())
    }

    pub fn dropped_items(&self) -> Vec<DroppedItem> {
        self.dropped.lock().clone()
    }

    // -- routing -----------------------------------------------------------

    /// Current location of any merchant or actor. Never affinity checked.
    pub fn locate(&self, id: EntityId) -> Option<Location> {
        if let Some(m) = self.merchants.read().get(&id) {
            return Some(m.location().clone());
        }
        self.actors.read().get(&id).map(|a| a.location().clone())
    }

    pub fn is_valid(&self, id: EntityId) -> bool {
        self.merchants.read().contains_key(&id) || self.actors.read().contains_key(&id)
    }

    pub fn is_merchant(&self, id: EntityId) -> bool {
        self.merchants.read().contains_key(&id)
    }
}

impl EntityLocator for HostWorld {
    fn locate(&self, id: EntityId) -> Option<Location> {
        HostWorld::locate(self, id)
    }

    fn is_valid(&self, id: EntityId) -> bool {
        HostWorld::is_valid(self, id)
    }
}
