//! End-to-end capture and release.
//!
//! Every step that touches an entity or a block is dispatched to the thread
//! owning it; encoding and decoding run on the async pool in between. Each
//! flow ends in exactly one [`Outcome`], delivered to the caller's callback
//! after the matching message has reached the actor.
//!
//! Capture: trigger, target thread (checks, snapshot), async (encode and
//! build), actor thread (hand check, removal, inventory).
//!
//! Release: trigger (dedup, cooldown, policy), actor thread (reserve the
//! container), async (decode), location thread (surface and policy again,
//! spawn, apply), actor thread (the reserved container comes back empty).
//! A release that does not commit hands the reserved container back.

use crate::cache::SnapshotCache;
use crate::claim::{ClaimAction, ClaimAdapter, ClaimGate};
use crate::config::VesselConfig;
use crate::container::{self, ContainerId, ContainerState, ContainerStyle};
use crate::cooldown::{CooldownGate, FlightGuard, FlightKey};
use crate::error::CaptureError;
use crate::mapper::{self, DISCOUNT_TAG, OWNER_TAG, SOURCE_TAG};
use crate::messages::{MessageKey, Messages};
use crate::outcome::{Guidance, Outcome, Rejection, Summary};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use vessel_affinity::{AffinityScheduler, ScheduleError, TaskId};
use vessel_common::{BlockFace, BlockPos, Clock, EntityId, Location, SystemClock};
use vessel_kernel::{
    HostError, HostWorld, INVENTORY_SIZE, Inventory, ItemStack, SpawnReason, TagValue, WorldEvent,
};
use vessel_persist::model::UNKNOWN_SOURCE;
use vessel_persist::{Snapshot, encode};

/// Discount written onto merchants cured back from a zombified form.
pub const CURED_DISCOUNT: f64 = 0.75;

/// Receives the outcome of one flow. Called exactly once.
pub type Callback = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// Answers permission questions for actors. Callable from any thread.
pub trait PermissionOracle: Send + Sync {
    fn has_permission(&self, actor: EntityId, permission: &str) -> bool;
}

impl PermissionOracle for HostWorld {
    fn has_permission(&self, actor: EntityId, permission: &str) -> bool {
        HostWorld::has_permission(self, actor, permission)
    }
}

/// An actor used its held item on an entity.
#[derive(Debug, Clone)]
pub struct EntityInteraction {
    pub actor: EntityId,
    pub target: EntityId,
    handled: bool,
}

impl EntityInteraction {
    pub fn new(actor: EntityId, target: EntityId) -> Self {
        Self {
            actor,
            target,
            handled: false,
        }
    }

    /// The host must skip its default behaviour for this interaction.
    pub fn is_handled(&self) -> bool {
        self.handled
    }
}

/// An actor used its held item on a block face, or on nothing.
#[derive(Debug, Clone)]
pub struct BlockInteraction {
    pub actor: EntityId,
    /// `None` when the actor clicked into the air.
    pub clicked: Option<BlockPos>,
    pub face: BlockFace,
    handled: bool,
}

impl BlockInteraction {
    pub fn new(actor: EntityId, clicked: Option<BlockPos>, face: BlockFace) -> Self {
        Self {
            actor,
            clicked,
            face,
            handled: false,
        }
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowKind {
    Capture,
    Release,
}

/// A container taken out of the actor's inventory while its release runs.
#[derive(Debug, Clone)]
struct Reservation {
    item: ItemStack,
    slot: usize,
    /// Where the actor stood when it was taken.
    location: Location,
}

struct Pending {
    done: Callback,
    guard: Option<FlightGuard>,
    reserved: Option<Reservation>,
}

/// The outcome side of one flow, shared by all of its continuations.
///
/// The first settle wins and later ones are ignored. Dropping the last
/// continuation of an unsettled flow settles it as failed with
/// [`ScheduleError::Dropped`]. A reserved container goes back to the actor
/// unless the flow committed.
struct Settlement {
    coordinator: Arc<Coordinator>,
    actor: EntityId,
    kind: FlowKind,
    pending: Mutex<Option<Pending>>,
}

impl Settlement {
    fn settle(&self, outcome: Outcome) {
        let Some(pending) = self.pending.lock().take() else {
            return;
        };
        self.conclude(pending, outcome);
    }

    fn conclude(&self, pending: Pending, outcome: Outcome) {
        let Pending {
            done,
            guard,
            reserved,
        } = pending;
        drop(guard);
        let c = &self.coordinator;
        if let Some(reservation) = reserved {
            if !outcome.is_committed() {
                c.refund(self.actor, reservation);
            }
        }
        match &outcome {
            Outcome::Committed(summary) => {
                tracing::info!(actor = %self.actor, kind = ?self.kind, %summary, "committed")
            }
            Outcome::Rejected(reason) => {
                tracing::debug!(actor = %self.actor, kind = ?self.kind, %reason, "rejected")
            }
            Outcome::Failed(cause) => {
                tracing::error!(actor = %self.actor, kind = ?self.kind, %cause, "failed")
            }
        }
        match c.message_for(self.kind, &outcome) {
            Some(text) => c.deliver(self.actor, text, move || done(outcome)),
            None => done(outcome),
        }
    }
}

impl Drop for Settlement {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            tracing::error!(actor = %self.actor, kind = ?self.kind, "flow abandoned");
            self.conclude(pending, Outcome::Failed(ScheduleError::Dropped.to_string()));
        }
    }
}

/// One running flow, cloned into each continuation.
#[derive(Clone)]
struct Flow {
    coordinator: Arc<Coordinator>,
    actor: EntityId,
    state: Arc<Settlement>,
}

impl Flow {
    fn new(
        coordinator: &Arc<Coordinator>,
        actor: EntityId,
        kind: FlowKind,
        done: Callback,
        guard: Option<FlightGuard>,
    ) -> Self {
        Self {
            coordinator: Arc::clone(coordinator),
            actor,
            state: Arc::new(Settlement {
                coordinator: Arc::clone(coordinator),
                actor,
                kind,
                pending: Mutex::new(Some(Pending {
                    done,
                    guard,
                    reserved: None,
                })),
            }),
        }
    }

    fn finish(&self, outcome: Outcome) {
        self.state.settle(outcome);
    }

    fn reject(&self, reason: Rejection) {
        self.finish(Outcome::Rejected(reason));
    }

    fn fail(&self, error: impl Into<CaptureError>) {
        self.finish(Outcome::Failed(error.into().to_string()));
    }

    /// A dispatch error: a retired entity is a rejection, anything else a failure.
    fn dispatch_failed(&self, error: ScheduleError, retired: Rejection) {
        match error {
            ScheduleError::EntityRetired(_) => self.reject(retired),
            other => self.fail(other),
        }
    }

    /// Give up the callback to hand it to another flow.
    fn hand_off(&self) -> Option<Callback> {
        self.state.pending.lock().take().map(|p| p.done)
    }

    /// Keep a reserved container with the flow. A flow that already ended
    /// refunds it straight away.
    fn hold(&self, reservation: Reservation) {
        let late = match self.state.pending.lock().as_mut() {
            Some(p) => {
                p.reserved = Some(reservation);
                None
            }
            None => Some(reservation),
        };
        if let Some(reservation) = late {
            self.coordinator.refund(self.actor, reservation);
        }
    }

    fn take_reservation(&self) -> Option<Reservation> {
        self.state
            .pending
            .lock()
            .as_mut()
            .and_then(|p| p.reserved.take())
    }
}

/// What happened when swapping one item for another in an inventory.
enum Exchange {
    /// Swapped. Holds what did not fit.
    Done(Option<ItemStack>),
    /// No source item left to take; the product was not placed.
    SourceMissing(ItemStack),
}

/// First slot holding a matching item, the held slot first.
fn find_source(
    inventory: &Inventory,
    is_source: impl Fn(&ItemStack) -> bool,
) -> Option<(usize, ItemStack)> {
    std::iter::once(inventory.held_slot())
        .chain(0..INVENTORY_SIZE)
        .find_map(|slot| {
            inventory
                .get(slot)
                .filter(|item| is_source(*item))
                .map(|item| (slot, item.clone()))
        })
}

/// Take one matching item, preferring the held slot, and put `product` in
/// its place: a lone source is replaced in the slot, a stack is decremented
/// and the product added to the inventory.
fn exchange(
    inventory: &mut Inventory,
    is_source: impl Fn(&ItemStack) -> bool,
    product: ItemStack,
) -> Result<Exchange, HostError> {
    let Some((slot, mut source)) = find_source(inventory, is_source) else {
        return Ok(Exchange::SourceMissing(product));
    };
    if source.amount > 1 {
        source.amount -= 1;
        inventory.set(slot, Some(source))?;
        Ok(Exchange::Done(inventory.add_item(product)))
    } else {
        inventory.set(slot, Some(product))?;
        Ok(Exchange::Done(None))
    }
}

/// Remove one matching item. Returns the slot it came from and the item.
fn take_one(
    inventory: &mut Inventory,
    is_source: impl Fn(&ItemStack) -> bool,
) -> Result<Option<(usize, ItemStack)>, HostError> {
    let Some((slot, mut stack)) = find_source(inventory, is_source) else {
        return Ok(None);
    };
    let mut one = stack.clone();
    one.amount = 1;
    let rest = (stack.amount > 1).then(|| {
        stack.amount -= 1;
        stack
    });
    inventory.set(slot, rest)?;
    Ok(Some((slot, one)))
}

/// Put `item` into `slot` if it is free, otherwise wherever it fits.
/// Returns what did not fit.
fn place(
    inventory: &mut Inventory,
    slot: usize,
    item: ItemStack,
) -> Result<Option<ItemStack>, HostError> {
    if inventory.get(slot).is_none() {
        inventory.set(slot, Some(item))?;
        return Ok(None);
    }
    Ok(inventory.add_item(item))
}

/// Coordinates capture and release over a host world and a scheduler.
///
/// Owns the cooldown maps, the in-flight set, the snapshot cache and the
/// claim gate for its whole lifetime; [`Coordinator::shutdown`] clears them
/// and stops the scheduler.
pub struct Coordinator {
    world: Arc<HostWorld>,
    scheduler: Arc<dyn AffinityScheduler>,
    permissions: Arc<dyn PermissionOracle>,
    config: VesselConfig,
    style: ContainerStyle,
    messages: Messages,
    clock: Arc<dyn Clock>,
    cooldowns: CooldownGate,
    cache: SnapshotCache,
    claims: Arc<ClaimGate>,
    timers: Mutex<Vec<TaskId>>,
    stopped: AtomicBool,
}

impl Coordinator {
    pub fn start(
        world: Arc<HostWorld>,
        scheduler: Arc<dyn AffinityScheduler>,
        config: VesselConfig,
    ) -> Result<Arc<Self>, CaptureError> {
        let permissions: Arc<dyn PermissionOracle> = world.clone();
        Self::start_with(
            world,
            scheduler,
            config,
            permissions,
            Arc::new(SystemClock),
            Vec::new(),
        )
    }

    /// Start with explicit collaborators: where permissions come from, the
    /// clock and the claim adapters. Schedules the cooldown and cache sweeps.
    pub fn start_with(
        world: Arc<HostWorld>,
        scheduler: Arc<dyn AffinityScheduler>,
        config: VesselConfig,
        permissions: Arc<dyn PermissionOracle>,
        clock: Arc<dyn Clock>,
        claim_adapters: Vec<Arc<dyn ClaimAdapter>>,
    ) -> Result<Arc<Self>, CaptureError> {
        let claims = Arc::new(ClaimGate::new(
            Arc::clone(&scheduler),
            claim_adapters,
            config.claim_retry_max,
            config.claim_retry_period_ticks,
        ));
        let coordinator = Arc::new(Self {
            permissions,
            style: ContainerStyle {
                name: config.container_name.clone(),
                custom_model_data: config.custom_model_data,
            },
            messages: Messages::new(config.messages.clone()),
            cooldowns: CooldownGate::new(
                Arc::clone(&clock),
                config.actor_cooldown_ms,
                config.location_cooldown_ms,
            ),
            cache: SnapshotCache::new(Arc::clone(&clock), config.cache_ttl_ms),
            world,
            scheduler,
            config,
            clock,
            claims,
            timers: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        });
        coordinator.schedule_sweeps()?;
        tracing::info!(topology = coordinator.scheduler.topology(), "coordinator started");
        Ok(coordinator)
    }

    fn schedule_sweeps(self: &Arc<Self>) -> Result<(), CaptureError> {
        let period = self.config.cooldown_sweep_ticks.max(1);
        let weak = Arc::downgrade(self);
        let cooldowns = self.scheduler.run_global_timer(
            period,
            period,
            Box::new(move || {
                if let Some(c) = weak.upgrade() {
                    c.cooldowns.sweep();
                }
            }),
        )?;
        let period = self.config.cache_sweep_ticks.max(1);
        let weak = Arc::downgrade(self);
        let cache = self.scheduler.run_async_timer(
            period,
            period,
            Box::new(move || {
                if let Some(c) = weak.upgrade() {
                    c.cache.purge_expired();
                }
            }),
        )?;
        self.timers.lock().extend([cooldowns, cache]);
        Ok(())
    }

    pub fn config(&self) -> &VesselConfig {
        &self.config
    }

    pub fn claims(&self) -> &Arc<ClaimGate> {
        &self.claims
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn cooldowns(&self) -> &CooldownGate {
        &self.cooldowns
    }

    pub fn is_container(&self, item: &ItemStack) -> bool {
        container::is_container(item)
    }

    pub fn is_valid_container(&self, item: &ItemStack) -> bool {
        container::is_valid(item)
    }

    pub fn status(&self) -> String {
        format!(
            "topology={} tasks={} cached={} cooldowns={} {}",
            self.scheduler.topology(),
            self.scheduler.active_tasks(),
            self.cache.len(),
            self.cooldowns.len(),
            self.claims.status()
        )
    }

    fn message_for(&self, kind: FlowKind, outcome: &Outcome) -> Option<String> {
        match outcome {
            Outcome::Committed(summary) => {
                let key = match kind {
                    FlowKind::Capture => MessageKey::Captured,
                    FlowKind::Release => MessageKey::Released,
                };
                Some(self.messages.resolve(key, &[&summary.title()]))
            }
            Outcome::Rejected(reason) => reason
                .message_key()
                .map(|key| self.messages.resolve(key, &[])),
            Outcome::Failed(_) => Some(self.messages.resolve(MessageKey::Failed, &[])),
        }
    }

    /// Send `text` to the actor on its own thread, then run `then`.
    /// `then` runs even if the actor is gone.
    fn deliver(&self, actor: EntityId, text: String, then: impl FnOnce() + Send + 'static) {
        if self.scheduler.owns_entity(actor) {
            if let Err(error) = self.world.send_message(actor, text) {
                tracing::debug!(%actor, %error, "message not delivered");
            }
            then();
            return;
        }
        let then = Arc::new(Mutex::new(Some(then)));
        let on_retire = Arc::clone(&then);
        let fallback = Arc::clone(&then);
        let world = Arc::clone(&self.world);
        let sent = self.scheduler.run_at_entity(
            actor,
            Box::new(move || {
                if let Err(error) = world.send_message(actor, text) {
                    tracing::debug!(%actor, %error, "message not delivered");
                }
                if let Some(then) = then.lock().take() {
                    then();
                }
            }),
            Some(Box::new(move || {
                if let Some(then) = on_retire.lock().take() {
                    then();
                }
            })),
        );
        if let Err(error) = sent {
            tracing::debug!(%actor, %error, "message not scheduled");
            if let Some(then) = fallback.lock().take() {
                then();
            }
        }
    }

    fn may(&self, actor: EntityId, permission: &str) -> bool {
        !self.config.check_permissions || self.permissions.has_permission(actor, permission)
    }

    fn claim_allows(&self, actor: EntityId, location: &Location, action: ClaimAction) -> bool {
        self.permissions
            .has_permission(actor, &self.config.permissions.bypass_claim)
            || self.claims.allows(actor, location, action)
    }

    // -- capture -----------------------------------------------------------

    /// Capture `target` into the empty container the actor is holding.
    pub fn capture(
        self: &Arc<Self>,
        actor: EntityId,
        target: EntityId,
        done: impl FnOnce(Outcome) + Send + 'static,
    ) {
        let _span = tracing::debug_span!("capture", %actor, %target).entered();
        let Some(guard) = self.cooldowns.try_begin(FlightKey::Capture { target }) else {
            done(Outcome::Rejected(Rejection::DuplicateInFlight));
            return;
        };
        let flow = Flow::new(self, actor, FlowKind::Capture, Box::new(done), Some(guard));
        if let Err(reason) = self.precheck_capture(actor, target) {
            flow.reject(reason);
            return;
        }
        let on_target = flow.clone();
        let retired = flow.clone();
        let dispatched = self.scheduler.run_at_entity(
            target,
            Box::new(move || on_target.snapshot_target(target)),
            Some(Box::new(move || retired.reject(Rejection::TargetInvalid))),
        );
        if let Err(error) = dispatched {
            flow.dispatch_failed(error, Rejection::TargetInvalid);
        }
    }

    fn precheck_capture(&self, actor: EntityId, target: EntityId) -> Result<(), Rejection> {
        if !self.may(actor, &self.config.permissions.capture) {
            return Err(Rejection::NoPermission);
        }
        let location = self
            .world
            .locate(target)
            .filter(|_| self.world.is_merchant(target))
            .ok_or(Rejection::TargetInvalid)?;
        if self.config.is_world_disabled(&location.world) {
            return Err(Rejection::WorldDisabled);
        }
        Ok(())
    }

    /// Blocks the calling thread. Never call from an affinity thread.
    pub fn capture_blocking(self: &Arc<Self>, actor: EntityId, target: EntityId) -> Outcome {
        let (tx, rx) = bounded(1);
        self.capture(actor, target, move |outcome| {
            let _ = tx.send(outcome);
        });
        self.wait(rx)
    }

    // -- release -----------------------------------------------------------

    /// Release the merchant held in `container` at `spawn`.
    ///
    /// `container` only identifies the vessel. The matching item is taken out
    /// of the actor's inventory before anything spawns and handed back if the
    /// release does not commit.
    pub fn release(
        self: &Arc<Self>,
        actor: EntityId,
        container: ItemStack,
        spawn: Location,
        done: impl FnOnce(Outcome) + Send + 'static,
    ) {
        let _span = tracing::debug_span!("release", %actor, at = %spawn).entered();
        let Some(id) = container::fingerprint(&container) else {
            Flow::new(self, actor, FlowKind::Release, Box::new(done), None)
                .reject(Rejection::NotAContainer);
            return;
        };
        let Some(guard) = self.cooldowns.try_begin(FlightKey::Release {
            actor,
            container: id,
        }) else {
            done(Outcome::Rejected(Rejection::DuplicateInFlight));
            return;
        };
        let flow = Flow::new(self, actor, FlowKind::Release, Box::new(done), Some(guard));
        if !self.cooldowns.check_release(actor, &spawn.block(), id) {
            flow.reject(Rejection::TooFast);
            return;
        }
        if let Err(reason) = self.precheck_release(actor, &spawn) {
            flow.reject(reason);
            return;
        }
        let next = flow.clone();
        let retired = flow.clone();
        if let Err(error) = self.scheduler.run_at_entity(
            actor,
            Box::new(move || next.reserve(id, spawn)),
            Some(Box::new(move || retired.reject(Rejection::ContainerGone))),
        ) {
            flow.dispatch_failed(error, Rejection::ContainerGone);
        }
    }

    fn precheck_release(&self, actor: EntityId, spawn: &Location) -> Result<(), Rejection> {
        if !self.may(actor, &self.config.permissions.release) {
            return Err(Rejection::NoReleasePermission);
        }
        if self.config.is_world_disabled(&spawn.world) {
            return Err(Rejection::WorldDisabled);
        }
        Ok(())
    }

    /// Blocks the calling thread. Never call from an affinity thread.
    pub fn release_blocking(
        self: &Arc<Self>,
        actor: EntityId,
        container: ItemStack,
        spawn: Location,
    ) -> Outcome {
        let (tx, rx) = bounded(1);
        self.release(actor, container, spawn, move |outcome| {
            let _ = tx.send(outcome);
        });
        self.wait(rx)
    }

    fn wait(&self, rx: Receiver<Outcome>) -> Outcome {
        let timeout = self.config.sync_timeout();
        match rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(?timeout, "flow did not finish in time");
                Outcome::Failed(ScheduleError::Timeout(timeout).to_string())
            }
            Err(RecvTimeoutError::Disconnected) => {
                Outcome::Failed(ScheduleError::Dropped.to_string())
            }
        }
    }

    // -- interaction events ------------------------------------------------

    /// Route an entity interaction. Returns whether it was taken; `done`
    /// runs only for taken interactions. Call on the actor's thread.
    pub fn on_interact_entity(
        self: &Arc<Self>,
        event: &mut EntityInteraction,
        done: impl FnOnce(Outcome) + Send + 'static,
    ) -> bool {
        let actor = event.actor;
        let held = match self.world.with_actor(actor, |a| a.inventory.held_item().cloned()) {
            Ok(Some(held)) => held,
            Ok(None) => return false,
            Err(error) => {
                tracing::warn!(%actor, %error, "interaction from an unreadable actor");
                return false;
            }
        };
        let on_merchant = self.world.is_merchant(event.target);
        if container::is_container(&held) {
            event.handled = true;
            let guidance = if on_merchant {
                Guidance::UseEmptyContainer
            } else {
                Guidance::ReleaseOnly
            };
            Flow::new(self, actor, FlowKind::Capture, Box::new(done), None)
                .reject(Rejection::Misuse(guidance));
            return true;
        }
        if on_merchant && container::is_empty_container(&held) {
            event.handled = true;
            self.capture(actor, event.target, done);
            return true;
        }
        false
    }

    /// Route a block interaction. Returns whether it was taken; `done`
    /// runs only for taken interactions. Call on the actor's thread.
    pub fn on_interact_block(
        self: &Arc<Self>,
        event: &mut BlockInteraction,
        done: impl FnOnce(Outcome) + Send + 'static,
    ) -> bool {
        let actor = event.actor;
        let held = match self.world.with_actor(actor, |a| a.inventory.held_item().cloned()) {
            Ok(Some(held)) if container::is_container(&held) => held,
            Ok(_) => return false,
            Err(error) => {
                tracing::warn!(%actor, %error, "interaction from an unreadable actor");
                return false;
            }
        };
        event.handled = true;
        let flow = Flow::new(self, actor, FlowKind::Release, Box::new(done), None);
        let Some(clicked) = event.clicked.clone() else {
            flow.reject(Rejection::Misuse(Guidance::ClickBlock));
            return true;
        };
        let face = event.face;
        let next = flow.clone();
        if let Err(error) = self.scheduler.run_at_location(
            &clicked.center(),
            Box::new(move || next.inspect_clicked(held, clicked, face)),
        ) {
            flow.fail(error);
        }
        true
    }

    // -- host events -------------------------------------------------------

    /// Keep the snapshot cache and merchant tags in step with the world.
    pub fn handle_world_event(self: &Arc<Self>, event: &WorldEvent) {
        match event {
            WorldEvent::MerchantSpawned { id, reason, .. } if *reason != SpawnReason::Restored => {
                let (id, reason) = (*id, *reason);
                let this = Arc::clone(self);
                if let Err(error) = self
                    .scheduler
                    .run_at_entity(id, Box::new(move || this.track_spawn(id, reason)), None)
                {
                    tracing::debug!(%id, %error, "spawn not tracked");
                }
            }
            WorldEvent::MerchantDied { id } | WorldEvent::MerchantRemoved { id } => {
                self.cache.remove(*id);
            }
            WorldEvent::ChunkUnloaded { merchants, .. } => {
                for id in merchants.iter().copied() {
                    let this = Arc::clone(self);
                    if let Err(error) = self
                        .scheduler
                        .run_at_entity(id, Box::new(move || this.refresh(id)), None)
                    {
                        tracing::debug!(%id, %error, "cache refresh skipped");
                    }
                }
            }
            _ => {}
        }
    }

    fn track_spawn(&self, id: EntityId, reason: SpawnReason) {
        let tagged = self.world.with_merchant_mut(id, |m| {
            let data = m.data_mut();
            data.insert(
                SOURCE_TAG.to_string(),
                TagValue::String(reason.as_str().to_string()),
            );
            if reason == SpawnReason::Cured {
                data.insert(DISCOUNT_TAG.to_string(), TagValue::Double(CURED_DISCOUNT));
            }
        });
        match tagged {
            Ok(()) => self.refresh(id),
            Err(error) => tracing::debug!(%id, %error, "spawn not tagged"),
        }
    }

    fn refresh(&self, id: EntityId) {
        match mapper::snapshot(&self.world, id, self.clock.now_millis(), self.config.save_trades) {
            Ok(Some(snapshot)) => self.cache.put(id, snapshot),
            Ok(None) => {
                self.cache.remove(id);
            }
            Err(error) => tracing::debug!(%id, %error, "cache refresh failed"),
        }
    }

    /// Cancel sweeps and claim retries, clear every map and stop the
    /// scheduler. Idempotent.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        for id in self.timers.lock().drain(..) {
            self.scheduler.cancel(id);
        }
        self.claims.shutdown();
        self.cooldowns.clear();
        self.cache.clear();
        self.scheduler.shutdown();
        tracing::info!("coordinator stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

// -- flow steps --------------------------------------------------------------

impl Flow {
    /// On the target's thread: policy, then the snapshot.
    fn snapshot_target(self, target: EntityId) {
        let c = Arc::clone(&self.coordinator);
        let Some(location) = c.world.locate(target) else {
            return self.reject(Rejection::TargetInvalid);
        };
        if c.config.is_world_disabled(&location.world) {
            return self.reject(Rejection::WorldDisabled);
        }
        let actor = self.actor;
        let owned_by_other = c.world.with_merchant(target, |m| match m.data().get(OWNER_TAG) {
            Some(TagValue::String(owner)) => EntityId::parse(owner) != Some(actor),
            Some(_) => true,
            None => false,
        });
        match owned_by_other {
            Ok(true) => return self.reject(Rejection::TargetOwned),
            Ok(false) => {}
            Err(HostError::NoSuchEntity(_)) => return self.reject(Rejection::TargetInvalid),
            Err(error) => return self.fail(error),
        }
        if !c.claim_allows(actor, &location, ClaimAction::Capture) {
            return self.reject(Rejection::ClaimDenied);
        }
        let mut snapshot = match mapper::snapshot(
            &c.world,
            target,
            c.clock.now_millis(),
            c.config.save_trades,
        ) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return self.reject(Rejection::TargetInvalid),
            Err(error) => return self.fail(error),
        };
        // the live merchant stays untouched until it is removed
        snapshot.capture.captured = true;
        if snapshot.capture.creation_source == UNKNOWN_SOURCE {
            if let Some(cached) = c.cache.get(target) {
                snapshot.capture.creation_source = cached.capture.creation_source;
            }
        }
        let next = self.clone();
        if let Err(error) = c
            .scheduler
            .run_async(Box::new(move || next.encode_snapshot(target, snapshot)))
        {
            self.fail(error);
        }
    }

    /// Off-thread: encode and build the filled container.
    fn encode_snapshot(self, target: EntityId, snapshot: Snapshot) {
        let c = Arc::clone(&self.coordinator);
        let payload = match encode(&snapshot) {
            Ok(payload) => payload,
            Err(error) => return self.fail(error),
        };
        let product = container::build(&snapshot, payload, &c.style);
        let summary = Summary::of(target, &snapshot);
        let next = self.clone();
        let retired = self.clone();
        if let Err(error) = c.scheduler.run_at_entity(
            self.actor,
            Box::new(move || next.commit_capture(target, product, summary)),
            Some(Box::new(move || {
                retired.fail(CaptureError::Host(HostError::NoSuchEntity(retired.actor)))
            })),
        ) {
            self.fail(error);
        }
    }

    /// On the actor's thread: the target goes, the container arrives.
    fn commit_capture(self, target: EntityId, product: ItemStack, summary: Summary) {
        let c = Arc::clone(&self.coordinator);
        let holding = c.world.with_actor(self.actor, |a| {
            a.inventory
                .held_item()
                .is_some_and(container::is_empty_container)
        });
        match holding {
            Ok(true) => {}
            Ok(false) => return self.reject(Rejection::ContainerGone),
            Err(error) => return self.fail(error),
        }
        if c.scheduler.owns_entity(target) {
            match c.world.remove_merchant(target) {
                Ok(merchant) => {
                    let last_seen = merchant.location().clone();
                    self.hand_over_container(product, summary, last_seen);
                }
                Err(HostError::NoSuchEntity(_)) => self.reject(Rejection::TargetInvalid),
                Err(error) => self.fail(error),
            }
            return;
        }
        // target lives on another thread: remove it there, then come back
        let next = self.clone();
        let retired = self.clone();
        if let Err(error) = c.scheduler.run_at_entity(
            target,
            Box::new(move || next.remove_remote_target(target, product, summary)),
            Some(Box::new(move || retired.reject(Rejection::TargetInvalid))),
        ) {
            self.dispatch_failed(error, Rejection::TargetInvalid);
        }
    }

    /// On the target's thread. Once the merchant is gone the container must
    /// end up somewhere: with the actor, or where the merchant stood.
    fn remove_remote_target(self, target: EntityId, product: ItemStack, summary: Summary) {
        let c = Arc::clone(&self.coordinator);
        let last_seen = match c.world.remove_merchant(target) {
            Ok(merchant) => merchant.location().clone(),
            Err(HostError::NoSuchEntity(_)) => return self.reject(Rejection::TargetInvalid),
            Err(error) => return self.fail(error),
        };
        let actor = self.actor;
        let next = self.clone();
        let retired = self.clone();
        let (spot, parcel, note) = (last_seen.clone(), product.clone(), summary.clone());
        let (fallback, leftover, late) = (last_seen.clone(), product.clone(), summary.clone());
        if let Err(error) = c.scheduler.run_at_entity(
            actor,
            Box::new(move || next.hand_over_container(product, summary, last_seen)),
            Some(Box::new(move || retired.strand(spot, parcel, note))),
        ) {
            tracing::warn!(%actor, %target, %error, "actor unreachable after capture");
            self.strand(fallback, leftover, late);
        }
    }

    /// Swap one empty container for the filled one; overflow drops at the
    /// actor's feet. An actor that cannot be reached gets nothing and the
    /// container is left at `last_seen`.
    fn hand_over_container(self, product: ItemStack, summary: Summary, last_seen: Location) {
        let c = Arc::clone(&self.coordinator);
        let spare = product.clone();
        let swapped = c.world.with_actor_mut(self.actor, |a| {
            let location = a.location().clone();
            let leftover = match exchange(&mut a.inventory, container::is_empty_container, product)? {
                Exchange::Done(leftover) => leftover,
                Exchange::SourceMissing(product) => a.inventory.add_item(product),
            };
            Ok::<_, HostError>((leftover, location))
        });
        match swapped.and_then(|inner| inner) {
            Ok((leftover, location)) => {
                if let Some(item) = leftover {
                    if let Err(error) = c.drop_for_actor(self.actor, location, item) {
                        return self.fail(error);
                    }
                }
                self.finish(Outcome::Committed(summary));
            }
            Err(error) => {
                tracing::warn!(actor = %self.actor, %error, "vessel not handed over");
                self.strand(last_seen, spare, summary);
            }
        }
    }

    /// The merchant is already out: leave the filled container on the
    /// ground at `at` and commit.
    fn strand(self, at: Location, product: ItemStack, summary: Summary) {
        let c = Arc::clone(&self.coordinator);
        tracing::warn!(actor = %self.actor, %at, "vessel left where the merchant stood");
        let next = self.clone();
        let spot = at.clone();
        if let Err(error) = c.scheduler.run_at_location(
            &at,
            Box::new(move || match next.coordinator.world.drop_item(spot, product) {
                Ok(()) => next.finish(Outcome::Committed(summary)),
                Err(error) => next.fail(error),
            }),
        ) {
            tracing::error!(actor = %self.actor, %at, %error, "captured merchant lost");
            self.fail(error);
        }
    }

    /// On the clicked block's thread: fluids and fluid containers refuse a release.
    fn inspect_clicked(self, held: ItemStack, clicked: BlockPos, face: BlockFace) {
        let c = Arc::clone(&self.coordinator);
        match c.world.block_kind(&clicked) {
            Ok(kind) if kind.is_liquid() || kind.is_fluid_container() => {
                return self.reject(Rejection::LiquidSurface);
            }
            Ok(_) => {}
            Err(error) => return self.fail(error),
        }
        let spawn = clicked.relative(face).center();
        if c.scheduler.owns_location(&spawn) {
            match c.world.is_liquid(&spawn.block()) {
                Ok(true) => return self.reject(Rejection::LiquidSurface),
                Ok(false) => {}
                Err(error) => return self.fail(error),
            }
        }
        if let Some(done) = self.hand_off() {
            c.release(self.actor, held, spawn, done);
        }
    }

    /// On the actor's thread: take one matching container out of the
    /// inventory for the rest of the release.
    fn reserve(self, id: ContainerId, spawn: Location) {
        let c = Arc::clone(&self.coordinator);
        let taken = c.world.with_actor_mut(self.actor, |a| {
            let location = a.location().clone();
            let found = take_one(&mut a.inventory, |item| container::fingerprint(item) == Some(id))?;
            Ok::<_, HostError>(found.map(|(slot, item)| Reservation {
                item,
                slot,
                location,
            }))
        });
        let reservation = match taken.and_then(|inner| inner) {
            Ok(Some(reservation)) => reservation,
            Ok(None) => {
                tracing::debug!(actor = %self.actor, container = %id, "vessel no longer held");
                return self.reject(Rejection::ContainerGone);
            }
            Err(HostError::NoSuchEntity(_)) => return self.reject(Rejection::ContainerGone),
            Err(error) => return self.fail(error),
        };
        let container = reservation.item.clone();
        self.hold(reservation);
        let next = self.clone();
        if let Err(error) = c
            .scheduler
            .run_async(Box::new(move || next.decode_container(container, id, spawn)))
        {
            self.fail(error);
        }
    }

    /// Off-thread: decode and check completeness.
    fn decode_container(self, container: ItemStack, id: ContainerId, spawn: Location) {
        let c = Arc::clone(&self.coordinator);
        let snapshot = match container::inspect(&container) {
            ContainerState::Valid(decoded) => decoded.snapshot,
            ContainerState::Incomplete(decoded) => {
                tracing::warn!(container = %id, missing = ?decoded.missing, "incomplete vessel");
                return self.reject(Rejection::IncompleteSnapshot);
            }
            ContainerState::Corrupt(error) => {
                tracing::warn!(container = %id, %error, "unreadable vessel");
                return self.reject(Rejection::IncompleteSnapshot);
            }
            ContainerState::NotAContainer => return self.reject(Rejection::NotAContainer),
        };
        let next = self.clone();
        let location = spawn.clone();
        if let Err(error) = c.scheduler.run_at_location(
            &location,
            Box::new(move || next.restore_at(spawn, snapshot)),
        ) {
            self.fail(error);
        }
    }

    /// On the spawn location's thread: re-check, spawn, apply.
    fn restore_at(self, spawn: Location, snapshot: Snapshot) {
        let c = Arc::clone(&self.coordinator);
        let actor = self.actor;
        match c.world.block_kind(&spawn.block()) {
            Ok(kind) if kind.is_liquid() || kind.is_fluid_container() => {
                return self.reject(Rejection::LiquidSurface);
            }
            Ok(_) => {}
            Err(error) => return self.fail(error),
        }
        if let Err(reason) = c.precheck_release(actor, &spawn) {
            return self.reject(reason);
        }
        if !c.claim_allows(actor, &spawn, ClaimAction::Build) {
            return self.reject(Rejection::ClaimDenied);
        }
        let merchant = match c.world.spawn_merchant(spawn.clone(), SpawnReason::Restored) {
            Ok(merchant) => merchant,
            Err(error) => return self.fail(error),
        };
        if let Err(error) = mapper::apply(&c.world, merchant, &snapshot, c.config.save_trades) {
            tracing::error!(%actor, %merchant, %error, "snapshot only partly applied");
            return self.fail(error);
        }
        c.cache.put(merchant, snapshot.clone());
        let summary = Summary::of(merchant, &snapshot);
        let next = self.clone();
        let retired = self.clone();
        let late = summary.clone();
        let unreachable = summary.clone();
        if let Err(error) = c.scheduler.run_at_entity(
            actor,
            Box::new(move || next.return_empty(summary)),
            Some(Box::new(move || {
                tracing::warn!(%actor, "actor left before the vessel was emptied");
                retired.finish(Outcome::Committed(late));
            })),
        ) {
            // the merchant is out either way
            tracing::warn!(%actor, %error, "vessel not emptied");
            self.finish(Outcome::Committed(unreachable));
        }
    }

    /// On the actor's thread: the reserved container comes back empty.
    fn return_empty(self, summary: Summary) {
        let c = Arc::clone(&self.coordinator);
        let Some(Reservation { slot, location, .. }) = self.take_reservation() else {
            return self.finish(Outcome::Committed(summary));
        };
        let placed = c.world.with_actor_mut(self.actor, |a| {
            let at = a.location().clone();
            place(&mut a.inventory, slot, container::empty())
                .map(|leftover| leftover.map(|item| (item, at)))
        });
        match placed.and_then(|inner| inner) {
            Ok(None) => {}
            Ok(Some((item, at))) => {
                if let Err(error) = c.drop_for_actor(self.actor, at, item) {
                    tracing::warn!(actor = %self.actor, %error, "empty vessel not dropped");
                }
            }
            Err(error) => {
                tracing::warn!(actor = %self.actor, %error, "empty vessel not returned");
                c.leave_at(location, container::empty());
            }
        }
        self.finish(Outcome::Committed(summary));
    }
}

impl Coordinator {
    fn drop_for_actor(&self, actor: EntityId, location: Location, item: ItemStack) -> Result<(), HostError> {
        self.world.drop_item(location, item)?;
        self.world
            .send_message(actor, self.messages.resolve(MessageKey::InventoryFull, &[]))
    }

    /// Drop `item` on the ground at `at`, on the thread owning it.
    fn leave_at(&self, at: Location, item: ItemStack) {
        let world = Arc::clone(&self.world);
        let spot = at.clone();
        let sent = self.scheduler.run_at_location(
            &at,
            Box::new(move || {
                if let Err(error) = world.drop_item(spot, item) {
                    tracing::error!(%error, "item lost");
                }
            }),
        );
        if let Err(error) = sent {
            tracing::error!(%at, %error, "item lost");
        }
    }

    /// Hand a reserved container back on the actor's thread. An actor that
    /// left gets it dropped where it stood when the container was taken.
    fn refund(self: &Arc<Self>, actor: EntityId, reservation: Reservation) {
        if self.scheduler.owns_entity(actor) {
            return self.give_back(actor, reservation);
        }
        let cell = Arc::new(Mutex::new(Some(reservation)));
        let (back, on_retire) = (Arc::clone(&cell), Arc::clone(&cell));
        let (c, gone) = (Arc::clone(self), Arc::clone(self));
        let sent = self.scheduler.run_at_entity(
            actor,
            Box::new(move || {
                if let Some(reservation) = back.lock().take() {
                    c.give_back(actor, reservation);
                }
            }),
            Some(Box::new(move || {
                if let Some(Reservation { item, location, .. }) = on_retire.lock().take() {
                    gone.leave_at(location, item);
                }
            })),
        );
        if let Err(error) = sent {
            tracing::warn!(%actor, %error, "refund not scheduled");
            if let Some(Reservation { item, location, .. }) = cell.lock().take() {
                self.leave_at(location, item);
            }
        }
    }

    fn give_back(&self, actor: EntityId, reservation: Reservation) {
        let Reservation {
            item,
            slot,
            location,
        } = reservation;
        let spare = item.clone();
        let placed = self.world.with_actor_mut(actor, |a| {
            let at = a.location().clone();
            place(&mut a.inventory, slot, item).map(|leftover| leftover.map(|item| (item, at)))
        });
        match placed.and_then(|inner| inner) {
            Ok(None) => {}
            Ok(Some((item, at))) => {
                if let Err(error) = self.drop_for_actor(actor, at, item) {
                    tracing::warn!(%actor, %error, "refund not dropped");
                }
            }
            Err(error) => {
                tracing::warn!(%actor, %error, "refund not returned");
                self.leave_at(location, spare);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vessel_kernel::item::BUCKET;

    fn filled() -> ItemStack {
        let snapshot = Snapshot::default();
        container::build(&snapshot, encode(&snapshot).unwrap(), &ContainerStyle::default())
    }

    #[test]
    fn exchange_replaces_a_lone_held_item() {
        let mut inv = Inventory::default();
        inv.set_held_item(Some(ItemStack::new(BUCKET, 1)));
        let out = exchange(&mut inv, container::is_empty_container, filled()).unwrap();
        assert!(matches!(out, Exchange::Done(None)));
        assert!(inv.held_item().is_some_and(container::is_container));
    }

    #[test]
    fn exchange_decrements_a_stack_and_adds_the_product() {
        let mut inv = Inventory::default();
        inv.set_held_item(Some(ItemStack::new(BUCKET, 3)));
        let out = exchange(&mut inv, container::is_empty_container, filled()).unwrap();
        assert!(matches!(out, Exchange::Done(None)));
        assert_eq!(inv.held_item().map(|i| i.amount), Some(2));
        assert_eq!(inv.items().filter(|i| container::is_container(i)).count(), 1);
    }

    #[test]
    fn exchange_overflows_when_full() {
        let mut inv = Inventory::default();
        for slot in 0..INVENTORY_SIZE {
            inv.set(slot, Some(ItemStack::new("dirt", 64))).unwrap();
        }
        inv.set(0, Some(ItemStack::new(BUCKET, 2))).unwrap();
        let out = exchange(&mut inv, container::is_empty_container, filled()).unwrap();
        assert!(matches!(out, Exchange::Done(Some(ref item)) if container::is_container(item)));
    }

    #[test]
    fn exchange_finds_the_source_outside_the_hand() {
        let mut inv = Inventory::default();
        inv.set(5, Some(filled())).unwrap();
        let id = container::fingerprint(&filled());
        let out = exchange(
            &mut inv,
            |i| container::fingerprint(i) == id,
            container::empty(),
        )
        .unwrap();
        assert!(matches!(out, Exchange::Done(None)));
        assert!(inv.get(5).is_some_and(container::is_empty_container));
    }

    #[test]
    fn exchange_reports_a_missing_source() {
        let mut inv = Inventory::default();
        let out = exchange(&mut inv, container::is_empty_container, filled()).unwrap();
        assert!(matches!(out, Exchange::SourceMissing(_)));
    }

    // -- end to end --------------------------------------------------------

    use crate::claim::{Capability, ClaimOracle};
    use crate::container::CONTAINER_KEY;
    use crate::mapper::CAPTURED_TAG;
    use crossbeam_channel::unbounded;
    use std::thread;
    use std::time::{Duration, Instant};
    use vessel_affinity::{
        RegionConfig, RegionCoord, RegionScheduler, SingleOwnerScheduler, run_sync_at_entity,
    };
    use vessel_common::{ManualClock, Profession};
    use vessel_kernel::{Actor, BlockKind, Merchant, MerchantRecipe};

    const WAIT: Duration = Duration::from_secs(5);

    fn at(x: f64, z: f64) -> Location {
        Location::new("world", x, 64.0, z)
    }

    fn ground() -> BlockPos {
        BlockPos::new("world", 5, 63, 0)
    }

    fn spawn_point() -> Location {
        ground().relative(BlockFace::Up).center()
    }

    fn farmer(world: &HostWorld, location: Location) -> EntityId {
        let id = world.spawn_merchant(location, SpawnReason::Natural).unwrap();
        world
            .with_merchant_mut(id, |m| {
                m.set_profession(Profession::Farmer);
                m.set_level(3)?;
                m.set_experience(150)?;
                m.set_recipes(vec![
                    MerchantRecipe::new(
                        vec![ItemStack::new("wheat", 20)],
                        ItemStack::new("emerald", 1),
                        16,
                    ),
                    MerchantRecipe::new(
                        vec![ItemStack::new("emerald", 1)],
                        ItemStack::new("bread", 6),
                        12,
                    ),
                ])
            })
            .unwrap()
            .unwrap();
        id
    }

    /// A world with one actor holding an empty container and one farmer.
    fn stage() -> (Arc<HostWorld>, EntityId, EntityId) {
        let world = Arc::new(HostWorld::new());
        world.set_block(ground(), BlockKind::Stone).unwrap();
        let actor = world.add_actor("steve", at(0.5, 0.5));
        world
            .with_actor_mut(actor, |a| {
                a.grant("vessel.capture");
                a.grant("vessel.release");
                a.inventory.set_held_item(Some(ItemStack::new(BUCKET, 1)));
            })
            .unwrap();
        let merchant = farmer(&world, at(2.5, 0.5));
        (world, actor, merchant)
    }

    fn single(world: &Arc<HostWorld>) -> Arc<dyn AffinityScheduler> {
        Arc::new(SingleOwnerScheduler::start(world.clone(), 2).unwrap())
    }

    fn regions(world: &Arc<HostWorld>) -> Arc<RegionScheduler> {
        let config = RegionConfig {
            workers: 2,
            region_size: 128,
            async_workers: 2,
        };
        Arc::new(RegionScheduler::start(world.clone(), config).unwrap())
    }

    struct Harness {
        world: Arc<HostWorld>,
        scheduler: Arc<dyn AffinityScheduler>,
        coordinator: Arc<Coordinator>,
        actor: EntityId,
    }

    impl Harness {
        fn start(
            world: Arc<HostWorld>,
            scheduler: Arc<dyn AffinityScheduler>,
            actor: EntityId,
            config: VesselConfig,
            clock: Arc<dyn Clock>,
            adapters: Vec<Arc<dyn ClaimAdapter>>,
        ) -> Self {
            let permissions: Arc<dyn PermissionOracle> = world.clone();
            Self::with_permissions(world, scheduler, actor, config, permissions, clock, adapters)
        }

        fn with_permissions(
            world: Arc<HostWorld>,
            scheduler: Arc<dyn AffinityScheduler>,
            actor: EntityId,
            config: VesselConfig,
            permissions: Arc<dyn PermissionOracle>,
            clock: Arc<dyn Clock>,
            adapters: Vec<Arc<dyn ClaimAdapter>>,
        ) -> Self {
            let owner = Arc::clone(&scheduler);
            world.install_affinity_check(move |l: &Location| owner.owns_location(l));
            let coordinator = Coordinator::start_with(
                Arc::clone(&world),
                Arc::clone(&scheduler),
                config,
                permissions,
                clock,
                adapters,
            )
            .unwrap();
            Self {
                world,
                scheduler,
                coordinator,
                actor,
            }
        }

        fn simple(world: Arc<HostWorld>, scheduler: Arc<dyn AffinityScheduler>, actor: EntityId) -> Self {
            Self::start(
                world,
                scheduler,
                actor,
                VesselConfig::default(),
                Arc::new(SystemClock),
                Vec::new(),
            )
        }

        fn on_actor<R: Send + 'static>(&self, f: impl FnOnce(&mut Actor) -> R + Send + 'static) -> R {
            let world = Arc::clone(&self.world);
            let actor = self.actor;
            run_sync_at_entity(&*self.scheduler, actor, WAIT, move || world.with_actor_mut(actor, f))
                .unwrap()
                .unwrap()
        }

        fn on_merchant<R: Send + 'static>(
            &self,
            id: EntityId,
            f: impl FnOnce(&Merchant) -> R + Send + 'static,
        ) -> R {
            let world = Arc::clone(&self.world);
            run_sync_at_entity(&*self.scheduler, id, WAIT, move || world.with_merchant(id, f))
                .unwrap()
                .unwrap()
        }

        fn held(&self) -> Option<ItemStack> {
            self.on_actor(|a| a.inventory.held_item().cloned())
        }

        fn messages(&self) -> Vec<String> {
            self.on_actor(|a| a.messages().to_vec())
        }

        fn capture(&self, target: EntityId) -> Outcome {
            self.coordinator.capture_blocking(self.actor, target)
        }

        fn release_held(&self) -> Outcome {
            let held = self.held().unwrap();
            self.coordinator.release_blocking(self.actor, held, spawn_point())
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.world.clear_affinity_check();
            self.coordinator.shutdown();
        }
    }

    fn eventually(mut probe: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if probe() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn round_trip(h: Harness, merchant: EntityId) {
        let outcome = h.capture(merchant);
        let summary = match outcome {
            Outcome::Committed(summary) => summary,
            other => panic!("capture did not commit: {other}"),
        };
        assert_eq!(summary.entity, merchant);
        assert_eq!(summary.level, 3);
        assert_eq!(summary.trades, 2);
        assert_eq!(h.world.merchant_count(), 0);
        let held = h.held().unwrap();
        assert!(container::is_valid(&held));
        assert!(h.messages().iter().any(|m| m.contains(&summary.title())));

        let outcome = h.release_held();
        let summary = match outcome {
            Outcome::Committed(summary) => summary,
            other => panic!("release did not commit: {other}"),
        };
        assert_eq!(h.world.merchant_count(), 1);
        let (level, experience, trades, profession) = h.on_merchant(summary.entity, |m| {
            (m.level(), m.experience(), m.recipes().len(), m.profession())
        });
        assert_eq!((level, experience, trades), (3, 150, 2));
        assert_eq!(profession, Profession::Farmer);
        assert!(h.held().is_some_and(|i| container::is_empty_container(&i)));
        assert!(h.coordinator.cache().get(summary.entity).is_some());
    }

    #[test]
    fn round_trip_on_a_single_owner() {
        let (world, actor, merchant) = stage();
        let scheduler = single(&world);
        round_trip(Harness::simple(world, scheduler, actor), merchant);
    }

    #[test]
    fn round_trip_across_regions() {
        let (world, actor, merchant) = stage();
        let scheduler = regions(&world);
        round_trip(Harness::simple(world, scheduler, actor), merchant);
    }

    #[test]
    fn capture_reaches_a_target_owned_by_another_region() {
        let (world, actor, _) = stage();
        let far = farmer(&world, at(200.5, 0.5));
        let scheduler = regions(&world);
        scheduler.layout().map().reassign(RegionCoord::new("world", 0, 0), 0);
        scheduler.layout().map().reassign(RegionCoord::new("world", 1, 0), 1);
        let h = Harness::simple(world, scheduler, actor);

        let outcome = h.capture(far);
        assert!(outcome.is_committed(), "{outcome}");
        assert!(!h.world.is_valid(far));
        assert!(h.held().is_some_and(|i| container::is_valid(&i)));
    }

    #[test]
    fn truncated_payload_is_refused_before_spawning() {
        let (world, actor, merchant) = stage();
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);
        assert!(h.capture(merchant).is_committed());

        let mut broken = h.held().unwrap();
        let payload = container::payload(&broken).unwrap().to_string();
        broken.meta.data.insert(
            CONTAINER_KEY.to_string(),
            TagValue::String(payload[..payload.len() / 2].to_string()),
        );
        let in_hand = broken.clone();
        h.on_actor(move |a| a.inventory.set_held_item(Some(in_hand)));
        let outcome = h
            .coordinator
            .release_blocking(h.actor, broken.clone(), spawn_point());
        assert_eq!(outcome.rejection(), Some(&Rejection::IncompleteSnapshot));
        assert_eq!(h.world.merchant_count(), 0);
        // handed back untouched
        assert_eq!(h.held(), Some(broken));
    }

    #[test]
    fn fluid_spawn_surface_is_refused() {
        let (world, actor, merchant) = stage();
        world
            .set_block(spawn_point().block(), BlockKind::Water)
            .unwrap();
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);
        assert!(h.capture(merchant).is_committed());

        let outcome = h.release_held();
        assert_eq!(outcome.rejection(), Some(&Rejection::LiquidSurface));
        assert_eq!(h.world.merchant_count(), 0);
        assert!(h.held().is_some_and(|i| container::is_container(&i)));
    }

    #[test]
    fn duplicate_release_spawns_once() {
        let (world, actor, merchant) = stage();
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);
        assert!(h.capture(merchant).is_committed());
        let held = h.held().unwrap();

        // park the owning thread so both requests overlap
        let (open, gate) = crossbeam_channel::bounded::<()>(1);
        h.scheduler
            .run_global(Box::new(move || {
                let _ = gate.recv_timeout(WAIT);
            }))
            .unwrap();

        let (tx, rx) = unbounded();
        for _ in 0..2 {
            let tx = tx.clone();
            h.coordinator
                .release(h.actor, held.clone(), spawn_point(), move |o| {
                    let _ = tx.send(o);
                });
        }
        let first = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(first.rejection(), Some(&Rejection::DuplicateInFlight));
        open.send(()).unwrap();
        let second = rx.recv_timeout(WAIT).unwrap();
        assert!(second.is_committed(), "{second}");
        assert_eq!(h.world.merchant_count(), 1);
    }

    #[test]
    fn release_cooldown_applies_per_actor_and_spot() {
        let (world, actor, merchant) = stage();
        let other = farmer(&world, at(3.5, 0.5));
        let clock = Arc::new(ManualClock::new(1_000_000));
        let scheduler = single(&world);
        let h = Harness::start(
            world,
            scheduler,
            actor,
            VesselConfig::default(),
            clock.clone(),
            Vec::new(),
        );

        assert!(h.capture(merchant).is_committed());
        assert!(h.release_held().is_committed());
        assert!(h.capture(other).is_committed());

        let outcome = h.release_held();
        assert_eq!(outcome.rejection(), Some(&Rejection::TooFast));
        clock.advance(Duration::from_millis(3001));
        assert!(h.release_held().is_committed());
        assert_eq!(h.world.merchant_count(), 2);
    }

    struct Fenced;

    impl ClaimOracle for Fenced {
        fn can_build(&self, _: EntityId, _: &Location) -> bool {
            true
        }

        fn can_capture(&self, _: EntityId, _: &Location) -> bool {
            false
        }

        fn can_destroy(&self, _: EntityId, _: &Location) -> bool {
            true
        }
    }

    struct FencePlugin;

    impl ClaimAdapter for FencePlugin {
        fn name(&self) -> &str {
            "Fence"
        }

        fn detect(&self) -> bool {
            true
        }

        fn bind(&self) -> Option<Arc<dyn ClaimOracle>> {
            Some(Arc::new(Fenced))
        }
    }

    #[test]
    fn claims_deny_capture_once_ready_unless_bypassed() {
        let (world, actor, merchant) = stage();
        let scheduler = single(&world);
        let h = Harness::start(
            world,
            scheduler,
            actor,
            VesselConfig::default(),
            Arc::new(SystemClock),
            vec![Arc::new(FencePlugin) as Arc<dyn ClaimAdapter>],
        );
        // nothing detected before startup completes: fail open
        assert_eq!(
            h.coordinator.claims().capability("fence"),
            Some(Capability::Unavailable)
        );

        h.coordinator.claims().on_startup_complete().unwrap();
        assert!(eventually(|| {
            h.coordinator.claims().capability("fence") == Some(Capability::Ready)
        }));
        let outcome = h.capture(merchant);
        assert_eq!(outcome.rejection(), Some(&Rejection::ClaimDenied));
        assert!(h.world.is_valid(merchant));

        h.on_actor(|a| a.grant("vessel.bypass.claim"));
        assert!(h.capture(merchant).is_committed());
    }

    #[test]
    fn full_inventory_drops_the_container() {
        let (world, actor, merchant) = stage();
        world
            .with_actor_mut(actor, |a| {
                for slot in 1..INVENTORY_SIZE {
                    a.inventory.set(slot, Some(ItemStack::new("wheat", 64))).unwrap();
                }
                a.inventory.set_held_item(Some(ItemStack::new(BUCKET, 2)));
            })
            .unwrap();
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);

        assert!(h.capture(merchant).is_committed());
        assert_eq!(h.held().map(|i| i.amount), Some(1));
        let dropped = h.world.dropped_items();
        assert_eq!(dropped.len(), 1);
        assert!(container::is_valid(&dropped[0].item));
        let full = Messages::default().resolve(MessageKey::InventoryFull, &[]);
        assert!(h.messages().contains(&full));
    }

    #[test]
    fn policy_rejections() {
        let (world, actor, merchant) = stage();
        let owned = farmer(&world, at(4.5, 0.5));
        world
            .with_merchant_mut(owned, |m| {
                m.data_mut().insert(
                    OWNER_TAG.to_string(),
                    TagValue::String(EntityId::new().to_string()),
                );
            })
            .unwrap();
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);

        assert_eq!(h.capture(owned).rejection(), Some(&Rejection::TargetOwned));
        assert_eq!(
            h.capture(EntityId::new()).rejection(),
            Some(&Rejection::TargetInvalid)
        );
        assert_eq!(h.capture(actor).rejection(), Some(&Rejection::TargetInvalid));

        let outcome = h
            .coordinator
            .release_blocking(h.actor, ItemStack::new(BUCKET, 1), spawn_point());
        assert_eq!(outcome.rejection(), Some(&Rejection::NotAContainer));

        h.on_actor(|a| a.revoke("vessel.capture"));
        assert_eq!(h.capture(merchant).rejection(), Some(&Rejection::NoPermission));
        h.on_actor(|a| a.grant("vessel.capture"));
        assert!(h.capture(merchant).is_committed());

        h.on_actor(|a| a.revoke("vessel.release"));
        assert_eq!(
            h.release_held().rejection(),
            Some(&Rejection::NoReleasePermission)
        );
    }

    #[test]
    fn disabled_world_refuses_both_directions() {
        let (world, actor, merchant) = stage();
        let stranger = farmer(&world, Location::new("nether", 0.5, 64.0, 0.5));
        let mut config = VesselConfig::default();
        config.disabled_worlds.insert("nether".to_string());
        let scheduler = single(&world);
        let h = Harness::start(world, scheduler, actor, config, Arc::new(SystemClock), Vec::new());

        assert_eq!(h.capture(stranger).rejection(), Some(&Rejection::WorldDisabled));
        let text = Messages::default().resolve(MessageKey::WorldDisabled, &[]);
        assert!(h.messages().contains(&text));

        assert!(h.capture(merchant).is_committed());
        let held = h.held().unwrap();
        let outcome = h.coordinator.release_blocking(
            h.actor,
            held,
            Location::new("nether", 4.5, 64.0, 0.5),
        );
        assert_eq!(outcome.rejection(), Some(&Rejection::WorldDisabled));
        assert_eq!(h.world.merchant_count(), 1);
        assert!(h.held().is_some_and(|i| container::is_valid(&i)));
    }

    fn interact_entity(h: &Harness, target: EntityId) -> (bool, Option<Outcome>) {
        let (tx, rx) = unbounded();
        let coordinator = Arc::clone(&h.coordinator);
        let actor = h.actor;
        let taken = run_sync_at_entity(&*h.scheduler, actor, WAIT, move || {
            let mut event = EntityInteraction::new(actor, target);
            let taken = coordinator.on_interact_entity(&mut event, move |o| {
                let _ = tx.send(o);
            });
            assert_eq!(taken, event.is_handled());
            taken
        })
        .unwrap();
        (taken, taken.then(|| rx.recv_timeout(WAIT).unwrap()))
    }

    fn interact_block(h: &Harness, clicked: Option<BlockPos>) -> (bool, Option<Outcome>) {
        let (tx, rx) = unbounded();
        let coordinator = Arc::clone(&h.coordinator);
        let actor = h.actor;
        let taken = run_sync_at_entity(&*h.scheduler, actor, WAIT, move || {
            let mut event = BlockInteraction::new(actor, clicked, BlockFace::Up);
            coordinator.on_interact_block(&mut event, move |o| {
                let _ = tx.send(o);
            })
        })
        .unwrap();
        (taken, taken.then(|| rx.recv_timeout(WAIT).unwrap()))
    }

    #[test]
    fn interactions_route_to_the_right_flow() {
        let (world, actor, merchant) = stage();
        let other = farmer(&world, at(3.5, 0.5));
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);

        // empty hand on a non-merchant is not ours
        assert_eq!(interact_entity(&h, actor), (false, None));
        assert_eq!(interact_block(&h, Some(ground())), (false, None));

        let (taken, outcome) = interact_entity(&h, merchant);
        assert!(taken);
        assert!(outcome.is_some_and(|o| o.is_committed()));

        let (_, outcome) = interact_entity(&h, other);
        assert_eq!(
            outcome.and_then(|o| o.rejection().cloned()),
            Some(Rejection::Misuse(Guidance::UseEmptyContainer))
        );
        let (_, outcome) = interact_block(&h, None);
        assert_eq!(
            outcome.and_then(|o| o.rejection().cloned()),
            Some(Rejection::Misuse(Guidance::ClickBlock))
        );

        let (taken, outcome) = interact_block(&h, Some(ground()));
        assert!(taken);
        assert!(outcome.is_some_and(|o| o.is_committed()));
        assert_eq!(h.world.merchant_count(), 2);
    }

    #[test]
    fn clicking_a_fluid_is_refused() {
        let (world, actor, merchant) = stage();
        let pool = BlockPos::new("world", 7, 63, 0);
        world.set_block(pool.clone(), BlockKind::Water).unwrap();
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);
        assert!(h.capture(merchant).is_committed());

        let (taken, outcome) = interact_block(&h, Some(pool));
        assert!(taken);
        assert_eq!(
            outcome.and_then(|o| o.rejection().cloned()),
            Some(Rejection::LiquidSurface)
        );
        assert_eq!(h.world.merchant_count(), 0);
    }

    #[test]
    fn world_events_keep_the_cache_current() {
        let (world, actor, merchant) = stage();
        let cured = world
            .spawn_merchant(at(6.5, 0.5), SpawnReason::Cured)
            .unwrap();
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);
        for event in h.world.drain_events() {
            h.coordinator.handle_world_event(&event);
        }
        assert!(eventually(|| h.coordinator.cache().get(cured).is_some()));
        let snapshot = h.coordinator.cache().get(cured).unwrap();
        assert_eq!(snapshot.capture.creation_source, "cured");
        assert_eq!(snapshot.capture.discount_factor, CURED_DISCOUNT);

        h.coordinator
            .handle_world_event(&WorldEvent::MerchantDied { id: cured });
        assert!(h.coordinator.cache().get(cured).is_none());

        h.coordinator.cache().clear();
        let merchants = h.world.unload_chunk("world", 0, 0);
        assert!(merchants.contains(&merchant));
        for event in h.world.drain_events() {
            h.coordinator.handle_world_event(&event);
        }
        assert!(eventually(|| h.coordinator.cache().get(merchant).is_some()));
    }

    #[test]
    fn captured_natural_merchant_keeps_its_source() {
        let (world, actor, merchant) = stage();
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);
        for event in h.world.drain_events() {
            h.coordinator.handle_world_event(&event);
        }
        assert!(eventually(|| h.coordinator.cache().get(merchant).is_some()));
        assert!(h.capture(merchant).is_committed());

        let held = h.held().unwrap();
        let ContainerState::Valid(decoded) = container::inspect(&held) else {
            panic!("container should decode");
        };
        assert_eq!(decoded.snapshot.capture.creation_source, "natural");
        assert!(decoded.snapshot.capture.captured);
    }

    #[test]
    fn shutdown_is_idempotent_and_fails_later_flows() {
        let (world, actor, merchant) = stage();
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);
        h.coordinator.shutdown();
        h.coordinator.shutdown();
        assert!(h.coordinator.is_shut_down());
        assert!(h.scheduler.is_shut_down());
        assert!(matches!(h.capture(merchant), Outcome::Failed(_)));
        assert!(h.world.is_valid(merchant));
    }

    #[test]
    fn a_stale_copy_cannot_release_again() {
        let (world, actor, merchant) = stage();
        let clock = Arc::new(ManualClock::new(1_000_000));
        let scheduler = single(&world);
        let h = Harness::start(
            world,
            scheduler,
            actor,
            VesselConfig::default(),
            clock.clone(),
            Vec::new(),
        );
        assert!(h.capture(merchant).is_committed());
        let copy = h.held().unwrap();
        assert!(h.release_held().is_committed());

        clock.advance(Duration::from_millis(3001));
        let outcome = h.coordinator.release_blocking(h.actor, copy, spawn_point());
        assert_eq!(outcome.rejection(), Some(&Rejection::ContainerGone));
        assert_eq!(h.world.merchant_count(), 1);
        assert!(h.held().is_some_and(|i| container::is_empty_container(&i)));
    }

    #[test]
    fn a_vessel_in_another_slot_is_taken_from_there() {
        let (world, actor, merchant) = stage();
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);
        assert!(h.capture(merchant).is_committed());
        let vessel = h.held().unwrap();
        h.on_actor(|a| {
            let vessel = a.inventory.held_item().cloned();
            a.inventory.set(7, vessel).unwrap();
            a.inventory.set_held_item(Some(ItemStack::new("torch", 3)));
        });

        let outcome = h.coordinator.release_blocking(h.actor, vessel, spawn_point());
        assert!(outcome.is_committed(), "{outcome}");
        let (slot, held) = h.on_actor(|a| (a.inventory.get(7).cloned(), a.inventory.held_item().cloned()));
        assert!(slot.is_some_and(|i| container::is_empty_container(&i)));
        assert_eq!(held.map(|i| i.amount), Some(3));
    }

    #[test]
    fn vessel_data_of_the_wrong_kind_is_unreadable() {
        let (world, actor, _) = stage();
        let mut odd = container::empty();
        odd.meta
            .data
            .insert(CONTAINER_KEY.to_string(), TagValue::Bool(true));
        let in_hand = odd.clone();
        world
            .with_actor_mut(actor, move |a| a.inventory.set_held_item(Some(in_hand)))
            .unwrap();
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);

        let (taken, outcome) = interact_block(&h, Some(ground()));
        assert!(taken);
        assert_eq!(
            outcome.and_then(|o| o.rejection().cloned()),
            Some(Rejection::IncompleteSnapshot)
        );
        assert_eq!(h.world.merchant_count(), 1);
        assert_eq!(h.held(), Some(odd));
    }

    #[test]
    fn a_refused_capture_leaves_the_merchant_unmarked() {
        let (world, actor, merchant) = stage();
        world
            .with_actor_mut(actor, |a| {
                a.inventory.set_held_item(Some(ItemStack::new("wheat", 1)))
            })
            .unwrap();
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);

        assert_eq!(h.capture(merchant).rejection(), Some(&Rejection::ContainerGone));
        assert!(h.world.is_valid(merchant));
        let marked = h.on_merchant(merchant, |m| m.data().contains_key(CAPTURED_TAG));
        assert!(!marked);
    }

    #[test]
    fn vessel_is_left_where_the_merchant_stood_when_the_actor_is_gone() {
        let (world, actor, merchant) = stage();
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);
        let stood = h.world.locate(merchant).unwrap();

        let w = Arc::clone(&h.world);
        run_sync_at_entity(&*h.scheduler, actor, WAIT, move || w.remove_actor(actor))
            .unwrap()
            .unwrap();

        let snapshot = Snapshot::default();
        let product = container::build(&snapshot, encode(&snapshot).unwrap(), &ContainerStyle::default());
        let summary = Summary::of(merchant, &snapshot);
        let (tx, rx) = bounded(1);
        let flow = Flow::new(
            &h.coordinator,
            actor,
            FlowKind::Capture,
            Box::new(move |o| {
                let _ = tx.send(o);
            }),
            None,
        );
        run_sync_at_entity(&*h.scheduler, merchant, WAIT, move || {
            flow.remove_remote_target(merchant, product, summary)
        })
        .unwrap();

        let outcome = rx.recv_timeout(WAIT).unwrap();
        assert!(outcome.is_committed(), "{outcome}");
        assert!(!h.world.is_valid(merchant));
        let dropped = h.world.dropped_items();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].location, stood);
        assert!(container::is_valid(&dropped[0].item));
    }

    #[test]
    fn an_abandoned_release_still_reports_and_refunds() {
        let (world, actor, merchant) = stage();
        let scheduler = single(&world);
        let h = Harness::simple(world, scheduler, actor);
        assert!(h.capture(merchant).is_committed());
        let reservation = h.on_actor(|a| {
            let slot = a.inventory.held_slot();
            let item = a.inventory.held_item().cloned().unwrap();
            a.inventory.set_held_item(None);
            Reservation {
                item,
                slot,
                location: a.location().clone(),
            }
        });

        let (tx, rx) = bounded(1);
        let flow = Flow::new(
            &h.coordinator,
            h.actor,
            FlowKind::Release,
            Box::new(move |o| {
                let _ = tx.send(o);
            }),
            None,
        );
        flow.hold(reservation);
        let next = flow.clone();
        drop(flow);
        assert!(rx.try_recv().is_err());
        drop(next);

        let outcome = rx.recv_timeout(WAIT).unwrap();
        assert!(matches!(outcome, Outcome::Failed(_)), "{outcome}");
        assert!(h.held().is_some_and(|i| container::is_valid(&i)));
        let failed = Messages::default().resolve(MessageKey::Failed, &[]);
        assert!(h.messages().contains(&failed));
    }

    struct Walled;

    impl ClaimOracle for Walled {
        fn can_build(&self, _: EntityId, _: &Location) -> bool {
            false
        }

        fn can_capture(&self, _: EntityId, _: &Location) -> bool {
            true
        }

        fn can_destroy(&self, _: EntityId, _: &Location) -> bool {
            true
        }
    }

    /// Detected at startup, bindable only once `ready` is set.
    struct SlowWall {
        ready: AtomicBool,
    }

    impl ClaimAdapter for SlowWall {
        fn name(&self) -> &str {
            "Wall"
        }

        fn detect(&self) -> bool {
            true
        }

        fn bind(&self) -> Option<Arc<dyn ClaimOracle>> {
            self.ready
                .load(Ordering::SeqCst)
                .then(|| Arc::new(Walled) as Arc<dyn ClaimOracle>)
        }
    }

    #[test]
    fn release_fails_open_until_claims_are_ready() {
        let (world, actor, merchant) = stage();
        let other = farmer(&world, at(3.5, 0.5));
        let wall = Arc::new(SlowWall {
            ready: AtomicBool::new(false),
        });
        let config = VesselConfig {
            claim_retry_period_ticks: 1,
            claim_retry_max: 10_000,
            ..VesselConfig::default()
        };
        let clock = Arc::new(ManualClock::new(1_000_000));
        let scheduler = single(&world);
        let h = Harness::start(
            world,
            scheduler,
            actor,
            config,
            clock.clone(),
            vec![wall.clone() as Arc<dyn ClaimAdapter>],
        );

        h.coordinator.claims().on_startup_complete().unwrap();
        assert!(eventually(|| {
            h.coordinator.claims().capability("wall") == Some(Capability::Pending)
        }));
        assert!(h.capture(merchant).is_committed());
        let outcome = h.release_held();
        assert!(outcome.is_committed(), "{outcome}");

        wall.ready.store(true, Ordering::SeqCst);
        assert!(eventually(|| {
            h.coordinator.claims().capability("wall") == Some(Capability::Ready)
        }));
        assert!(h.capture(other).is_committed());
        clock.advance(Duration::from_millis(3001));
        assert_eq!(h.release_held().rejection(), Some(&Rejection::ClaimDenied));
        assert_eq!(h.world.merchant_count(), 1);
        assert!(h.held().is_some_and(|i| container::is_valid(&i)));
    }

    #[test]
    fn actor_window_covers_every_spot() {
        let (world, actor, merchant) = stage();
        let other = farmer(&world, at(3.5, 0.5));
        let clock = Arc::new(ManualClock::new(1_000_000));
        let scheduler = single(&world);
        let h = Harness::start(
            world,
            scheduler,
            actor,
            VesselConfig::default(),
            clock.clone(),
            Vec::new(),
        );
        assert!(h.capture(merchant).is_committed());
        assert!(h.release_held().is_committed());
        assert!(h.capture(other).is_committed());

        let elsewhere = at(9.5, 0.5);
        let held = h.held().unwrap();
        let outcome = h
            .coordinator
            .release_blocking(h.actor, held.clone(), elsewhere.clone());
        assert_eq!(outcome.rejection(), Some(&Rejection::TooFast));
        clock.advance(Duration::from_millis(1001));
        let outcome = h.coordinator.release_blocking(h.actor, held, elsewhere);
        assert!(outcome.is_committed(), "{outcome}");
        assert_eq!(h.world.merchant_count(), 2);
    }

    struct Nobody;

    impl PermissionOracle for Nobody {
        fn has_permission(&self, _: EntityId, _: &str) -> bool {
            false
        }
    }

    #[test]
    fn permissions_come_from_the_supplied_oracle() {
        let (world, actor, merchant) = stage();
        let scheduler = single(&world);
        let h = Harness::with_permissions(
            world,
            scheduler,
            actor,
            VesselConfig::default(),
            Arc::new(Nobody),
            Arc::new(SystemClock),
            Vec::new(),
        );
        // the world grants vessel.capture, the oracle does not
        assert_eq!(h.capture(merchant).rejection(), Some(&Rejection::NoPermission));
        assert!(h.world.is_valid(merchant));
    }
}
