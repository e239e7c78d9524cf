//! Duplicate suppression: cooldown windows and the in-flight set.
//!
//! These maps are touched from the triggering thread, from flow
//! continuations on other threads and from the periodic sweep. The in-flight
//! set is an atomic insert-if-absent; whoever inserts first owns the key
//! until its [`FlightGuard`] drops.

use crate::container::ContainerId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use vessel_common::{BlockPos, Clock, EntityId};

/// Logical target of one running flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlightKey {
    /// Any actor capturing this merchant.
    Capture { target: EntityId },
    /// This actor releasing this physical container.
    Release {
        actor: EntityId,
        container: ContainerId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SpotKey {
    actor: EntityId,
    block: BlockPos,
    container: ContainerId,
}

#[derive(Default)]
struct State {
    actors: HashMap<EntityId, u64>,
    spots: HashMap<SpotKey, u64>,
    in_flight: HashSet<FlightKey>,
}

/// Per-actor and per-coordinate release windows plus the in-flight set.
pub struct CooldownGate {
    clock: Arc<dyn Clock>,
    actor_window_ms: u64,
    spot_window_ms: u64,
    state: Arc<Mutex<State>>,
}

impl CooldownGate {
    pub fn new(clock: Arc<dyn Clock>, actor_window_ms: u64, spot_window_ms: u64) -> Self {
        Self {
            clock,
            actor_window_ms,
            spot_window_ms,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Claim `key`, or `None` if another flow already holds it.
    pub fn try_begin(&self, key: FlightKey) -> Option<FlightGuard> {
        if !self.state.lock().in_flight.insert(key.clone()) {
            tracing::debug!(?key, "duplicate attempt dropped");
            return None;
        }
        Some(FlightGuard {
            key,
            state: Arc::clone(&self.state),
        })
    }

    pub fn is_in_flight(&self, key: &FlightKey) -> bool {
        self.state.lock().in_flight.contains(key)
    }

    /// Both windows must have elapsed. Passing stamps both.
    pub fn check_release(&self, actor: EntityId, block: &BlockPos, container: ContainerId) -> bool {
        let now = self.clock.now_millis();
        let spot = SpotKey {
            actor,
            block: block.clone(),
            container,
        };
        let mut state = self.state.lock();
        let actor_ready = state
            .actors
            .get(&actor)
            .is_none_or(|last| now.saturating_sub(*last) >= self.actor_window_ms);
        let spot_ready = state
            .spots
            .get(&spot)
            .is_none_or(|last| now.saturating_sub(*last) >= self.spot_window_ms);
        if !(actor_ready && spot_ready) {
            tracing::debug!(%actor, %block, actor_ready, spot_ready, "release too fast");
            return false;
        }
        state.actors.insert(actor, now);
        state.spots.insert(spot, now);
        true
    }

    /// Forget stamps whose windows have passed. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        let before = state.actors.len() + state.spots.len();
        state
            .actors
            .retain(|_, last| now.saturating_sub(*last) < self.actor_window_ms);
        state
            .spots
            .retain(|_, last| now.saturating_sub(*last) < self.spot_window_ms);
        let swept = before - (state.actors.len() + state.spots.len());
        if swept > 0 {
            tracing::trace!(swept, "cooldown entries expired");
        }
        swept
    }

    /// Tracked stamps and in-flight keys.
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.actors.len() + state.spots.len() + state.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.actors.clear();
        state.spots.clear();
        state.in_flight.clear();
    }
}

/// Holds a [`FlightKey`] until dropped. Moves freely between threads.
pub struct FlightGuard {
    key: FlightKey,
    state: Arc<Mutex<State>>,
}

impl FlightGuard {
    pub fn key(&self) -> &FlightKey {
        &self.key
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.state.lock().in_flight.remove(&self.key);
    }
}

impl std::fmt::Debug for FlightGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FlightGuard").field(&self.key).finish()
    }
}
