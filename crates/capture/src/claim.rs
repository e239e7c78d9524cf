//! Optional land-claim integrations.
//!
//! Each external claim system is reached through a [`ClaimAdapter`] that
//! knows how to detect it and bind its API. Until an adapter is bound, its
//! checks pass: a missing or slow integration never blocks capture or
//! release. Binding is retried on a bounded timer after startup, after a
//! claim system is enabled and after a reload.

use parking_lot::{Mutex, RwLock};
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use vessel_affinity::{AffinityScheduler, ScheduleError, TaskId};
use vessel_common::{EntityId, Location};

/// Bound API of one claim system. Called on the thread owning `location`.
pub trait ClaimOracle: Send + Sync {
    fn can_build(&self, actor: EntityId, location: &Location) -> bool;
    fn can_capture(&self, actor: EntityId, location: &Location) -> bool;
    fn can_destroy(&self, actor: EntityId, location: &Location) -> bool;
}

/// Discovery for one claim system.
pub trait ClaimAdapter: Send + Sync {
    fn name(&self) -> &str;
    /// Whether the system is installed and enabled right now.
    fn detect(&self) -> bool;
    /// Try to reach its API. `None` while it is still starting up.
    fn bind(&self) -> Option<Arc<dyn ClaimOracle>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Unavailable,
    Pending,
    Ready,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Pending => "pending",
            Self::Ready => "ready",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimAction {
    Build,
    Capture,
    Destroy,
}

struct Slot {
    adapter: Arc<dyn ClaimAdapter>,
    state: RwLock<(Capability, Option<Arc<dyn ClaimOracle>>)>,
}

impl Slot {
    fn capability(&self) -> Capability {
        self.state.read().0
    }
}

pub struct ClaimGate {
    scheduler: Arc<dyn AffinityScheduler>,
    slots: Vec<Slot>,
    retry_max: u32,
    retry_period_ticks: u64,
    attempts: AtomicU32,
    retry_task: Mutex<Option<TaskId>>,
}

impl ClaimGate {
    pub fn new(
        scheduler: Arc<dyn AffinityScheduler>,
        adapters: Vec<Arc<dyn ClaimAdapter>>,
        retry_max: u32,
        retry_period_ticks: u64,
    ) -> Self {
        let slots = adapters
            .into_iter()
            .map(|adapter| Slot {
                adapter,
                state: RwLock::new((Capability::Unavailable, None)),
            })
            .collect();
        Self {
            scheduler,
            slots,
            retry_max: retry_max.max(1),
            retry_period_ticks: retry_period_ticks.max(1),
            attempts: AtomicU32::new(0),
            retry_task: Mutex::new(None),
        }
    }

    /// Checks every bound system; unbound ones pass.
    pub fn allows(&self, actor: EntityId, location: &Location, action: ClaimAction) -> bool {
        self.slots.iter().all(|slot| {
            let oracle = match &*slot.state.read() {
                (Capability::Ready, Some(oracle)) => Arc::clone(oracle),
                _ => return true,
            };
            let allowed = match action {
                ClaimAction::Build => oracle.can_build(actor, location),
                ClaimAction::Capture => oracle.can_capture(actor, location),
                ClaimAction::Destroy => oracle.can_destroy(actor, location),
            };
            if !allowed {
                tracing::debug!(claim = slot.adapter.name(), %actor, %location, ?action, "claim denied");
            }
            allowed
        })
    }

    pub fn capability(&self, name: &str) -> Option<Capability> {
        self.slots
            .iter()
            .find(|s| s.adapter.name().eq_ignore_ascii_case(name))
            .map(Slot::capability)
    }

    /// One line per system plus the retry counter.
    pub fn status(&self) -> String {
        let mut out = String::from("claims:");
        if self.slots.is_empty() {
            out.push_str(" none registered");
        }
        for slot in &self.slots {
            let _ = write!(out, " {}={}", slot.adapter.name(), slot.capability().as_str());
        }
        let _ = write!(
            out,
            " (retry {}/{})",
            self.attempts.load(Ordering::SeqCst),
            self.retry_max
        );
        out
    }

    /// The host finished starting up.
    pub fn on_startup_complete(self: &Arc<Self>) -> Result<(), ScheduleError> {
        self.redetect()
    }

    /// Some plugin was enabled; only claim systems we know trigger detection.
    pub fn on_plugin_enabled(self: &Arc<Self>, plugin: &str) -> Result<(), ScheduleError> {
        let lower = plugin.to_ascii_lowercase();
        if self
            .slots
            .iter()
            .any(|s| lower.contains(&s.adapter.name().to_ascii_lowercase()))
        {
            tracing::info!(%plugin, "claim system enabled, redetecting");
            self.redetect()?;
        }
        Ok(())
    }

    pub fn on_reload(self: &Arc<Self>) -> Result<(), ScheduleError> {
        self.redetect()
    }

    /// Forget every binding and detect again on the global thread.
    pub fn redetect(self: &Arc<Self>) -> Result<(), ScheduleError> {
        let gate = Arc::clone(self);
        self.scheduler.run_global(Box::new(move || {
            gate.stop_retry();
            gate.attempts.store(0, Ordering::SeqCst);
            let mut pending = 0;
            for slot in &gate.slots {
                let capability = if slot.adapter.detect() {
                    pending += 1;
                    Capability::Pending
                } else {
                    Capability::Unavailable
                };
                *slot.state.write() = (capability, None);
            }
            if pending > 0 {
                if let Err(error) = gate.start_retry() {
                    tracing::warn!(%error, "could not start claim retry");
                }
            }
            tracing::info!("{}", gate.status());
        }))?;
        Ok(())
    }

    fn start_retry(self: &Arc<Self>) -> Result<(), ScheduleError> {
        let mut task = self.retry_task.lock();
        if task.is_some() {
            return Ok(());
        }
        let weak = Arc::downgrade(self);
        let id = self.scheduler.run_global_timer(
            1,
            self.retry_period_ticks,
            Box::new(move || {
                if let Some(gate) = weak.upgrade() {
                    gate.retry_once();
                }
            }),
        )?;
        *task = Some(id);
        Ok(())
    }

    fn retry_once(&self) {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let mut waiting = 0;
        for slot in &self.slots {
            if slot.capability() != Capability::Pending {
                continue;
            }
            match slot.adapter.bind() {
                Some(oracle) => {
                    *slot.state.write() = (Capability::Ready, Some(oracle));
                    tracing::info!(claim = slot.adapter.name(), attempt, "claim checks enabled");
                }
                None => waiting += 1,
            }
        }
        if waiting == 0 {
            self.stop_retry();
            return;
        }
        if attempt % 6 == 0 {
            tracing::info!(attempt, max = self.retry_max, "waiting for claim systems");
        }
        if attempt >= self.retry_max {
            tracing::warn!(waiting, "claim systems never became ready, checks stay open");
            for slot in &self.slots {
                let mut state = slot.state.write();
                if state.0 == Capability::Pending {
                    *state = (Capability::Unavailable, None);
                }
            }
            self.stop_retry();
        }
    }

    fn stop_retry(&self) {
        if let Some(id) = self.retry_task.lock().take() {
            self.scheduler.cancel(id);
        }
    }

    pub fn is_retrying(&self) -> bool {
        self.retry_task.lock().is_some()
    }

    /// Cancel the retry timer.
    pub fn shutdown(&self) {
        self.stop_retry();
    }
}
