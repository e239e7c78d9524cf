//! Affinity scheduling: run work on the thread that owns an entity or location.
//!
//! Two topologies sit behind [`AffinityScheduler`]:
//! - [`SingleOwnerScheduler`]: one main thread owns the whole world.
//! - [`RegionScheduler`]: the world is split into regions, each owned by a
//!   worker thread; ownership may change at runtime and is resolved when a
//!   task is dispatched.
//!
//! # Invariants
//! - An entity task re-validates its entity when it starts; a retired entity
//!   runs the fallback instead.
//! - Async tasks never touch entity or location state.
//! - Delayed and periodic tasks are cancellable by id; shutdown cancels all.

mod executor;
mod grid;
mod region;
mod scheduler;
mod single;
pub mod sync;
mod task;
mod timer;

pub use executor::Executor;
pub use grid::{RegionCoord, RegionGrid, RegionMap};
pub use region::{RegionConfig, RegionScheduler, Regions};
pub use scheduler::{Topology, TopologyScheduler};
pub use single::{SingleOwner, SingleOwnerScheduler};
pub use sync::{run_sync_at_entity, run_sync_at_location, run_sync_global};
pub use task::{RepeatingTask, Task, TaskId};

use std::time::Duration;
use vessel_common::{EntityId, Location};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("scheduler has been shut down")]
    ShutDown,
    #[error("entity {0} is no longer valid")]
    EntityRetired(EntityId),
    #[error("timer period must be at least one tick")]
    InvalidPeriod,
    #[error("could not start scheduler thread: {0}")]
    Spawn(String),
    #[error("timed out after {0:?} waiting for a scheduled task")]
    Timeout(Duration),
    #[error("scheduled task was dropped before it completed")]
    Dropped,
}

/// Where entities are, for routing. Must be callable from any thread.
pub trait EntityLocator: Send + Sync {
    fn locate(&self, id: EntityId) -> Option<Location>;
    fn is_valid(&self, id: EntityId) -> bool;
}

/// Run work under the right thread affinity. Delays and periods are in ticks.
pub trait AffinityScheduler: Send + Sync {
    fn topology(&self) -> &'static str;

    fn run_global(&self, task: Task) -> Result<TaskId, ScheduleError>;
    fn run_global_later(&self, delay_ticks: u64, task: Task) -> Result<TaskId, ScheduleError>;
    fn run_global_timer(
        &self,
        delay_ticks: u64,
        period_ticks: u64,
        task: RepeatingTask,
    ) -> Result<TaskId, ScheduleError>;

    /// Off every affinity thread. For pure computation only.
    fn run_async(&self, task: Task) -> Result<TaskId, ScheduleError>;
    fn run_async_later(&self, delay_ticks: u64, task: Task) -> Result<TaskId, ScheduleError>;
    fn run_async_timer(
        &self,
        delay_ticks: u64,
        period_ticks: u64,
        task: RepeatingTask,
    ) -> Result<TaskId, ScheduleError>;

    /// Fails with [`ScheduleError::EntityRetired`] if the entity is already
    /// gone. If it is gone by the time the task starts, `retired` runs instead.
    fn run_at_entity(
        &self,
        entity: EntityId,
        task: Task,
        retired: Option<Task>,
    ) -> Result<TaskId, ScheduleError>;
    fn run_at_entity_later(
        &self,
        entity: EntityId,
        delay_ticks: u64,
        task: Task,
        retired: Option<Task>,
    ) -> Result<TaskId, ScheduleError>;
    /// Ends by itself once the entity is gone.
    fn run_at_entity_timer(
        &self,
        entity: EntityId,
        delay_ticks: u64,
        period_ticks: u64,
        task: RepeatingTask,
    ) -> Result<TaskId, ScheduleError>;

    fn run_at_location(&self, location: &Location, task: Task) -> Result<TaskId, ScheduleError>;
    fn run_at_location_later(
        &self,
        location: &Location,
        delay_ticks: u64,
        task: Task,
    ) -> Result<TaskId, ScheduleError>;

    /// Returns false if the task already ran or is unknown.
    fn cancel(&self, id: TaskId) -> bool;
    fn active_tasks(&self) -> usize;

    fn owns_location(&self, location: &Location) -> bool;
    fn owns_entity(&self, entity: EntityId) -> bool;
    fn is_global_thread(&self) -> bool;

    fn is_shut_down(&self) -> bool;
    /// Cancel everything pending and stop all threads. Idempotent.
    fn shutdown(&self);
}
