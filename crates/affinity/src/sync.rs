//! Blocking bridges for callers that cannot be written as callbacks.
//!
//! Each call parks the current thread until the task finishes on its
//! affinity thread or the timeout expires. Never call these from a thread
//! the target work may itself be queued behind.

use crate::{AffinityScheduler, ScheduleError};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use std::time::Duration;
use vessel_common::{EntityId, Location};

/// Run `f` on the thread owning `entity` and wait for its result.
/// Runs inline when the caller already owns the entity.
pub fn run_sync_at_entity<R: Send + 'static>(
    scheduler: &dyn AffinityScheduler,
    entity: EntityId,
    timeout: Duration,
    f: impl FnOnce() -> R + Send + 'static,
) -> Result<R, ScheduleError> {
    if scheduler.owns_entity(entity) {
        return Ok(f());
    }
    let (tx, rx) = bounded(1);
    scheduler.run_at_entity(
        entity,
        Box::new(move || {
            let _ = tx.send(f());
        }),
        None,
    )?;
    wait(rx, timeout)
}

pub fn run_sync_at_location<R: Send + 'static>(
    scheduler: &dyn AffinityScheduler,
    location: &Location,
    timeout: Duration,
    f: impl FnOnce() -> R + Send + 'static,
) -> Result<R, ScheduleError> {
    if scheduler.owns_location(location) {
        return Ok(f());
    }
    let (tx, rx) = bounded(1);
    scheduler.run_at_location(
        location,
        Box::new(move || {
            let _ = tx.send(f());
        }),
    )?;
    wait(rx, timeout)
}

pub fn run_sync_global<R: Send + 'static>(
    scheduler: &dyn AffinityScheduler,
    timeout: Duration,
    f: impl FnOnce() -> R + Send + 'static,
) -> Result<R, ScheduleError> {
    if scheduler.is_global_thread() {
        return Ok(f());
    }
    let (tx, rx) = bounded(1);
    scheduler.run_global(Box::new(move || {
        let _ = tx.send(f());
    }))?;
    wait(rx, timeout)
}

fn wait<R>(rx: Receiver<R>, timeout: Duration) -> Result<R, ScheduleError> {
    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(?timeout, "synchronous call timed out");
            Err(ScheduleError::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(ScheduleError::Dropped),
    }
}
