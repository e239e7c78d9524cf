use crate::executor::Executor;
use crate::task::{CancelFlag, RepeatingTask, Task, TaskId, TaskRegistry};
use crate::timer::{Fire, Timer};
use crate::{AffinityScheduler, EntityLocator, ScheduleError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use vessel_common::{EntityId, Location, ticks_to_duration};

/// How the world's locations map onto affinity threads.
pub trait Topology: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Thread for work that belongs to no particular location.
    fn global(&self) -> &Executor;

    /// Thread that owns `location` right now.
    fn executor_for(&self, location: &Location) -> &Executor;

    fn executors(&self) -> Vec<&Executor>;
}

#[derive(Debug, Clone)]
enum Target {
    Global,
    Async,
    Entity(EntityId),
    Location(Location),
}

enum Work {
    Once { task: Task, retired: Option<Task> },
    Repeat(Arc<Mutex<RepeatingTask>>),
}

struct Job {
    id: TaskId,
    flag: CancelFlag,
    work: Work,
}

struct Inner<T: Topology> {
    topology: T,
    locator: Arc<dyn EntityLocator>,
    registry: TaskRegistry,
    timer: Timer,
    pool: Executor,
    stopped: AtomicBool,
}

impl<T: Topology> Inner<T> {
    fn route(self: &Arc<Self>, target: &Target, job: Job) -> Result<(), ScheduleError> {
        match target {
            Target::Global => self.topology.global().submit(self.bind(job)),
            Target::Async => self.pool.submit(self.bind(job)),
            Target::Location(location) => self.topology.executor_for(location).submit(self.bind(job)),
            Target::Entity(entity) => self.route_entity(*entity, job),
        }
    }

    /// Entities are located at dispatch time. The job re-validates on arrival
    /// and follows the entity if it changed owner while queued.
    fn route_entity(self: &Arc<Self>, entity: EntityId, job: Job) -> Result<(), ScheduleError> {
        let weak = Arc::downgrade(self);
        let Some(location) = self.locator.locate(entity) else {
            return self.topology.global().submit(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.retire(job);
                }
            }));
        };
        self.topology
            .executor_for(&location)
            .submit(Box::new(move || {
                let Some(inner) = weak.upgrade() else { return };
                if job.flag.is_cancelled() {
                    return;
                }
                if !inner.locator.is_valid(entity) {
                    inner.retire(job);
                    return;
                }
                match inner.locator.locate(entity) {
                    Some(now) if !inner.topology.executor_for(&now).is_current() => {
                        tracing::trace!(%entity, "entity changed owner while queued");
                        if let Err(error) = inner.route(&Target::Entity(entity), job) {
                            tracing::debug!(%entity, %error, "could not follow entity");
                        }
                    }
                    _ => inner.execute(job),
                }
            }))
    }

    fn bind(self: &Arc<Self>, job: Job) -> Task {
        let weak = Arc::downgrade(self);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.execute(job);
            }
        })
    }

    fn execute(&self, job: Job) {
        if job.flag.is_cancelled() {
            return;
        }
        match job.work {
            Work::Once { task, .. } => {
                self.registry.finish(job.id);
                task();
            }
            Work::Repeat(body) => {
                let mut run = body.lock();
                (*run)();
            }
        }
    }

    /// The entity is gone: run the fallback once, or end the timer.
    fn retire(&self, job: Job) {
        match job.work {
            Work::Once { retired, .. } => {
                self.registry.finish(job.id);
                if let Some(retired) = retired {
                    retired();
                }
            }
            Work::Repeat(_) => {
                self.registry.cancel(job.id);
            }
        }
    }

    fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let cancelled = self.registry.cancel_all();
        self.timer.stop();
        self.pool.stop();
        for executor in self.topology.executors() {
            executor.stop();
        }
        tracing::info!(topology = self.topology.name(), cancelled, "scheduler stopped");
    }
}

impl<T: Topology> Drop for Inner<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// An [`AffinityScheduler`] over any [`Topology`].
///
/// Cloning shares the same threads. Threads stop on [`AffinityScheduler::shutdown`]
/// or when the last clone is dropped.
pub struct TopologyScheduler<T: Topology> {
    inner: Arc<Inner<T>>,
}

impl<T: Topology> Clone for TopologyScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Topology> TopologyScheduler<T> {
    pub(crate) fn assemble(
        topology: T,
        locator: Arc<dyn EntityLocator>,
        async_workers: usize,
    ) -> Result<Self, ScheduleError> {
        let name = topology.name();
        let inner = Inner {
            timer: Timer::spawn(name)?,
            pool: Executor::spawn(format!("{name}-async"), async_workers.max(1))?,
            topology,
            locator,
            registry: TaskRegistry::default(),
            stopped: AtomicBool::new(false),
        };
        tracing::info!(topology = name, "scheduler started");
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn layout(&self) -> &T {
        &self.inner.topology
    }

    fn ensure_running(&self) -> Result<(), ScheduleError> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            Err(ScheduleError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn ensure_valid(&self, target: &Target) -> Result<(), ScheduleError> {
        match target {
            Target::Entity(entity) if !self.inner.locator.is_valid(*entity) => {
                Err(ScheduleError::EntityRetired(*entity))
            }
            _ => Ok(()),
        }
    }

    fn once(
        &self,
        target: Target,
        delay_ticks: u64,
        task: Task,
        retired: Option<Task>,
    ) -> Result<TaskId, ScheduleError> {
        self.ensure_running()?;
        self.ensure_valid(&target)?;
        let (id, flag) = self.inner.registry.register();
        let job = Job {
            id,
            flag: flag.clone(),
            work: Work::Once { task, retired },
        };
        let scheduled = if delay_ticks == 0 {
            self.inner.route(&target, job)
        } else {
            let weak = Arc::downgrade(&self.inner);
            self.inner.timer.schedule(
                ticks_to_duration(delay_ticks),
                flag,
                Fire::Once(Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        if let Err(error) = inner.route(&target, job) {
                            tracing::debug!(%id, %error, "delayed task dropped");
                        }
                    }
                })),
            )
        };
        scheduled.inspect_err(|_| self.inner.registry.finish(id))?;
        Ok(id)
    }

    fn every(
        &self,
        target: Target,
        delay_ticks: u64,
        period_ticks: u64,
        task: RepeatingTask,
    ) -> Result<TaskId, ScheduleError> {
        self.ensure_running()?;
        if period_ticks == 0 {
            return Err(ScheduleError::InvalidPeriod);
        }
        self.ensure_valid(&target)?;
        let (id, flag) = self.inner.registry.register();
        let body = Arc::new(Mutex::new(task));
        let weak = Arc::downgrade(&self.inner);
        let job_flag = flag.clone();
        let fire = move || {
            let Some(inner) = weak.upgrade() else { return };
            let job = Job {
                id,
                flag: job_flag.clone(),
                work: Work::Repeat(Arc::clone(&body)),
            };
            if let Err(error) = inner.route(&target, job) {
                tracing::debug!(%id, %error, "timer run dropped");
            }
        };
        self.inner
            .timer
            .schedule(
                ticks_to_duration(delay_ticks),
                flag,
                Fire::Every(ticks_to_duration(period_ticks), Arc::new(fire)),
            )
            .inspect_err(|_| self.inner.registry.finish(id))?;
        Ok(id)
    }
}

impl<T: Topology> AffinityScheduler for TopologyScheduler<T> {
    fn topology(&self) -> &'static str {
        self.inner.topology.name()
    }

    fn run_global(&self, task: Task) -> Result<TaskId, ScheduleError> {
        self.once(Target::Global, 0, task, None)
    }

    fn run_global_later(&self, delay_ticks: u64, task: Task) -> Result<TaskId, ScheduleError> {
        self.once(Target::Global, delay_ticks, task, None)
    }

    fn run_global_timer(
        &self,
        delay_ticks: u64,
        period_ticks: u64,
        task: RepeatingTask,
    ) -> Result<TaskId, ScheduleError> {
        self.every(Target::Global, delay_ticks, period_ticks, task)
    }

    fn run_async(&self, task: Task) -> Result<TaskId, ScheduleError> {
        self.once(Target::Async, 0, task, None)
    }

    fn run_async_later(&self, delay_ticks: u64, task: Task) -> Result<TaskId, ScheduleError> {
        self.once(Target::Async, delay_ticks, task, None)
    }

    fn run_async_timer(
        &self,
        delay_ticks: u64,
        period_ticks: u64,
        task: RepeatingTask,
    ) -> Result<TaskId, ScheduleError> {
        self.every(Target::Async, delay_ticks, period_ticks, task)
    }

    fn run_at_entity(
        &self,
        entity: EntityId,
        task: Task,
        retired: Option<Task>,
    ) -> Result<TaskId, ScheduleError> {
        self.once(Target::Entity(entity), 0, task, retired)
    }

    fn run_at_entity_later(
        &self,
        entity: EntityId,
        delay_ticks: u64,
        task: Task,
        retired: Option<Task>,
    ) -> Result<TaskId, ScheduleError> {
        self.once(Target::Entity(entity), delay_ticks, task, retired)
    }

    fn run_at_entity_timer(
        &self,
        entity: EntityId,
        delay_ticks: u64,
        period_ticks: u64,
        task: RepeatingTask,
    ) -> Result<TaskId, ScheduleError> {
        self.every(Target::Entity(entity), delay_ticks, period_ticks, task)
    }

    fn run_at_location(&self, location: &Location, task: Task) -> Result<TaskId, ScheduleError> {
        self.once(Target::Location(location.clone()), 0, task, None)
    }

    fn run_at_location_later(
        &self,
        location: &Location,
        delay_ticks: u64,
        task: Task,
    ) -> Result<TaskId, ScheduleError> {
        self.once(Target::Location(location.clone()), delay_ticks, task, None)
    }

    fn cancel(&self, id: TaskId) -> bool {
        self.inner.registry.cancel(id)
    }

    fn active_tasks(&self) -> usize {
        self.inner.registry.active()
    }

    fn owns_location(&self, location: &Location) -> bool {
        self.inner.topology.executor_for(location).is_current()
    }

    fn owns_entity(&self, entity: EntityId) -> bool {
        self.inner
            .locator
            .locate(entity)
            .is_some_and(|location| self.owns_location(&location))
    }

    fn is_global_thread(&self) -> bool {
        self.inner.topology.global().is_current()
    }

    fn is_shut_down(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        self.inner.shutdown();
    }
}
