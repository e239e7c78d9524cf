use crate::executor::Executor;
use crate::scheduler::{Topology, TopologyScheduler};
use crate::{EntityLocator, ScheduleError};
use std::sync::Arc;
use vessel_common::Location;

/// One thread owns the whole world.
#[derive(Debug)]
pub struct SingleOwner {
    main: Executor,
}

impl Topology for SingleOwner {
    fn name(&self) -> &'static str {
        "single-owner"
    }

    fn global(&self) -> &Executor {
        &self.main
    }

    fn executor_for(&self, _location: &Location) -> &Executor {
        &self.main
    }

    fn executors(&self) -> Vec<&Executor> {
        vec![&self.main]
    }
}

/// Entity, location and global work all run on the one main thread.
pub type SingleOwnerScheduler = TopologyScheduler<SingleOwner>;

impl TopologyScheduler<SingleOwner> {
    pub fn start(
        locator: Arc<dyn EntityLocator>,
        async_workers: usize,
    ) -> Result<Self, ScheduleError> {
        let main = Executor::spawn("main", 1)?;
        Self::assemble(SingleOwner { main }, locator, async_workers)
    }
}
