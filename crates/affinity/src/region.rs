use crate::executor::Executor;
use crate::grid::{RegionGrid, RegionMap};
use crate::scheduler::{Topology, TopologyScheduler};
use crate::{EntityLocator, ScheduleError};
use std::sync::Arc;
use vessel_common::Location;

#[derive(Debug, Clone)]
pub struct RegionConfig {
    /// Number of region threads.
    pub workers: usize,
    /// Edge length of a region in blocks.
    pub region_size: u32,
    pub async_workers: usize,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            region_size: 128,
            async_workers: 2,
        }
    }
}

/// The world split into regions, each owned by one of several threads,
/// plus a separate global-region thread.
#[derive(Debug)]
pub struct Regions {
    global: Executor,
    workers: Vec<Executor>,
    map: RegionMap,
}

impl Regions {
    /// Live region ownership. Reassigning a region moves all later work for
    /// it, including tasks for entities standing in it, to the new owner.
    pub fn map(&self) -> &RegionMap {
        &self.map
    }
}

impl Topology for Regions {
    fn name(&self) -> &'static str {
        "regions"
    }

    fn global(&self) -> &Executor {
        &self.global
    }

    fn executor_for(&self, location: &Location) -> &Executor {
        &self.workers[self.map.worker_for(location) % self.workers.len()]
    }

    fn executors(&self) -> Vec<&Executor> {
        std::iter::once(&self.global).chain(&self.workers).collect()
    }
}

pub type RegionScheduler = TopologyScheduler<Regions>;

impl TopologyScheduler<Regions> {
    pub fn start(
        locator: Arc<dyn EntityLocator>,
        config: RegionConfig,
    ) -> Result<Self, ScheduleError> {
        let count = config.workers.max(1);
        let workers = (0..count)
            .map(|i| Executor::spawn(format!("region-{i}"), 1))
            .collect::<Result<Vec<_>, _>>()?;
        let regions = Regions {
            global: Executor::spawn("global-region", 1)?,
            workers,
            map: RegionMap::new(RegionGrid::new(config.region_size), count),
        };
        Self::assemble(regions, locator, config.async_workers)
    }
}
