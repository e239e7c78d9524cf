use parking_lot::RwLock;
use std::collections::HashMap;
use vessel_common::Location;

/// A region coordinate: one square of the XZ plane inside a named world.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionCoord {
    pub world: String,
    pub x: i32,
    pub z: i32,
}

impl RegionCoord {
    pub fn new(world: impl Into<String>, x: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            z,
        }
    }
}

/// Fixed-size grid partitioning of every world. Y is ignored.
#[derive(Debug, Clone)]
pub struct RegionGrid {
    region_size: f64,
}

impl RegionGrid {
    /// `region_size` is the edge length of a region in blocks.
    pub fn new(region_size: u32) -> Self {
        Self {
            region_size: f64::from(region_size.max(1)),
        }
    }

    pub fn region_size(&self) -> u32 {
        self.region_size as u32
    }

    pub fn region_of(&self, location: &Location) -> RegionCoord {
        RegionCoord {
            world: location.world.clone(),
            x: (location.position.x / self.region_size).floor() as i32,
            z: (location.position.z / self.region_size).floor() as i32,
        }
    }
}

/// Which worker thread owns each region.
///
/// Ownership defaults to a stable hash of the coordinate and can be
/// overridden at runtime to model regions merging or splitting. Lookups are
/// always made against the current assignment, never cached by callers.
#[derive(Debug)]
pub struct RegionMap {
    grid: RegionGrid,
    workers: usize,
    overrides: RwLock<HashMap<RegionCoord, usize>>,
}

impl RegionMap {
    pub fn new(grid: RegionGrid, workers: usize) -> Self {
        Self {
            grid,
            workers: workers.max(1),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    pub fn grid(&self) -> &RegionGrid {
        &self.grid
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn worker_for(&self, location: &Location) -> usize {
        self.worker_for_region(&self.grid.region_of(location))
    }

    pub fn worker_for_region(&self, coord: &RegionCoord) -> usize {
        if let Some(worker) = self.overrides.read().get(coord) {
            return *worker;
        }
        (region_hash(coord) % self.workers as u64) as usize
    }

    /// Hand a region to another worker. Out-of-range workers wrap around.
    pub fn reassign(&self, coord: RegionCoord, worker: usize) {
        tracing::debug!(?coord, worker, "region reassigned");
        self.overrides.write().insert(coord, worker % self.workers);
    }

    /// Make `absorbed` follow whichever worker currently owns `into`.
    pub fn merge(&self, absorbed: RegionCoord, into: &RegionCoord) {
        let owner = self.worker_for_region(into);
        self.reassign(absorbed, owner);
    }

    pub fn reset(&self) {
        self.overrides.write().clear();
    }
}

/// FNV-1a over the world name and both coordinates.
fn region_hash(coord: &RegionCoord) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    let mut mix = |bytes: &[u8]| {
        for &b in bytes {
            h ^= b as u64;
            h = h.wrapping_mul(0x0100_0000_01b3);
        }
    };
    mix(coord.world.as_bytes());
    mix(&coord.x.to_le_bytes());
    mix(&coord.z.to_le_bytes());
    h
}
