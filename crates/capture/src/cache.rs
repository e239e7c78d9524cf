use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use vessel_common::{Clock, EntityId};
use vessel_persist::Snapshot;

#[derive(Debug, Clone)]
struct Entry {
    snapshot: Snapshot,
    stored_at: u64,
}

/// Last known snapshot per live merchant.
///
/// Advisory only: entries may be stale or missing, and nothing reads them
/// for correctness. Purged on death and by the periodic TTL sweep.
pub struct SnapshotCache {
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
    entries: RwLock<HashMap<EntityId, Entry>>,
}

impl SnapshotCache {
    pub fn new(clock: Arc<dyn Clock>, ttl_ms: u64) -> Self {
        Self {
            clock,
            ttl_ms,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn put(&self, id: EntityId, snapshot: Snapshot) {
        let stored_at = self.clock.now_millis();
        self.entries
            .write()
            .insert(id, Entry { snapshot, stored_at });
    }

    /// Unexpired entry for `id`.
    pub fn get(&self, id: EntityId) -> Option<Snapshot> {
        let now = self.clock.now_millis();
        self.entries
            .read()
            .get(&id)
            .filter(|e| now.saturating_sub(e.stored_at) < self.ttl_ms)
            .map(|e| e.snapshot.clone())
    }

    pub fn remove(&self, id: EntityId) -> Option<Snapshot> {
        self.entries.write().remove(&id).map(|e| e.snapshot)
    }

    /// Drop entries older than the TTL. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| now.saturating_sub(e.stored_at) < self.ttl_ms);
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = entries.len(), "snapshot cache swept");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
