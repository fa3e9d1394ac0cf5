//! Latest-snapshot map with publish-replace semantics.
//!
//! The control loop is the single writer: each tick it swaps in a complete
//! new map. The status endpoint reads lock-free; an in-flight read sees
//! either the previous tick's map or the new one, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::types::MetricSnapshot;

/// Atomically published map of shard id → latest metric snapshot.
pub struct SnapshotMap {
    inner: ArcSwap<HashMap<String, MetricSnapshot>>,
}

impl SnapshotMap {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Replace the entire map with this tick's snapshots.
    pub fn publish(&self, snapshots: HashMap<String, MetricSnapshot>) {
        self.inner.store(Arc::new(snapshots));
    }

    /// The current map, as published by the most recent tick.
    pub fn load(&self) -> Arc<HashMap<String, MetricSnapshot>> {
        self.inner.load_full()
    }

    /// Latest snapshot for one shard, if it has been sampled.
    pub fn get(&self, shard_id: &str) -> Option<MetricSnapshot> {
        self.inner.load().get(shard_id).cloned()
    }

    /// All snapshots sorted by shard id, for deterministic API output.
    pub fn sorted(&self) -> Vec<MetricSnapshot> {
        let map = self.inner.load();
        let mut snapshots: Vec<MetricSnapshot> = map.values().cloned().collect();
        snapshots.sort_by(|a, b| a.shard_id.cmp(&b.shard_id));
        snapshots
    }
}

impl Default for SnapshotMap {
    fn default() -> Self {
        Self::new()
    }
}
