//! The consistent hash ring.
//!
//! Each shard identifier is expanded into [`VIRTUAL_NODES`] positions on a
//! 64-bit circular space via FNV-1a over `"{id}#vn{i}"`. A lookup hashes
//! the key and walks clockwise (`BTreeMap::range`) to the nearest virtual
//! node, wrapping at the top of the space. FNV-1a is a fingerprint of the
//! identifier bytes, so placement is stable across process restarts.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::Mutex;

use arc_swap::ArcSwap;
use thiserror::Error;
use tracing::debug;

/// Virtual nodes per shard. Keeps load skew bounded for small clusters.
pub const VIRTUAL_NODES: usize = 64;

/// Errors raised by ring operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("no shards available")]
    NoShardsAvailable,

    #[error("shard {0} already in ring")]
    AlreadyMember(String),

    #[error("shard {0} not in ring")]
    NotMember(String),
}

/// Immutable ring state, swapped atomically on membership change.
#[derive(Debug, Default, Clone)]
struct RingState {
    /// Virtual node position → shard id.
    positions: BTreeMap<u64, String>,
    members: BTreeSet<String>,
}

/// Consistent-hash ring over shard identifiers.
///
/// Lookups are lock-free; membership changes serialize on a writer mutex
/// and publish a full replacement snapshot.
pub struct PlacementRing {
    state: ArcSwap<RingState>,
    writer: Mutex<()>,
    virtual_nodes: usize,
}

impl PlacementRing {
    /// Create an empty ring with the default virtual-node count.
    pub fn new() -> Self {
        Self::with_virtual_nodes(VIRTUAL_NODES)
    }

    /// Create an empty ring with a custom virtual-node count (≥ 32 keeps
    /// skew bounded; smaller values are for tests only).
    pub fn with_virtual_nodes(virtual_nodes: usize) -> Self {
        Self {
            state: ArcSwap::from_pointee(RingState::default()),
            writer: Mutex::new(()),
            virtual_nodes,
        }
    }

    /// Add a shard to the ring. Duplicate membership is an error — every
    /// active shard appears exactly once.
    pub fn add(&self, id: &str) -> Result<(), PlacementError> {
        let _guard = self.writer.lock().expect("ring writer lock");
        let current = self.state.load_full();
        if current.members.contains(id) {
            return Err(PlacementError::AlreadyMember(id.to_string()));
        }

        let mut next = RingState::clone(&current);
        next.members.insert(id.to_string());
        for i in 0..self.virtual_nodes {
            let position = fnv1a(format!("{id}#vn{i}").as_bytes());
            next.positions.insert(position, id.to_string());
        }
        self.state.store(Arc::new(next));
        debug!(shard = %id, "shard added to placement ring");
        Ok(())
    }

    /// Remove a shard and all of its virtual nodes.
    pub fn remove(&self, id: &str) -> Result<(), PlacementError> {
        let _guard = self.writer.lock().expect("ring writer lock");
        let current = self.state.load_full();
        if !current.members.contains(id) {
            return Err(PlacementError::NotMember(id.to_string()));
        }

        let mut next = RingState::clone(&current);
        next.members.remove(id);
        next.positions.retain(|_, member| member != id);
        self.state.store(Arc::new(next));
        debug!(shard = %id, "shard removed from placement ring");
        Ok(())
    }

    /// Map a key to its owning shard by walking clockwise from the key's
    /// hash. Deterministic for a fixed membership.
    pub fn lookup(&self, key: &str) -> Result<String, PlacementError> {
        let state = self.state.load();
        if state.positions.is_empty() {
            return Err(PlacementError::NoShardsAvailable);
        }
        let hash = fnv1a(key.as_bytes());
        let owner = state
            .positions
            .range(hash..)
            .next()
            .or_else(|| state.positions.iter().next())
            .map(|(_, id)| id.clone())
            .expect("non-empty ring has a successor");
        Ok(owner)
    }

    /// Current membership set.
    pub fn members(&self) -> BTreeSet<String> {
        self.state.load().members.clone()
    }

    /// Number of member shards.
    pub fn len(&self) -> usize {
        self.state.load().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.load().members.is_empty()
    }
}

impl Default for PlacementRing {
    fn default() -> Self {
        Self::new()
    }
}

/// 64-bit FNV-1a.
fn fnv1a(data: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 14695981039346656037;
    const PRIME: u64 = 1099511628211;
    let mut hash = OFFSET_BASIS;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
