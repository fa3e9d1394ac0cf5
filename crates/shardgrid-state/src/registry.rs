//! Shard registry — the authoritative id → record map.
//!
//! The control loop is the only writer (during provisioning); the status
//! endpoint and the sampler read. Identity allocation is monotonic: the
//! index counter only ever moves forward, so shard identifiers and ports
//! are never reused, even when a provisioning attempt is discarded.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::types::{ShardRecord, ShardStatus};

/// Errors raised by registry mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("shard {0} already registered")]
    DuplicateShard(String),

    #[error("shard {0} not found")]
    ShardNotFound(String),
}

/// Identity minted for a shard about to be provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardIdentity {
    pub id: String,
    /// 1-based shard index, source of the port and database name.
    pub index: u32,
    pub port: u16,
    pub database_name: String,
}

struct Inner {
    shards: HashMap<String, ShardRecord>,
    /// Next 1-based shard index to allocate.
    next_index: u32,
}

/// Thread-safe registry of shard records.
pub struct ShardRegistry {
    inner: RwLock<Inner>,
}

impl ShardRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                shards: HashMap::new(),
                next_index: 1,
            }),
        }
    }

    /// Seed the registry with the initially configured shards, all `Active`.
    ///
    /// The shard index is recovered from a trailing `-<n>` in the id
    /// (`shard-3` → 3) so that ports and database names line up with the
    /// deployment; ids without a numeric suffix are numbered by position.
    pub fn seed(
        &self,
        shards: &HashMap<String, String>,
        base_port: u16,
        now: u64,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().expect("registry lock");

        let mut ids: Vec<&String> = shards.keys().collect();
        ids.sort();

        let mut fallback_index = 1u32;
        for id in ids {
            let index = parse_index(id).unwrap_or(fallback_index);
            fallback_index = fallback_index.max(index) + 1;

            let record = ShardRecord {
                id: id.clone(),
                url: shards[id].clone(),
                port: base_port + (index as u16) - 1,
                database_name: format!("shard{index}_db"),
                status: ShardStatus::Active,
                created_at: now,
            };
            if inner.shards.insert(id.clone(), record).is_some() {
                return Err(RegistryError::DuplicateShard(id.clone()));
            }
            inner.next_index = inner.next_index.max(index + 1);
        }
        Ok(())
    }

    /// Mint the identity for the next shard. Advances the index counter
    /// immediately so a discarded attempt never hands its id or port to a
    /// later one.
    pub fn allocate(&self, base_port: u16) -> ShardIdentity {
        let mut inner = self.inner.write().expect("registry lock");
        let index = inner.next_index;
        inner.next_index += 1;
        ShardIdentity {
            id: format!("shard-{index}"),
            index,
            port: base_port + (index as u16) - 1,
            database_name: format!("shard{index}_db"),
        }
    }

    /// Insert a freshly allocated record in `Provisioning` state.
    pub fn insert_provisioning(&self, record: ShardRecord) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().expect("registry lock");
        if inner.shards.contains_key(&record.id) {
            return Err(RegistryError::DuplicateShard(record.id));
        }
        inner.shards.insert(record.id.clone(), record);
        Ok(())
    }

    /// Commit a provisioned shard: `Provisioning` → `Active`.
    pub fn mark_active(&self, id: &str) -> Result<(), RegistryError> {
        self.set_status(id, ShardStatus::Active)
    }

    /// Retire a shard: → `Removed`. No transition out of `Removed`.
    pub fn mark_removed(&self, id: &str) -> Result<(), RegistryError> {
        self.set_status(id, ShardStatus::Removed)
    }

    /// Drop the record of a failed provisioning attempt.
    pub fn discard(&self, id: &str) {
        let mut inner = self.inner.write().expect("registry lock");
        if let Some(record) = inner.shards.get_mut(id) {
            record.status = ShardStatus::Discarded;
        }
    }

    fn set_status(&self, id: &str, status: ShardStatus) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().expect("registry lock");
        match inner.shards.get_mut(id) {
            Some(record) => {
                record.status = status;
                Ok(())
            }
            None => Err(RegistryError::ShardNotFound(id.to_string())),
        }
    }

    /// Fetch a single record by id.
    pub fn get(&self, id: &str) -> Option<ShardRecord> {
        let inner = self.inner.read().expect("registry lock");
        inner.shards.get(id).cloned()
    }

    /// All records, sorted by id for deterministic output.
    pub fn list(&self) -> Vec<ShardRecord> {
        let inner = self.inner.read().expect("registry lock");
        let mut records: Vec<ShardRecord> = inner.shards.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Ids of all `Active` shards, sorted.
    pub fn active_ids(&self) -> Vec<String> {
        let inner = self.inner.read().expect("registry lock");
        let mut ids: Vec<String> = inner
            .shards
            .values()
            .filter(|r| r.status == ShardStatus::Active)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of `Active` shards.
    pub fn active_count(&self) -> usize {
        let inner = self.inner.read().expect("registry lock");
        inner
            .shards
            .values()
            .filter(|r| r.status == ShardStatus::Active)
            .count()
    }
}

impl Default for ShardRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the 1-based index from a `shard-<n>` style identifier.
fn parse_index(id: &str) -> Option<u32> {
    id.rsplit('-').next()?.parse().ok()
}
