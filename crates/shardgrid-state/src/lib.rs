//! shardgrid-state — shared cluster state for the shardgrid proxy.
//!
//! The leaf crate every other component depends on. It holds:
//!
//! - the domain types ([`ShardRecord`], [`ShardStatus`], [`MetricSnapshot`],
//!   scaling policy parameters)
//! - the [`ShardRegistry`] — the authoritative id → record map, including
//!   identity allocation for new shards
//! - the [`SnapshotMap`] — latest per-shard metrics, published atomically by
//!   the control loop and read lock-free by the status endpoint
//! - the [`Config`] consumed at boot (JSON, validated, with defaults)

pub mod config;
pub mod registry;
pub mod snapshots;
pub mod types;

pub use config::{Config, ConfigError, ScalingThresholds};
pub use registry::{RegistryError, ShardIdentity, ShardRegistry};
pub use snapshots::SnapshotMap;
pub use types::{HealthState, MetricSnapshot, ScalingMode, ShardRecord, ShardStatus};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
