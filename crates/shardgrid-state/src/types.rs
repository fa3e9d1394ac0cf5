//! Domain types for the shardgrid cluster.
//!
//! These types cross crate boundaries: shard records live in the registry,
//! metric snapshots flow from the sampler through the control loop to the
//! status endpoint. Everything wire-facing is serde-serializable with frozen
//! field names.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Unique identifier for a shard. Opaque, never reused within a cluster
/// lifetime.
pub type ShardId = String;

// ── Shard record ───────────────────────────────────────────────────

/// Lifecycle state of a shard.
///
/// ```text
/// (none) ──allocate──▶ provisioning ──pool+ring published──▶ active
///                         │                                    │
///                         └── any step fails ──▶ discarded     └──▶ removed
/// ```
///
/// Terminal states: `Active` (until removed), `Removed`, `Discarded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardStatus {
    Provisioning,
    Active,
    Removed,
    Discarded,
}

/// Authoritative record for a single shard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShardRecord {
    pub id: ShardId,
    /// MySQL connection URL for this shard's endpoint.
    pub url: String,
    /// Host port the shard listens on.
    pub port: u16,
    /// Logical database name on the shard.
    pub database_name: String,
    pub status: ShardStatus,
    /// Unix timestamp (seconds) when the record was created.
    pub created_at: u64,
}

// ── Metrics ────────────────────────────────────────────────────────

/// Health of a shard as observed by the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Point-in-time metrics for one shard. Immutable once published.
///
/// Field names are part of the control-plane API contract (`GET /shards`)
/// and must not change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSnapshot {
    pub shard_id: ShardId,
    /// Collector-host CPU usage over a one-second window.
    pub cpu_percent: f64,
    /// Collector-host virtual memory used-percent.
    pub memory_percent: f64,
    /// Collector-host root filesystem used-percent.
    pub disk_percent: f64,
    /// Sum of per-table row counts.
    pub total_entries: i64,
    /// Open connections in this shard's pool.
    pub connection_count: i64,
    /// Queries per second, delta-based against the previous sample.
    pub queries_per_second: f64,
    pub status: HealthState,
    /// Unix timestamp (seconds) when the sample was taken.
    pub last_updated: u64,
    pub database_size_bytes: i64,
    /// Row count per configured table.
    pub table_counts: HashMap<String, i64>,
}

impl MetricSnapshot {
    /// A zeroed snapshot marking the shard unhealthy, used when the
    /// liveness ping fails or sampling times out.
    pub fn unhealthy(shard_id: &str, now: u64) -> Self {
        Self {
            shard_id: shard_id.to_string(),
            cpu_percent: 0.0,
            memory_percent: 0.0,
            disk_percent: 0.0,
            total_entries: 0,
            connection_count: 0,
            queries_per_second: 0.0,
            status: HealthState::Unhealthy,
            last_updated: now,
            database_size_bytes: 0,
            table_counts: HashMap::new(),
        }
    }
}

// ── Scaling ────────────────────────────────────────────────────────

/// Scaling strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMode {
    /// Fire when any single shard breaches a threshold.
    Hot,
    /// Fire on cluster aggregates.
    Cold,
}

impl std::fmt::Display for ScalingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalingMode::Hot => write!(f, "hot"),
            ScalingMode::Cold => write!(f, "cold"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes_with_stable_field_names() {
        let mut table_counts = HashMap::new();
        table_counts.insert("users".to_string(), 42);
        let snap = MetricSnapshot {
            shard_id: "shard-1".to_string(),
            cpu_percent: 12.5,
            memory_percent: 40.0,
            disk_percent: 55.0,
            total_entries: 42,
            connection_count: 3,
            queries_per_second: 1.5,
            status: HealthState::Healthy,
            last_updated: 1000,
            database_size_bytes: 16384,
            table_counts,
        };

        let json = serde_json::to_value(&snap).unwrap();
        for key in [
            "shard_id",
            "cpu_percent",
            "memory_percent",
            "disk_percent",
            "total_entries",
            "connection_count",
            "queries_per_second",
            "status",
            "last_updated",
            "database_size_bytes",
            "table_counts",
        ] {
            assert!(json.get(key).is_some(), "missing field {key}");
        }
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["table_counts"]["users"], 42);
    }

    #[test]
    fn unhealthy_snapshot_is_zeroed() {
        let snap = MetricSnapshot::unhealthy("shard-2", 99);
        assert_eq!(snap.status, HealthState::Unhealthy);
        assert_eq!(snap.cpu_percent, 0.0);
        assert_eq!(snap.total_entries, 0);
        assert_eq!(snap.last_updated, 99);
        assert!(snap.table_counts.is_empty());
    }

    #[test]
    fn scaling_mode_displays_lowercase() {
        assert_eq!(ScalingMode::Hot.to_string(), "hot");
        assert_eq!(ScalingMode::Cold.to_string(), "cold");
    }

    #[test]
    fn shard_status_snake_case() {
        let s = serde_json::to_string(&ShardStatus::Provisioning).unwrap();
        assert_eq!(s, "\"provisioning\"");
    }
}
