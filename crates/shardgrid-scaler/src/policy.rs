//! Scaling policy evaluation.
//!
//! Pure functions over the latest snapshot map: `hot` fires when any
//! single shard breaches a threshold, `cold` fires on cluster aggregates.
//! Evaluation never performs I/O; the control loop acts on the returned
//! trigger.

use std::collections::HashMap;

use tracing::info;

use shardgrid_state::{HealthState, MetricSnapshot, ScalingMode};

/// Thresholds and mode for policy evaluation.
#[derive(Debug, Clone)]
pub struct PolicyParams {
    pub mode: ScalingMode,
    pub cpu_threshold_percent: f64,
    pub memory_threshold_percent: f64,
    pub connection_threshold: i64,
    pub qps_threshold: f64,
    pub entry_threshold_per_shard: i64,
}

/// A scale-out request produced by the policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleTrigger {
    /// The breaching shard id, or `"cluster"` for aggregate firings.
    pub target: String,
    /// First breaching metric: `cpu`, `memory`, `entries`, `connections`,
    /// `qps`, `total_entries`, or `avg_cpu`.
    pub reason: &'static str,
    /// Observed value of the breaching metric.
    pub value: f64,
}

/// Evaluate the policy over the snapshot map. `shard_count` is the number
/// of active shards at evaluation time.
pub fn evaluate(
    params: &PolicyParams,
    snapshots: &HashMap<String, MetricSnapshot>,
    shard_count: usize,
) -> Option<ScaleTrigger> {
    match params.mode {
        ScalingMode::Hot => evaluate_hot(params, snapshots),
        ScalingMode::Cold => evaluate_cold(params, snapshots, shard_count),
    }
}

/// Per-shard thresholds; the first breaching metric names the reason.
fn evaluate_hot(
    params: &PolicyParams,
    snapshots: &HashMap<String, MetricSnapshot>,
) -> Option<ScaleTrigger> {
    // Deterministic shard order so the reported target is stable.
    let mut ids: Vec<&String> = snapshots.keys().collect();
    ids.sort();

    for id in ids {
        let snapshot = &snapshots[id];
        if snapshot.status == HealthState::Unhealthy {
            continue;
        }

        let trigger = if snapshot.cpu_percent >= params.cpu_threshold_percent {
            Some(("cpu", snapshot.cpu_percent))
        } else if snapshot.memory_percent >= params.memory_threshold_percent {
            Some(("memory", snapshot.memory_percent))
        } else if snapshot.total_entries >= params.entry_threshold_per_shard {
            Some(("entries", snapshot.total_entries as f64))
        } else if snapshot.connection_count >= params.connection_threshold {
            Some(("connections", snapshot.connection_count as f64))
        } else if snapshot.queries_per_second >= params.qps_threshold {
            Some(("qps", snapshot.queries_per_second))
        } else {
            None
        };

        if let Some((reason, value)) = trigger {
            info!(
                shard = %id,
                reason,
                value,
                "hot scaling threshold breached"
            );
            return Some(ScaleTrigger {
                target: id.clone(),
                reason,
                value,
            });
        }
    }
    None
}

/// Cluster aggregates: total entries against the summed per-shard budget,
/// and a majority of shards running hot on CPU.
fn evaluate_cold(
    params: &PolicyParams,
    snapshots: &HashMap<String, MetricSnapshot>,
    shard_count: usize,
) -> Option<ScaleTrigger> {
    if snapshots.is_empty() || shard_count == 0 {
        return None;
    }

    let total_entries: i64 = snapshots.values().map(|s| s.total_entries).sum();
    let total_threshold = params.entry_threshold_per_shard * shard_count as i64;
    if total_entries >= total_threshold {
        info!(
            total_entries,
            threshold = total_threshold,
            shards = shard_count,
            "cold scaling: cluster entry budget exhausted"
        );
        return Some(ScaleTrigger {
            target: "cluster".to_string(),
            reason: "total_entries",
            value: total_entries as f64,
        });
    }

    let high_cpu = snapshots
        .values()
        .filter(|s| s.cpu_percent >= params.cpu_threshold_percent)
        .count();
    let majority = shard_count.div_ceil(2);
    if high_cpu >= majority {
        let avg_cpu =
            snapshots.values().map(|s| s.cpu_percent).sum::<f64>() / snapshots.len() as f64;
        info!(
            high_cpu,
            shards = shard_count,
            avg_cpu,
            "cold scaling: majority of shards above cpu threshold"
        );
        return Some(ScaleTrigger {
            target: "cluster".to_string(),
            reason: "avg_cpu",
            value: avg_cpu,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mode: ScalingMode) -> PolicyParams {
        PolicyParams {
            mode,
            cpu_threshold_percent: 80.0,
            memory_threshold_percent: 85.0,
            connection_threshold: 20,
            qps_threshold: 1000.0,
            entry_threshold_per_shard: 100,
        }
    }

    fn snapshot(id: &str) -> MetricSnapshot {
        let mut snap = MetricSnapshot::unhealthy(id, 1);
        snap.status = HealthState::Healthy;
        snap
    }

    fn map(snaps: Vec<MetricSnapshot>) -> HashMap<String, MetricSnapshot> {
        snaps
            .into_iter()
            .map(|s| (s.shard_id.clone(), s))
            .collect()
    }

    #[test]
    fn quiet_cluster_does_not_fire() {
        let snaps = map(vec![snapshot("shard-1"), snapshot("shard-2")]);
        assert_eq!(evaluate(&params(ScalingMode::Hot), &snaps, 2), None);
        assert_eq!(evaluate(&params(ScalingMode::Cold), &snaps, 2), None);
    }

    #[test]
    fn hot_fires_on_cpu_breach() {
        let mut hot = snapshot("shard-1");
        hot.cpu_percent = 92.0;
        let trigger = evaluate(&params(ScalingMode::Hot), &map(vec![hot]), 1).unwrap();
        assert_eq!(trigger.target, "shard-1");
        assert_eq!(trigger.reason, "cpu");
        assert_eq!(trigger.value, 92.0);
    }

    #[test]
    fn hot_fires_on_entry_threshold() {
        let mut full = snapshot("shard-1");
        full.total_entries = 101;
        let trigger = evaluate(&params(ScalingMode::Hot), &map(vec![full]), 1).unwrap();
        assert_eq!(trigger.reason, "entries");
        assert_eq!(trigger.value, 101.0);
    }

    #[test]
    fn hot_fires_on_connections_and_qps() {
        let mut busy = snapshot("shard-1");
        busy.connection_count = 20;
        let trigger =
            evaluate(&params(ScalingMode::Hot), &map(vec![busy]), 1).unwrap();
        assert_eq!(trigger.reason, "connections");

        let mut loud = snapshot("shard-1");
        loud.queries_per_second = 1500.0;
        let trigger =
            evaluate(&params(ScalingMode::Hot), &map(vec![loud]), 1).unwrap();
        assert_eq!(trigger.reason, "qps");
    }

    #[test]
    fn hot_reports_first_breaching_metric() {
        // CPU and entries both breach; cpu is checked first.
        let mut snap = snapshot("shard-1");
        snap.cpu_percent = 95.0;
        snap.total_entries = 500;
        let trigger = evaluate(&params(ScalingMode::Hot), &map(vec![snap]), 1).unwrap();
        assert_eq!(trigger.reason, "cpu");
    }

    #[test]
    fn hot_skips_unhealthy_shards() {
        let mut down = MetricSnapshot::unhealthy("shard-1", 1);
        down.cpu_percent = 99.0;
        assert_eq!(evaluate(&params(ScalingMode::Hot), &map(vec![down]), 1), None);
    }

    #[test]
    fn hot_picks_lowest_shard_id_deterministically() {
        let mut a = snapshot("shard-1");
        a.total_entries = 200;
        let mut b = snapshot("shard-2");
        b.total_entries = 300;
        let trigger =
            evaluate(&params(ScalingMode::Hot), &map(vec![b, a]), 2).unwrap();
        assert_eq!(trigger.target, "shard-1");
    }

    #[test]
    fn cold_fires_on_cluster_entry_budget() {
        let mut a = snapshot("shard-1");
        a.total_entries = 150;
        let mut b = snapshot("shard-2");
        b.total_entries = 60;
        // 210 >= 100 * 2.
        let trigger =
            evaluate(&params(ScalingMode::Cold), &map(vec![a, b]), 2).unwrap();
        assert_eq!(trigger.target, "cluster");
        assert_eq!(trigger.reason, "total_entries");
        assert_eq!(trigger.value, 210.0);
    }

    #[test]
    fn cold_fires_on_cpu_majority() {
        let mut a = snapshot("shard-1");
        a.cpu_percent = 90.0;
        let mut b = snapshot("shard-2");
        b.cpu_percent = 85.0;
        let c = snapshot("shard-3");
        // 2 of 3 ≥ ⌈3/2⌉ = 2.
        let trigger =
            evaluate(&params(ScalingMode::Cold), &map(vec![a, b, c]), 3).unwrap();
        assert_eq!(trigger.reason, "avg_cpu");
    }

    #[test]
    fn cold_minority_does_not_fire() {
        let mut a = snapshot("shard-1");
        a.cpu_percent = 90.0;
        let b = snapshot("shard-2");
        let c = snapshot("shard-3");
        // 1 of 3 < 2.
        assert_eq!(
            evaluate(&params(ScalingMode::Cold), &map(vec![a, b, c]), 3),
            None
        );
    }

    #[test]
    fn cold_single_shard_majority_is_one() {
        let mut a = snapshot("shard-1");
        a.cpu_percent = 90.0;
        let trigger = evaluate(&params(ScalingMode::Cold), &map(vec![a]), 1).unwrap();
        assert_eq!(trigger.reason, "avg_cpu");
    }

    #[test]
    fn empty_snapshot_map_never_fires() {
        assert_eq!(evaluate(&params(ScalingMode::Cold), &HashMap::new(), 0), None);
        assert_eq!(evaluate(&params(ScalingMode::Hot), &HashMap::new(), 0), None);
    }
}
