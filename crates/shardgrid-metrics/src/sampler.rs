//! The per-shard sampler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sqlx::mysql::MySqlPool;
use sqlx::Row;
use tokio::time::timeout;
use tracing::{debug, warn};

use shardgrid_pool::ShardPool;
use shardgrid_state::{epoch_secs, HealthState, MetricSnapshot};

/// Liveness ping deadline.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Previous `Questions` reading for one shard, for delta-based QPS.
struct QpsBaseline {
    questions: u64,
    taken_at: Instant,
}

/// Collects all signals for one shard and produces a fresh snapshot.
pub struct ShardSampler {
    pool: Arc<ShardPool>,
    host: super::HostProbe,
    /// Tables whose row counts are collected, from the shard-key map.
    tables: Vec<String>,
    baselines: Mutex<HashMap<String, QpsBaseline>>,
}

impl ShardSampler {
    pub fn new(pool: Arc<ShardPool>, tables: Vec<String>) -> Self {
        Self {
            pool,
            host: super::HostProbe::new(),
            tables,
            baselines: Mutex::new(HashMap::new()),
        }
    }

    /// Synchronously collect all signals for one shard.
    ///
    /// A missing pool or a failed liveness ping short-circuits to an
    /// unhealthy snapshot with zeroed numeric fields. Failures on
    /// individual sub-queries are logged and zeroed; the snapshot is still
    /// returned healthy.
    pub async fn sample(&self, shard_id: &str) -> MetricSnapshot {
        let now = epoch_secs();

        let Some(pool) = self.pool.get(shard_id).await else {
            warn!(shard = %shard_id, "no pool for shard, reporting unhealthy");
            return MetricSnapshot::unhealthy(shard_id, now);
        };

        let ping = timeout(PING_TIMEOUT, sqlx::query("SELECT 1").execute(&pool)).await;
        match ping {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(shard = %shard_id, error = %e, "liveness ping failed");
                return MetricSnapshot::unhealthy(shard_id, now);
            }
            Err(_) => {
                warn!(shard = %shard_id, "liveness ping timed out");
                return MetricSnapshot::unhealthy(shard_id, now);
            }
        }

        let host = self.host.sample().await;

        let connection_count = self
            .pool
            .connection_count(shard_id)
            .await
            .unwrap_or(0) as i64;

        let database_size_bytes = self.database_size(shard_id, &pool).await;
        let table_counts = self.table_counts(shard_id, &pool).await;
        let total_entries = table_counts.values().sum();
        let queries_per_second = self.queries_per_second(shard_id, &pool).await;

        debug!(
            shard = %shard_id,
            total_entries,
            connection_count,
            qps = queries_per_second,
            "shard sampled"
        );

        MetricSnapshot {
            shard_id: shard_id.to_string(),
            cpu_percent: host.cpu_percent,
            memory_percent: host.memory_percent,
            disk_percent: host.disk_percent,
            total_entries,
            connection_count,
            queries_per_second,
            status: HealthState::Healthy,
            last_updated: now,
            database_size_bytes,
            table_counts,
        }
    }

    /// Total size of the shard's schema: data plus index length over all
    /// of its tables.
    async fn database_size(&self, shard_id: &str, pool: &MySqlPool) -> i64 {
        let result = sqlx::query_scalar::<_, u64>(
            "SELECT CAST(COALESCE(SUM(data_length + index_length), 0) AS UNSIGNED) \
             FROM information_schema.tables WHERE table_schema = DATABASE()",
        )
        .fetch_one(pool)
        .await;

        match result {
            Ok(size) => size as i64,
            Err(e) => {
                warn!(shard = %shard_id, error = %e, "failed to read database size");
                0
            }
        }
    }

    /// Full row count per configured table. A table absent on this shard
    /// records zero, not an error.
    async fn table_counts(&self, shard_id: &str, pool: &MySqlPool) -> HashMap<String, i64> {
        let mut counts = HashMap::new();
        for table in &self.tables {
            let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(pool)
                .await;
            match count {
                Ok(count) => {
                    counts.insert(table.clone(), count);
                }
                Err(e) => {
                    warn!(shard = %shard_id, table = %table, error = %e, "failed to count rows");
                    counts.insert(table.clone(), 0);
                }
            }
        }
        counts
    }

    /// Queries per second, delta-based: the cumulative `Questions` counter
    /// is diffed against the previous sample of this shard. The first
    /// sample (or a counter reset) falls back to the lifetime average
    /// `Questions / Uptime`.
    async fn queries_per_second(&self, shard_id: &str, pool: &MySqlPool) -> f64 {
        let Some(questions) = self.status_counter(shard_id, pool, "Questions").await else {
            return 0.0;
        };

        let previous = {
            let mut baselines = self.baselines.lock().expect("qps baselines lock");
            baselines.insert(
                shard_id.to_string(),
                QpsBaseline {
                    questions,
                    taken_at: Instant::now(),
                },
            )
        };

        if let Some(previous) = previous {
            let elapsed = previous.taken_at.elapsed().as_secs_f64();
            if let Some(qps) = delta_qps(previous.questions, questions, elapsed) {
                return qps;
            }
        }

        // Lifetime average fallback.
        let uptime = self
            .status_counter(shard_id, pool, "Uptime")
            .await
            .unwrap_or(0);
        lifetime_qps(questions, uptime)
    }

    /// One numeric value out of `SHOW STATUS`.
    async fn status_counter(&self, shard_id: &str, pool: &MySqlPool, name: &str) -> Option<u64> {
        let row = sqlx::query(&format!("SHOW STATUS LIKE '{name}'"))
            .fetch_optional(pool)
            .await;

        match row {
            Ok(Some(row)) => row
                .try_get::<String, _>(1)
                .ok()
                .and_then(|value| value.parse().ok()),
            Ok(None) => None,
            Err(e) => {
                warn!(shard = %shard_id, counter = %name, error = %e, "failed to read status counter");
                None
            }
        }
    }
}

/// Delta-based QPS. `None` when the counter went backwards (server
/// restart) or no time elapsed.
fn delta_qps(previous: u64, current: u64, elapsed_secs: f64) -> Option<f64> {
    if current < previous || elapsed_secs <= 0.0 {
        return None;
    }
    Some((current - previous) as f64 / elapsed_secs)
}

/// Lifetime-average QPS: cumulative counter over server uptime.
fn lifetime_qps(questions: u64, uptime_secs: u64) -> f64 {
    if uptime_secs == 0 {
        return 0.0;
    }
    questions as f64 / uptime_secs as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardgrid_pool::PoolSettings;

    #[tokio::test]
    async fn missing_pool_reports_unhealthy_zeroed() {
        let pool = Arc::new(ShardPool::new(PoolSettings::default()));
        let sampler = ShardSampler::new(pool, vec!["users".to_string()]);

        let snapshot = sampler.sample("shard-1").await;
        assert_eq!(snapshot.status, HealthState::Unhealthy);
        assert_eq!(snapshot.total_entries, 0);
        assert_eq!(snapshot.queries_per_second, 0.0);
        assert!(snapshot.table_counts.is_empty());
        assert!(snapshot.last_updated > 0);
    }

    #[test]
    fn delta_qps_divides_by_elapsed() {
        assert_eq!(delta_qps(100, 160, 30.0), Some(2.0));
    }

    #[test]
    fn delta_qps_rejects_counter_reset() {
        assert_eq!(delta_qps(500, 100, 30.0), None);
    }

    #[test]
    fn delta_qps_rejects_zero_elapsed() {
        assert_eq!(delta_qps(100, 200, 0.0), None);
    }

    #[test]
    fn lifetime_qps_is_counter_over_uptime() {
        assert_eq!(lifetime_qps(1200, 600), 2.0);
    }

    #[test]
    fn lifetime_qps_with_zero_uptime_is_zero() {
        assert_eq!(lifetime_qps(1200, 0), 0.0);
    }
}
