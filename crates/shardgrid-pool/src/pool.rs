//! The shard pool registry and execution paths.

use std::collections::HashMap;
use std::time::Duration;

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::PoolError;
use crate::rows::{row_to_map, RowMap};

/// Connection pool policy. Tunable, not invariant.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Open-connection cap per shard.
    pub max_connections: u32,
    /// Idle floor kept warm per shard.
    pub min_connections: u32,
    /// How long an executor waits for a free connection (covers dialing).
    pub acquire_timeout: Duration,
    /// Optional per-query deadline. `None` executes without a deadline and
    /// lets the client's request deadline govern.
    pub query_timeout: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 25,
            min_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            query_timeout: None,
        }
    }
}

/// Result of a fully or partially successful scatter-gather.
#[derive(Debug, Clone, Default)]
pub struct ScatterOutcome {
    /// Union of rows across contributing shards. Inter-shard ordering is
    /// unspecified.
    pub rows: Vec<RowMap>,
    /// Shards that contributed rows, sorted.
    pub shards: Vec<String>,
}

/// One MySQL pool per active shard.
pub struct ShardPool {
    pools: RwLock<HashMap<String, MySqlPool>>,
    settings: PoolSettings,
}

impl ShardPool {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            settings,
        }
    }

    /// Establish and verify one pool per configured shard. Any connection
    /// or ping failure is fatal for initial boot.
    pub async fn init(&self, shards: &HashMap<String, String>) -> Result<(), PoolError> {
        for (id, url) in shards {
            let pool = self.connect(id, url).await?;
            let mut pools = self.pools.write().await;
            pools.insert(id.clone(), pool);
        }
        info!(shards = shards.len(), "shard pools initialized");
        Ok(())
    }

    /// Establish a pool for a new shard at runtime. Rejects ids that
    /// already have a pool; verifies the endpoint with a ping before
    /// registering.
    pub async fn add(&self, id: &str, url: &str) -> Result<(), PoolError> {
        {
            let pools = self.pools.read().await;
            if pools.contains_key(id) {
                return Err(PoolError::ShardExists(id.to_string()));
            }
        }

        let pool = self.connect(id, url).await?;

        let mut pools = self.pools.write().await;
        if pools.contains_key(id) {
            pool.close().await;
            return Err(PoolError::ShardExists(id.to_string()));
        }
        pools.insert(id.to_string(), pool);
        info!(shard = %id, "shard pool attached");
        Ok(())
    }

    async fn connect(&self, id: &str, url: &str) -> Result<MySqlPool, PoolError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .min_connections(self.settings.min_connections)
            .acquire_timeout(self.settings.acquire_timeout)
            .connect(url)
            .await
            .map_err(|source| PoolError::Connect {
                shard: id.to_string(),
                source,
            })?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|source| PoolError::Connect {
                shard: id.to_string(),
                source,
            })?;

        debug!(shard = %id, "shard pool connected and verified");
        Ok(pool)
    }

    /// Execute a statement on a single named shard.
    pub async fn exec(&self, sql: &str, id: &str) -> Result<Vec<RowMap>, PoolError> {
        let pool = self
            .get(id)
            .await
            .ok_or_else(|| PoolError::ShardNotFound(id.to_string()))?;
        run_query(&pool, sql, id, self.settings.query_timeout).await
    }

    /// Execute a statement on every pool concurrently and union the rows.
    ///
    /// Each sub-execution runs on its own task with an independent
    /// deadline. If any shard fails, the result is a
    /// [`PoolError::PartialFailure`] carrying the first error, the failed
    /// shard list, and the rows that did succeed.
    pub async fn exec_all(&self, sql: &str) -> Result<ScatterOutcome, PoolError> {
        let targets: Vec<(String, MySqlPool)> = {
            let pools = self.pools.read().await;
            pools
                .iter()
                .map(|(id, pool)| (id.clone(), pool.clone()))
                .collect()
        };

        let mut tasks = Vec::with_capacity(targets.len());
        for (id, pool) in targets {
            let sql = sql.to_string();
            let timeout = self.settings.query_timeout;
            let task_id = id.clone();
            tasks.push((
                id,
                tokio::spawn(async move { run_query(&pool, &sql, &task_id, timeout).await }),
            ));
        }

        let mut outcome = ScatterOutcome::default();
        let mut failed_shards = Vec::new();
        let mut first_error: Option<String> = None;

        for (id, task) in tasks {
            match task.await {
                Ok(Ok(rows)) => {
                    outcome.rows.extend(rows);
                    outcome.shards.push(id);
                }
                Ok(Err(e)) => {
                    warn!(shard = %id, error = %e, "scatter-gather sub-query failed");
                    first_error.get_or_insert_with(|| e.to_string());
                    failed_shards.push(id);
                }
                Err(e) => {
                    warn!(shard = %id, error = %e, "scatter-gather task failed");
                    first_error.get_or_insert_with(|| e.to_string());
                    failed_shards.push(id);
                }
            }
        }
        outcome.shards.sort();
        failed_shards.sort();

        match first_error {
            Some(first_error) => Err(PoolError::PartialFailure {
                failed_shards,
                first_error,
                partial: outcome,
            }),
            None => Ok(outcome),
        }
    }

    /// Clone of a shard's pool, for callers that issue their own queries
    /// (the metrics sampler).
    pub async fn get(&self, id: &str) -> Option<MySqlPool> {
        let pools = self.pools.read().await;
        pools.get(id).cloned()
    }

    /// Open connections in a shard's pool, from the pool's own statistics.
    pub async fn connection_count(&self, id: &str) -> Option<u32> {
        let pools = self.pools.read().await;
        pools.get(id).map(|pool| pool.size())
    }

    /// Ids with an attached pool, sorted.
    pub async fn shard_ids(&self) -> Vec<String> {
        let pools = self.pools.read().await;
        let mut ids: Vec<String> = pools.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drain and close every pool.
    pub async fn close(&self) {
        let pools = {
            let mut pools = self.pools.write().await;
            std::mem::take(&mut *pools)
        };
        for (id, pool) in pools {
            pool.close().await;
            debug!(shard = %id, "shard pool closed");
        }
    }
}

async fn run_query(
    pool: &MySqlPool,
    sql: &str,
    shard: &str,
    deadline: Option<Duration>,
) -> Result<Vec<RowMap>, PoolError> {
    let fetch = sqlx::query(sql).fetch_all(pool);
    let rows = match deadline {
        Some(deadline) => tokio::time::timeout(deadline, fetch)
            .await
            .map_err(|_| PoolError::Execution {
                shard: shard.to_string(),
                detail: format!("query exceeded deadline of {deadline:?}"),
            })?,
        None => fetch.await,
    }
    .map_err(|e| PoolError::Execution {
        shard: shard.to_string(),
        detail: e.to_string(),
    })?;

    Ok(rows.iter().map(row_to_map).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> PoolSettings {
        PoolSettings {
            max_connections: 2,
            min_connections: 0,
            acquire_timeout: Duration::from_millis(500),
            query_timeout: Some(Duration::from_secs(1)),
        }
    }

    /// A lazily connecting pool — parses the URL but dials nothing until a
    /// query runs.
    fn lazy_pool(url: &str) -> MySqlPool {
        MySqlPoolOptions::new()
            .max_connections(2)
            .min_connections(0)
            .acquire_timeout(Duration::from_millis(500))
            .connect_lazy(url)
            .expect("valid mysql url")
    }

    async fn pool_with_lazy_shard(id: &str) -> ShardPool {
        let shard_pool = ShardPool::new(test_settings());
        let mut pools = shard_pool.pools.write().await;
        // Port 9 (discard) — connection attempts fail fast.
        pools.insert(id.to_string(), lazy_pool("mysql://u:p@127.0.0.1:9/db"));
        drop(pools);
        shard_pool
    }

    #[tokio::test]
    async fn exec_on_unknown_shard_is_shard_not_found() {
        let shard_pool = ShardPool::new(test_settings());
        let result = shard_pool.exec("SELECT 1", "shard-9").await;
        assert!(matches!(result, Err(PoolError::ShardNotFound(id)) if id == "shard-9"));
    }

    #[tokio::test]
    async fn add_rejects_duplicate_id_before_dialing() {
        let shard_pool = pool_with_lazy_shard("shard-1").await;
        // The duplicate check fires before any connection attempt, so an
        // unreachable URL must not matter.
        let result = shard_pool
            .add("shard-1", "mysql://u:p@127.0.0.1:9/db")
            .await;
        assert!(matches!(result, Err(PoolError::ShardExists(id)) if id == "shard-1"));
    }

    #[tokio::test]
    async fn exec_surfaces_execution_error_for_unreachable_shard() {
        let shard_pool = pool_with_lazy_shard("shard-1").await;
        let result = shard_pool.exec("SELECT 1", "shard-1").await;
        assert!(matches!(result, Err(PoolError::Execution { shard, .. }) if shard == "shard-1"));
    }

    #[tokio::test]
    async fn exec_all_with_no_pools_returns_empty_union() {
        let shard_pool = ShardPool::new(test_settings());
        let outcome = shard_pool.exec_all("SELECT 1").await.unwrap();
        assert!(outcome.rows.is_empty());
        assert!(outcome.shards.is_empty());
    }

    #[tokio::test]
    async fn exec_all_reports_every_failed_shard() {
        let shard_pool = ShardPool::new(test_settings());
        {
            let mut pools = shard_pool.pools.write().await;
            pools.insert("shard-1".to_string(), lazy_pool("mysql://u:p@127.0.0.1:9/a"));
            pools.insert("shard-2".to_string(), lazy_pool("mysql://u:p@127.0.0.1:9/b"));
        }

        let result = shard_pool.exec_all("SELECT 1").await;
        let Err(PoolError::PartialFailure {
            failed_shards,
            first_error,
            partial,
        }) = result
        else {
            panic!("expected partial failure");
        };
        assert_eq!(failed_shards, vec!["shard-1", "shard-2"]);
        assert!(!first_error.is_empty());
        assert!(partial.rows.is_empty());
        assert!(partial.shards.is_empty());
    }

    #[tokio::test]
    async fn shard_ids_are_sorted() {
        let shard_pool = ShardPool::new(test_settings());
        {
            let mut pools = shard_pool.pools.write().await;
            pools.insert("shard-2".to_string(), lazy_pool("mysql://u:p@127.0.0.1:9/a"));
            pools.insert("shard-1".to_string(), lazy_pool("mysql://u:p@127.0.0.1:9/b"));
        }
        assert_eq!(shard_pool.shard_ids().await, vec!["shard-1", "shard-2"]);
    }

    #[tokio::test]
    async fn close_empties_the_registry() {
        let shard_pool = pool_with_lazy_shard("shard-1").await;
        shard_pool.close().await;
        assert!(shard_pool.shard_ids().await.is_empty());
    }
}
