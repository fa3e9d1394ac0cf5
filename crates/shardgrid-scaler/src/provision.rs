//! The provisioning state machine.
//!
//! Scale-out runs the eight steps of the sequence in order, each step
//! logged and individually failable. Pool attach precedes ring publish so
//! a routed query can never reach an endpoint without a pool; the inverse
//! (pool without ring) is tolerated until publish. A failed attempt
//! discards its shard record and leaves the next attempt a fresh identity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::mysql::MySqlPoolOptions;
use tracing::{error, info, warn};

use shardgrid_launcher::{LaunchSpec, ShardLauncher};
use shardgrid_placement::PlacementRing;
use shardgrid_pool::ShardPool;
use shardgrid_state::{epoch_secs, ShardRecord, ShardRegistry, ShardStatus};

use crate::error::ProvisionError;

/// The step a provisioning action is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionPhase {
    CapacityCheck,
    Allocate,
    Launch,
    ReadinessWait,
    SchemaSeed,
    PoolAttach,
    RingPublish,
    Commit,
}

impl std::fmt::Display for ProvisionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProvisionPhase::CapacityCheck => "capacity_check",
            ProvisionPhase::Allocate => "allocate",
            ProvisionPhase::Launch => "launch",
            ProvisionPhase::ReadinessWait => "readiness_wait",
            ProvisionPhase::SchemaSeed => "schema_seed",
            ProvisionPhase::PoolAttach => "pool_attach",
            ProvisionPhase::RingPublish => "ring_publish",
            ProvisionPhase::Commit => "commit",
        };
        write!(f, "{name}")
    }
}

/// How a provisioning action ended without error.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionOutcome {
    /// The shard is active, pooled, and in the ring.
    Completed(ShardRecord),
    /// The shard ceiling is reached. Expected, not an error.
    CapacityReached { active: usize, max: usize },
}

/// Parameters for provisioning new shards.
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    /// New shard port = base_port + index - 1.
    pub base_port: u16,
    /// Active-shard ceiling.
    pub max_shards: usize,
    /// Readiness polling budget.
    pub max_probe_attempts: u32,
    pub probe_interval: Duration,
    /// Credentials baked into the new shard's connection URL.
    pub username: String,
    pub password: String,
    /// Host new shards are reachable on.
    pub host: String,
    /// Table → shard-key column, for schema seeding.
    pub tables: HashMap<String, String>,
    /// Connect budget for the one-shot schema-seed connection.
    pub seed_connect_timeout: Duration,
}

/// Drives the scale-out sequence end-to-end.
pub struct Provisioner {
    registry: Arc<ShardRegistry>,
    pool: Arc<ShardPool>,
    ring: Arc<PlacementRing>,
    launcher: Arc<dyn ShardLauncher>,
    settings: ProvisionSettings,
    phase: Mutex<Option<ProvisionPhase>>,
}

impl Provisioner {
    pub fn new(
        registry: Arc<ShardRegistry>,
        pool: Arc<ShardPool>,
        ring: Arc<PlacementRing>,
        launcher: Arc<dyn ShardLauncher>,
        settings: ProvisionSettings,
    ) -> Self {
        Self {
            registry,
            pool,
            ring,
            launcher,
            settings,
            phase: Mutex::new(None),
        }
    }

    /// The step the in-flight action is executing, if any.
    pub fn current_phase(&self) -> Option<ProvisionPhase> {
        *self.phase.lock().expect("phase lock")
    }

    fn enter(&self, phase: ProvisionPhase) {
        info!(%phase, "provisioning step");
        *self.phase.lock().expect("phase lock") = Some(phase);
    }

    /// Run one scale-out attempt to completion.
    pub async fn run(&self) -> Result<ProvisionOutcome, ProvisionError> {
        let result = self.run_steps().await;
        *self.phase.lock().expect("phase lock") = None;
        result
    }

    async fn run_steps(&self) -> Result<ProvisionOutcome, ProvisionError> {
        // 1. Capacity check.
        self.enter(ProvisionPhase::CapacityCheck);
        let active = self.registry.active_count();
        if active >= self.settings.max_shards {
            info!(
                active,
                max = self.settings.max_shards,
                "maximum shard count reached, cannot scale further"
            );
            return Ok(ProvisionOutcome::CapacityReached {
                active,
                max: self.settings.max_shards,
            });
        }

        // 2. Allocate identity.
        self.enter(ProvisionPhase::Allocate);
        let identity = self.registry.allocate(self.settings.base_port);
        let url = format!(
            "mysql://{}:{}@{}:{}/{}",
            self.settings.username,
            self.settings.password,
            self.settings.host,
            identity.port,
            identity.database_name
        );
        self.registry.insert_provisioning(ShardRecord {
            id: identity.id.clone(),
            url: url.clone(),
            port: identity.port,
            database_name: identity.database_name.clone(),
            status: ShardStatus::Provisioning,
            created_at: epoch_secs(),
        })?;
        info!(shard = %identity.id, port = identity.port, "new shard allocated");

        let spec = LaunchSpec {
            shard_id: identity.id.clone(),
            port: identity.port,
            database_name: identity.database_name.clone(),
        };

        // 3. Launch the backing instance.
        self.enter(ProvisionPhase::Launch);
        if let Err(source) = self.launcher.launch(&spec).await {
            error!(shard = %identity.id, error = %source, "shard launch failed");
            self.registry.discard(&identity.id);
            return Err(ProvisionError::Launch {
                shard: identity.id,
                source,
            });
        }

        // 4. Readiness wait.
        self.enter(ProvisionPhase::ReadinessWait);
        if !self.wait_ready(&spec).await {
            // The launched resource is left in place for manual cleanup;
            // tearing it down here would mask the failure.
            error!(
                shard = %identity.id,
                attempts = self.settings.max_probe_attempts,
                "shard never became ready, leaving launched resource behind"
            );
            self.registry.discard(&identity.id);
            return Err(ProvisionError::ReadinessTimeout {
                shard: identity.id,
                attempts: self.settings.max_probe_attempts,
            });
        }

        // 5. Schema seed. Failures are warnings, the shard stays usable.
        self.enter(ProvisionPhase::SchemaSeed);
        self.seed_schema(&identity.id, &url).await;

        // 6. Pool attach — must precede ring publish.
        self.enter(ProvisionPhase::PoolAttach);
        if let Err(source) = self.pool.add(&identity.id, &url).await {
            error!(shard = %identity.id, error = %source, "pool attach failed");
            self.registry.discard(&identity.id);
            return Err(ProvisionError::PoolAttach {
                shard: identity.id,
                source,
            });
        }

        // 7. Ring publish — the shard becomes routable here.
        self.enter(ProvisionPhase::RingPublish);
        if let Err(source) = self.ring.add(&identity.id) {
            error!(shard = %identity.id, error = %source, "ring publish failed");
            self.registry.discard(&identity.id);
            return Err(ProvisionError::RingPublish {
                shard: identity.id,
                source,
            });
        }

        // 8. Record commit.
        self.enter(ProvisionPhase::Commit);
        self.registry.mark_active(&identity.id)?;
        let record = self
            .registry
            .get(&identity.id)
            .expect("committed shard is registered");

        info!(shard = %identity.id, "scale-out complete, shard active");
        Ok(ProvisionOutcome::Completed(record))
    }

    /// Poll the launcher's authenticated probe until ready or the attempt
    /// budget runs out.
    async fn wait_ready(&self, spec: &LaunchSpec) -> bool {
        for attempt in 1..=self.settings.max_probe_attempts {
            if self.launcher.probe(spec).await {
                info!(shard = %spec.shard_id, attempt, "shard is ready");
                return true;
            }
            if attempt % 5 == 0 {
                info!(
                    shard = %spec.shard_id,
                    attempt,
                    max = self.settings.max_probe_attempts,
                    "still waiting for shard readiness"
                );
            }
            tokio::time::sleep(self.settings.probe_interval).await;
        }
        false
    }

    /// Create the configured tables on the new shard through a one-shot
    /// connection.
    async fn seed_schema(&self, shard_id: &str, url: &str) {
        let pool = match MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.settings.seed_connect_timeout)
            .connect(url)
            .await
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!(shard = %shard_id, error = %e, "schema seed connection failed");
                return;
            }
        };

        for (table, key_column) in &self.settings.tables {
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 {key_column} VARCHAR(64) PRIMARY KEY, \
                 payload JSON, \
                 created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)"
            );
            if let Err(e) = sqlx::query(&ddl).execute(&pool).await {
                warn!(shard = %shard_id, table = %table, error = %e, "schema seed failed");
            }
        }
        pool.close().await;
        info!(shard = %shard_id, tables = self.settings.tables.len(), "schema seeded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shardgrid_pool::PoolSettings;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Launcher fake: configurable readiness, records invocations.
    struct FakeLauncher {
        ready: AtomicBool,
        launches: AtomicUsize,
        probes: AtomicUsize,
    }

    impl FakeLauncher {
        fn new(ready: bool) -> Self {
            Self {
                ready: AtomicBool::new(ready),
                launches: AtomicUsize::new(0),
                probes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ShardLauncher for FakeLauncher {
        async fn launch(&self, _spec: &LaunchSpec) -> Result<(), shardgrid_launcher::LaunchError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn probe(&self, _spec: &LaunchSpec) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.ready.load(Ordering::SeqCst)
        }

        async fn destroy(&self, _spec: &LaunchSpec) -> Result<(), shardgrid_launcher::LaunchError> {
            Ok(())
        }
    }

    /// Launcher fake whose launch always fails.
    struct BrokenLauncher;

    #[async_trait]
    impl ShardLauncher for BrokenLauncher {
        async fn launch(&self, spec: &LaunchSpec) -> Result<(), shardgrid_launcher::LaunchError> {
            Err(shardgrid_launcher::LaunchError::Failed {
                shard: spec.shard_id.clone(),
                detail: "no runtime".to_string(),
            })
        }

        async fn probe(&self, _spec: &LaunchSpec) -> bool {
            false
        }

        async fn destroy(&self, _spec: &LaunchSpec) -> Result<(), shardgrid_launcher::LaunchError> {
            Ok(())
        }
    }

    fn settings() -> ProvisionSettings {
        ProvisionSettings {
            base_port: 4000,
            max_shards: 3,
            max_probe_attempts: 2,
            probe_interval: Duration::from_millis(5),
            username: "u".to_string(),
            password: "p".to_string(),
            // Discard port: connection attempts fail fast, which is what
            // the pool-attach failure paths rely on.
            host: "127.0.0.1".to_string(),
            tables: HashMap::new(),
            seed_connect_timeout: Duration::from_millis(100),
        }
    }

    fn seeded_registry(count: usize) -> Arc<ShardRegistry> {
        let registry = Arc::new(ShardRegistry::new());
        let mut shards = HashMap::new();
        for i in 1..=count {
            shards.insert(
                format!("shard-{i}"),
                format!("mysql://u:p@127.0.0.1:{}/shard{i}_db", 4000 + i - 1),
            );
        }
        registry.seed(&shards, 4000, 1).unwrap();
        registry
    }

    fn provisioner(
        registry: Arc<ShardRegistry>,
        launcher: Arc<dyn ShardLauncher>,
        settings: ProvisionSettings,
    ) -> (Provisioner, Arc<PlacementRing>) {
        let ring = Arc::new(PlacementRing::new());
        for id in registry.active_ids() {
            ring.add(&id).unwrap();
        }
        let pool = Arc::new(ShardPool::new(PoolSettings {
            acquire_timeout: Duration::from_millis(200),
            ..PoolSettings::default()
        }));
        let provisioner = Provisioner::new(registry, pool, Arc::clone(&ring), launcher, settings);
        (provisioner, ring)
    }

    #[tokio::test]
    async fn capacity_ceiling_suppresses_provisioning() {
        let registry = seeded_registry(3);
        let launcher = Arc::new(FakeLauncher::new(true));
        let (provisioner, ring) =
            provisioner(Arc::clone(&registry), Arc::clone(&launcher) as _, settings());

        let outcome = provisioner.run().await.unwrap();
        assert_eq!(
            outcome,
            ProvisionOutcome::CapacityReached { active: 3, max: 3 }
        );
        // Nothing was launched and nothing joined the ring.
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
        assert_eq!(ring.len(), 3);
    }

    #[tokio::test]
    async fn launch_failure_discards_the_record() {
        let registry = seeded_registry(1);
        let (provisioner, ring) =
            provisioner(Arc::clone(&registry), Arc::new(BrokenLauncher), settings());

        let result = provisioner.run().await;
        assert!(matches!(result, Err(ProvisionError::Launch { .. })));

        let record = registry.get("shard-2").unwrap();
        assert_eq!(record.status, ShardStatus::Discarded);
        assert!(!ring.members().contains("shard-2"));
        assert_eq!(registry.active_count(), 1);
    }

    #[tokio::test]
    async fn readiness_timeout_keeps_shard_unpublished() {
        let registry = seeded_registry(1);
        let launcher = Arc::new(FakeLauncher::new(false));
        let (provisioner, ring) =
            provisioner(Arc::clone(&registry), Arc::clone(&launcher) as _, settings());

        let result = provisioner.run().await;
        assert!(matches!(
            result,
            Err(ProvisionError::ReadinessTimeout { attempts: 2, .. })
        ));
        assert_eq!(launcher.probes.load(Ordering::SeqCst), 2);

        // Not in the ring, no pool, record discarded.
        assert!(!ring.members().contains("shard-2"));
        assert_eq!(registry.get("shard-2").unwrap().status, ShardStatus::Discarded);
    }

    #[tokio::test]
    async fn pool_attach_failure_stops_short_of_ring_publish() {
        // Launcher reports ready but nothing listens on the endpoint, so
        // pool attach is the first step that can notice.
        let registry = seeded_registry(1);
        let launcher = Arc::new(FakeLauncher::new(true));
        let (provisioner, ring) =
            provisioner(Arc::clone(&registry), Arc::clone(&launcher) as _, settings());

        let result = provisioner.run().await;
        assert!(matches!(result, Err(ProvisionError::PoolAttach { .. })));
        assert!(!ring.members().contains("shard-2"));
        assert_eq!(registry.get("shard-2").unwrap().status, ShardStatus::Discarded);
    }

    #[tokio::test]
    async fn failed_attempts_never_reuse_identity() {
        let registry = seeded_registry(1);
        let (provisioner, _ring) = provisioner(
            Arc::clone(&registry),
            Arc::new(BrokenLauncher),
            settings(),
        );

        assert!(provisioner.run().await.is_err());
        assert!(provisioner.run().await.is_err());

        // Two failed attempts consumed shard-2 and shard-3.
        assert_eq!(registry.get("shard-2").unwrap().status, ShardStatus::Discarded);
        assert_eq!(registry.get("shard-3").unwrap().status, ShardStatus::Discarded);
    }

    #[tokio::test]
    async fn phase_is_cleared_after_a_run() {
        let registry = seeded_registry(1);
        let (provisioner, _ring) =
            provisioner(registry, Arc::new(BrokenLauncher), settings());
        let _ = provisioner.run().await;
        assert_eq!(provisioner.current_phase(), None);
    }
}
