//! shardd — the shardgrid daemon.
//!
//! One process hosting all three planes:
//!
//! - **data plane** — the query router: analyze → place → execute
//! - **control plane** — the coordinator: snapshots + health
//! - **control loop** — sampling, policy evaluation, provisioning
//!
//! # Usage
//!
//! ```text
//! shardd --config config.json
//! ```
//!
//! Exits 0 after a graceful SIGINT/SIGTERM shutdown; a startup failure
//! (invalid config, unreachable initial shards) exits non-zero.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use shardgrid_api::{control_router, query_router, ControlState, QueryState};
use shardgrid_launcher::{DockerLauncher, DockerLauncherConfig};
use shardgrid_metrics::ShardSampler;
use shardgrid_placement::PlacementRing;
use shardgrid_pool::{PoolSettings, ShardPool};
use shardgrid_scaler::{Autoscaler, PolicyParams, ProvisionSettings, Provisioner};
use shardgrid_state::{epoch_secs, Config, ShardRegistry, SnapshotMap};

#[derive(Parser)]
#[command(name = "shardd", about = "shardgrid daemon")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,shardd=debug,shardgrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    info!(config = %cli.config.display(), "starting shardgrid daemon");

    let config = Config::load(&cli.config).context("failed to load configuration")?;
    info!(
        shards = config.shards.len(),
        strategy = %config.scaling_strategy,
        "configuration loaded"
    );

    // Initial pools: every configured shard must be reachable at boot.
    let pool = Arc::new(ShardPool::new(PoolSettings::default()));
    pool.init(&config.shards)
        .await
        .context("failed to initialize shard pools")?;

    let registry = Arc::new(ShardRegistry::new());
    registry
        .seed(&config.shards, config.ports.base_port, epoch_secs())
        .context("failed to seed shard registry")?;

    let ring = Arc::new(PlacementRing::new());
    for id in registry.active_ids() {
        ring.add(&id).context("failed to build placement ring")?;
    }
    info!(members = ring.len(), "placement ring initialized");

    let snapshots = Arc::new(SnapshotMap::new());
    let sampler = Arc::new(ShardSampler::new(Arc::clone(&pool), config.table_names()));

    let launcher = Arc::new(DockerLauncher::new(DockerLauncherConfig {
        network_name: config.docker.network_name.clone(),
        image: config.docker.image.clone(),
        container_prefix: config.docker.container_prefix.clone(),
        username: config.database.username.clone(),
        password: config.database.password.clone(),
        root_password: config.database.root_password.clone(),
    }));

    let provisioner = Arc::new(Provisioner::new(
        Arc::clone(&registry),
        Arc::clone(&pool),
        Arc::clone(&ring),
        launcher,
        ProvisionSettings {
            base_port: config.ports.base_port,
            max_shards: config.limits.max_shards,
            max_probe_attempts: config.limits.max_connection_attempts,
            probe_interval: Duration::from_secs(
                config.limits.connection_retry_interval_seconds,
            ),
            username: config.database.username.clone(),
            password: config.database.password.clone(),
            host: "127.0.0.1".to_string(),
            tables: config.table_shard_keys.clone(),
            seed_connect_timeout: Duration::from_secs(5),
        },
    ));

    let autoscaler = Arc::new(Autoscaler::new(
        Arc::clone(&registry),
        sampler,
        Arc::clone(&snapshots),
        provisioner,
        PolicyParams {
            mode: config.scaling_strategy,
            cpu_threshold_percent: config.scaling_thresholds.cpu_threshold_percent,
            memory_threshold_percent: config.scaling_thresholds.memory_threshold_percent,
            connection_threshold: config.scaling_thresholds.connection_threshold,
            qps_threshold: config.scaling_thresholds.qps_threshold,
            entry_threshold_per_shard: config
                .scaling_thresholds
                .total_entry_threshold_per_shard,
        },
        Duration::from_secs(config.monitoring_interval_seconds),
        Duration::from_secs(config.cooldown_seconds),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Control loop.
    let loop_task = {
        let autoscaler = Arc::clone(&autoscaler);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { autoscaler.run(shutdown).await })
    };

    // Data plane.
    let query_app = query_router(QueryState {
        shard_keys: Arc::new(config.table_shard_keys.clone()),
        ring: Arc::clone(&ring),
        pool: Arc::clone(&pool),
        registry: Arc::clone(&registry),
    });
    let query_listener = TcpListener::bind(("0.0.0.0", config.ports.query_router_port))
        .await
        .context("failed to bind query router port")?;
    info!(port = config.ports.query_router_port, "query router listening");
    let query_task = tokio::spawn(serve(query_listener, query_app, shutdown_rx.clone()));

    // Control plane.
    let control_app = control_router(ControlState {
        snapshots: Arc::clone(&snapshots),
        mode: config.scaling_strategy,
        monitoring_interval_secs: config.monitoring_interval_seconds,
    });
    let control_listener = TcpListener::bind(("0.0.0.0", config.ports.coordinator_port))
        .await
        .context("failed to bind coordinator port")?;
    info!(port = config.ports.coordinator_port, "coordinator listening");
    let control_task = tokio::spawn(serve(control_listener, control_app, shutdown_rx));

    info!("all services started");

    shutdown_signal().await?;
    info!("shutdown signal received, stopping services");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(loop_task, query_task, control_task);
    pool.close().await;
    info!("services stopped, exiting");
    Ok(())
}

/// Serve one axum router until the shutdown channel flips.
async fn serve(listener: TcpListener, app: axum::Router, mut shutdown: watch::Receiver<bool>) {
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await;
    if let Err(e) = result {
        error!(error = %e, "http server error");
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("failed to register SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("ctrl-c handler failed")?,
            _ = sigterm.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("ctrl-c handler failed")
    }
}
