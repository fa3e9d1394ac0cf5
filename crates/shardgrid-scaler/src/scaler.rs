//! The control loop: sample → publish → evaluate → provision.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info};

use shardgrid_metrics::ShardSampler;
use shardgrid_state::{epoch_secs, MetricSnapshot, ScalingMode, ShardRegistry, SnapshotMap};

use crate::policy::{evaluate, PolicyParams, ScaleTrigger};
use crate::provision::{ProvisionOutcome, Provisioner};

/// Headroom on top of the sampler's internal deadlines: liveness ping
/// (5 s) plus the one-second CPU window plus slack.
const SAMPLE_TIMEOUT: Duration = Duration::from_secs(10);

/// The autoscaler: drives sampling and scaling on a fixed cadence.
pub struct Autoscaler {
    registry: Arc<ShardRegistry>,
    sampler: Arc<ShardSampler>,
    snapshots: Arc<SnapshotMap>,
    provisioner: Arc<Provisioner>,
    params: PolicyParams,
    interval: Duration,
    /// Suppress firings for this long after a provisioning action ends.
    cooldown: Duration,
    /// Debounce flag: one provisioning action in flight at a time.
    in_flight: Arc<AtomicBool>,
    cooldown_until: Arc<Mutex<Option<Instant>>>,
}

impl Autoscaler {
    pub fn new(
        registry: Arc<ShardRegistry>,
        sampler: Arc<ShardSampler>,
        snapshots: Arc<SnapshotMap>,
        provisioner: Arc<Provisioner>,
        params: PolicyParams,
        interval: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            registry,
            sampler,
            snapshots,
            provisioner,
            params,
            interval,
            cooldown,
            in_flight: Arc::new(AtomicBool::new(false)),
            cooldown_until: Arc::new(Mutex::new(None)),
        }
    }

    /// Run the monitoring loop until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            strategy = %self.params.mode,
            "autoscaler control loop started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("autoscaler control loop shutting down");
                    break;
                }
            }
        }
    }

    /// One control tick: fan out sampling, publish the snapshot map,
    /// evaluate the policy, maybe kick off provisioning.
    pub async fn tick(&self) {
        let ids = self.registry.active_ids();
        debug!(shards = ids.len(), "collecting metrics from all shards");

        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            let sampler = Arc::clone(&self.sampler);
            let task_id = id.clone();
            tasks.push((
                id,
                tokio::spawn(async move {
                    timeout(SAMPLE_TIMEOUT, sampler.sample(&task_id)).await
                }),
            ));
        }

        let mut map = HashMap::new();
        for (id, task) in tasks {
            let snapshot = match task.await {
                Ok(Ok(snapshot)) => snapshot,
                Ok(Err(_)) => {
                    error!(shard = %id, "sampling timed out");
                    MetricSnapshot::unhealthy(&id, epoch_secs())
                }
                Err(e) => {
                    error!(shard = %id, error = %e, "sampling task failed");
                    MetricSnapshot::unhealthy(&id, epoch_secs())
                }
            };
            map.insert(id, snapshot);
        }

        self.snapshots.publish(map);

        let shard_count = self.registry.active_count();
        let published = self.snapshots.load();
        if let Some(trigger) = evaluate(&self.params, &published, shard_count) {
            self.request_scale_out(trigger);
        }
    }

    /// Start a provisioning action unless one is already in flight or the
    /// cooldown window is open. Returns whether an action was started.
    fn request_scale_out(&self, trigger: ScaleTrigger) -> bool {
        if self.in_cooldown() {
            debug!(
                target = %trigger.target,
                reason = trigger.reason,
                "scaling suppressed by cooldown window"
            );
            return false;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(
                target = %trigger.target,
                reason = trigger.reason,
                "provisioning already in flight, firing suppressed"
            );
            return false;
        }

        info!(
            target = %trigger.target,
            reason = trigger.reason,
            value = trigger.value,
            "scaling triggered, starting provisioning"
        );

        let provisioner = Arc::clone(&self.provisioner);
        let in_flight = Arc::clone(&self.in_flight);
        let cooldown_until = Arc::clone(&self.cooldown_until);
        let cooldown = self.cooldown;

        tokio::spawn(async move {
            match provisioner.run().await {
                Ok(ProvisionOutcome::Completed(record)) => {
                    info!(shard = %record.id, "new shard is active and routable");
                }
                Ok(ProvisionOutcome::CapacityReached { active, max }) => {
                    info!(active, max, "scale-out suppressed: capacity reached");
                }
                Err(e) => {
                    error!(error = %e, "provisioning failed");
                }
            }
            if !cooldown.is_zero() {
                *cooldown_until.lock().expect("cooldown lock") =
                    Some(Instant::now() + cooldown);
            }
            in_flight.store(false, Ordering::SeqCst);
        });
        true
    }

    fn in_cooldown(&self) -> bool {
        let guard = self.cooldown_until.lock().expect("cooldown lock");
        matches!(*guard, Some(until) if Instant::now() < until)
    }

    /// Whether a provisioning action is currently in flight.
    pub fn provisioning_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// The configured scaling strategy, for the health endpoint.
    pub fn mode(&self) -> ScalingMode {
        self.params.mode
    }

    /// The monitoring interval, for the health endpoint.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
