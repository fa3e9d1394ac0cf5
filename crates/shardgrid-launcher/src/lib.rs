//! shardgrid-launcher — the seam for bringing up shard database instances.
//!
//! The control loop provisions through the [`ShardLauncher`] trait only;
//! anything that can start a MySQL endpoint on a port satisfies it. The
//! shipped implementation drives a container runtime through its CLI
//! ([`docker::DockerLauncher`]).

pub mod docker;

use async_trait::async_trait;
use thiserror::Error;

pub use docker::{DockerLauncher, DockerLauncherConfig};

/// Errors raised by launcher implementations.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("launcher invocation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("launch failed for shard {shard}: {detail}")]
    Failed { shard: String, detail: String },
}

/// Everything a launcher needs to bring up one shard instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub shard_id: String,
    /// Host port the instance must listen on.
    pub port: u16,
    /// Logical database to create on the instance.
    pub database_name: String,
}

/// Brings up, probes, and tears down backing database instances.
#[async_trait]
pub trait ShardLauncher: Send + Sync {
    /// Start the backing instance. Returns once the runtime has accepted
    /// the workload; readiness is the caller's concern via [`probe`].
    ///
    /// [`probe`]: ShardLauncher::probe
    async fn launch(&self, spec: &LaunchSpec) -> Result<(), LaunchError>;

    /// Authenticated liveness check against the instance.
    async fn probe(&self, spec: &LaunchSpec) -> bool;

    /// Tear the instance down. Not invoked automatically on provisioning
    /// failure; exposed for operators and tests.
    async fn destroy(&self, spec: &LaunchSpec) -> Result<(), LaunchError>;
}
