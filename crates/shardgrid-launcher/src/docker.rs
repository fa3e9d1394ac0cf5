//! Docker CLI launcher.
//!
//! Brings up one MySQL container per shard, named
//! `{container_prefix}-{shard_id}`, port-mapped onto the host. Probing
//! goes through `mysqladmin ping` inside the container so it exercises the
//! authenticated path, not just the TCP listener.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{LaunchError, LaunchSpec, ShardLauncher};

/// Runtime parameters for the docker launcher.
#[derive(Debug, Clone)]
pub struct DockerLauncherConfig {
    pub network_name: String,
    pub image: String,
    pub container_prefix: String,
    pub username: String,
    pub password: String,
    pub root_password: String,
}

/// Launches shard instances with `docker run`.
pub struct DockerLauncher {
    config: DockerLauncherConfig,
}

impl DockerLauncher {
    pub fn new(config: DockerLauncherConfig) -> Self {
        Self { config }
    }

    fn container_name(&self, shard_id: &str) -> String {
        format!("{}-{}", self.config.container_prefix, shard_id)
    }

    fn run_args(&self, spec: &LaunchSpec) -> Vec<String> {
        vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.container_name(&spec.shard_id),
            "--network".to_string(),
            self.config.network_name.clone(),
            "-p".to_string(),
            format!("{}:3306", spec.port),
            "-e".to_string(),
            format!("MYSQL_ROOT_PASSWORD={}", self.config.root_password),
            "-e".to_string(),
            format!("MYSQL_DATABASE={}", spec.database_name),
            "-e".to_string(),
            format!("MYSQL_USER={}", self.config.username),
            "-e".to_string(),
            format!("MYSQL_PASSWORD={}", self.config.password),
            self.config.image.clone(),
        ]
    }

    fn probe_args(&self, spec: &LaunchSpec) -> Vec<String> {
        vec![
            "exec".to_string(),
            self.container_name(&spec.shard_id),
            "mysqladmin".to_string(),
            "ping".to_string(),
            "-h".to_string(),
            "localhost".to_string(),
            "-u".to_string(),
            self.config.username.clone(),
            format!("-p{}", self.config.password),
        ]
    }
}

#[async_trait]
impl ShardLauncher for DockerLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<(), LaunchError> {
        let output = Command::new("docker")
            .args(self.run_args(spec))
            .output()
            .await?;

        if !output.status.success() {
            return Err(LaunchError::Failed {
                shard: spec.shard_id.clone(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(
            shard = %spec.shard_id,
            container = %self.container_name(&spec.shard_id),
            port = spec.port,
            "shard container launched"
        );
        Ok(())
    }

    async fn probe(&self, spec: &LaunchSpec) -> bool {
        let result = Command::new("docker")
            .args(self.probe_args(spec))
            .output()
            .await;

        match result {
            Ok(output) => {
                let ready = output.status.success();
                debug!(shard = %spec.shard_id, ready, "shard readiness probe");
                ready
            }
            Err(e) => {
                warn!(shard = %spec.shard_id, error = %e, "readiness probe invocation failed");
                false
            }
        }
    }

    async fn destroy(&self, spec: &LaunchSpec) -> Result<(), LaunchError> {
        let output = Command::new("docker")
            .args(["rm", "-f", &self.container_name(&spec.shard_id)])
            .output()
            .await?;

        if !output.status.success() {
            return Err(LaunchError::Failed {
                shard: spec.shard_id.clone(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(shard = %spec.shard_id, "shard container destroyed");
        Ok(())
    }
}
