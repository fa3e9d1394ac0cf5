//! Provisioning error types.

use thiserror::Error;

/// Errors that abort a provisioning attempt. None of these crash the
/// process: the control loop logs them and continues at the next tick.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to launch shard {shard}: {source}")]
    Launch {
        shard: String,
        #[source]
        source: shardgrid_launcher::LaunchError,
    },

    #[error("shard {shard} failed to become ready within {attempts} attempts")]
    ReadinessTimeout { shard: String, attempts: u32 },

    #[error("failed to attach pool for shard {shard}: {source}")]
    PoolAttach {
        shard: String,
        #[source]
        source: shardgrid_pool::PoolError,
    },

    #[error("failed to publish shard {shard} to the ring: {source}")]
    RingPublish {
        shard: String,
        #[source]
        source: shardgrid_placement::PlacementError,
    },

    #[error("registry error: {0}")]
    Registry(#[from] shardgrid_state::RegistryError),
}
