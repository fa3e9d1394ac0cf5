//! Pool error types.

use thiserror::Error;

use crate::pool::ScatterOutcome;

/// Errors raised by shard pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("shard {0} not found")]
    ShardNotFound(String),

    #[error("shard {0} already exists")]
    ShardExists(String),

    #[error("failed to connect to shard {shard}: {source}")]
    Connect {
        shard: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to execute query on shard {shard}: {detail}")]
    Execution { shard: String, detail: String },

    /// Scatter-gather completed with at least one failed shard. Rows from
    /// the shards that did succeed are carried along so the caller can
    /// decide whether a partial union is acceptable.
    #[error("scatter-gather failed on shards [{}]: {first_error}", failed_shards.join(", "))]
    PartialFailure {
        failed_shards: Vec<String>,
        first_error: String,
        partial: ScatterOutcome,
    },
}

impl PoolError {
    /// The shards that did not contribute, if this is a partial failure.
    pub fn failed_shards(&self) -> &[String] {
        match self {
            PoolError::PartialFailure { failed_shards, .. } => failed_shards,
            _ => &[],
        }
    }
}
