//! shardgrid-pool — connection pools for the shard fleet.
//!
//! Holds one `sqlx` MySQL pool per active shard and executes statements on
//! a named shard or on every shard concurrently (scatter-gather). Pools can
//! be added at runtime as new shards come up; the pool registry uses the
//! same read-mostly locking discipline as the shard registry.

pub mod error;
pub mod pool;
pub mod rows;

pub use error::PoolError;
pub use pool::{PoolSettings, ScatterOutcome, ShardPool};
pub use rows::{row_to_map, RowMap};
