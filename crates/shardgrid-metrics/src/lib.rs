//! shardgrid-metrics — per-shard metric sampling.
//!
//! Produces one [`MetricSnapshot`](shardgrid_state::MetricSnapshot) per
//! shard per control tick: a liveness ping gates the sample, host-level
//! signals come from `sysinfo`, shard-level signals from the shard's own
//! pool and `information_schema`. Any sub-query failure is logged and
//! zeroed; only a ping failure marks the shard unhealthy.

pub mod host;
pub mod sampler;

pub use host::{HostProbe, HostSample};
pub use sampler::ShardSampler;
