//! shardgrid-api — the two HTTP surfaces.
//!
//! The data plane (query-router service) accepts SQL over `POST /query`
//! and routes it through analysis → placement → execution. The control
//! plane (coordinator service) exposes the latest metric snapshots and
//! the loop configuration. Both are plain axum routers with cloneable
//! state, served by the daemon.
//!
//! | Surface | Method | Path | Description |
//! |---|---|---|---|
//! | data | POST | `/query` | Route or scatter a SQL statement |
//! | data | GET | `/health` | Router liveness + active shards |
//! | control | GET | `/shards` | Latest snapshot per shard |
//! | control | GET | `/health` | Coordinator liveness + strategy |

pub mod control;
pub mod query;

pub use control::{control_router, ControlState};
pub use query::{query_router, QueryState};
