//! shardgrid-placement — consistent-hash placement for shard keys.
//!
//! Maps arbitrary string keys to the currently active set of shard
//! identifiers. Reads vastly outnumber writes, so the ring state is an
//! immutable snapshot behind an atomic pointer: every `lookup` is
//! lock-free, and `add`/`remove` publish a complete replacement that
//! in-flight lookups either see entirely or not at all.

pub mod ring;

pub use ring::{PlacementError, PlacementRing, VIRTUAL_NODES};
