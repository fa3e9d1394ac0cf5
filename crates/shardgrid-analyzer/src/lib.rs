//! shardgrid-analyzer — static SQL analysis for query routing.
//!
//! Parses an incoming statement, identifies its target table, and extracts
//! the equality-bound value of the table's shard-key column when one exists.
//! The router turns a bound key into a single-shard execution; everything
//! else becomes scatter-gather.
//!
//! Built on `sqlparser` with the MySQL dialect. Analysis never executes
//! anything; it inspects the AST only.

pub mod analyzer;

pub use analyzer::{analyze, Analysis, AnalyzeError};
