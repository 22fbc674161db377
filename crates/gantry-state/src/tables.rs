//! redb table definitions for the Gantry state store.
//!
//! Both tables use `&str` keys and `&[u8]` values (JSON-serialized
//! domain types). Keys follow the pattern `{namespace}/{name}`, so a
//! namespace scan is a prefix scan.

use redb::TableDefinition;

/// Workload definitions keyed by `{namespace}/{name}`. Values are a
/// versioned envelope carrying the resource version alongside the
/// definition.
pub const DEFINITIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("definitions");

/// Rollout instances keyed by `{namespace}/{definition}-{version}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");
