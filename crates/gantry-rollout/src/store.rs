//! Storage collaborator contracts.
//!
//! The orchestrator never talks to a concrete store: it consumes these
//! narrow traits. The definition store is version-checked at commit time
//! (optimistic concurrency, never locked); the instance store is
//! read-mostly from this crate's perspective.

use gantry_model::{RolloutInstance, WorkloadDefinition};
use thiserror::Error;

/// Opaque resource version used for conditional updates.
pub type ResourceVersion = u64;

/// Errors surfaced by storage collaborators. Absence is modeled as
/// `Ok(None)`, not as an error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The expected resource version did not match at commit time.
    #[error("conflict writing {0}: resource version mismatch")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Store of workload definitions with conditional update.
pub trait DefinitionStore: Send + Sync {
    /// Fetch a definition and its current resource version.
    fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<(WorkloadDefinition, ResourceVersion)>, StoreError>;

    /// Commit a definition if the stored resource version still matches
    /// `expected`; a concurrent writer surfaces as `StoreError::Conflict`.
    fn update(
        &self,
        definition: &WorkloadDefinition,
        expected: ResourceVersion,
    ) -> Result<(WorkloadDefinition, ResourceVersion), StoreError>;
}

/// Store of materialized rollout instances.
pub trait InstanceStore: Send + Sync {
    fn get(&self, namespace: &str, name: &str) -> Result<Option<RolloutInstance>, StoreError>;

    /// List instances in a namespace, optionally restricted to those
    /// owned by one definition.
    fn list(&self, namespace: &str, owner: Option<&str>) -> Result<Vec<RolloutInstance>, StoreError>;

    /// Delete an instance. Returns whether it existed; deleting an
    /// already-deleted instance is not an error.
    fn delete(&self, namespace: &str, name: &str) -> Result<bool, StoreError>;
}
