//! gantry-model — the domain model for Gantry rollouts.
//!
//! Defines the versioned-workload data model shared by the trigger
//! evaluator, instantiation orchestrator, rollback generator, and
//! retention resolver:
//!
//! - **`types`** — `WorkloadDefinition` (spec + status), triggers,
//!   strategies, causes
//! - **`phase`** — the rollout phase lattice (New → Pending → Running →
//!   {Complete | Failed})
//! - **`conditions`** — condition get/set/remove over a definition status
//! - **`instance`** — `RolloutInstance` plus the annotation scheme that
//!   ties an instance back to the definition snapshot it was built from
//! - **`codec`** — the injected definition codec used to embed snapshots
//!   in instance annotations

pub mod codec;
pub mod conditions;
pub mod error;
pub mod fixtures;
pub mod instance;
pub mod phase;
pub mod types;

pub use codec::{DefinitionCodec, JsonCodec};
pub use conditions::{get_condition, new_condition, remove_condition, set_condition};
pub use error::{ModelError, ModelResult};
pub use instance::{
    RolloutInstance, active_instance, decode_definition, deployer_pod_name, instance_name,
    instances_for_cleanup, latest_instance_info, make_instance, sort_by_version_desc,
};
pub use phase::RolloutPhase;
pub use types::*;
