//! gantry-rollout — instantiation orchestration and rollback generation.
//!
//! The `Instantiator` wraps the trigger evaluator in a read-modify-write
//! loop against the definition store: fetch, resolve image triggers,
//! decide, bump the version, run admission, and commit with optimistic
//! concurrency. Conflicts restart the whole attempt up to a bounded
//! budget.
//!
//! The rollback side is split the same way: a pure `generate_rollback`
//! that merges fields from a historical snapshot onto the current
//! definition, and a `RollbackGenerator` that does the surrounding I/O.

pub mod admission;
pub mod error;
pub mod instantiate;
pub mod retry;
pub mod rollback;
pub mod store;

pub use admission::{Admission, NoAdmission, TriggerAdmission};
pub use error::{RolloutError, RolloutResult};
pub use instantiate::{DEFAULT_MAX_ATTEMPTS, InstantiateOptions, InstantiateOutcome, Instantiator};
pub use retry::retry_conflict;
pub use rollback::{RollbackGenerator, RollbackSpec, generate_rollback};
pub use store::{DefinitionStore, InstanceStore, ResourceVersion, StoreError};
