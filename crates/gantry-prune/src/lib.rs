//! Retention resolver: given the live definitions and the historical
//! rollout instances, decide which instances are safe to delete.
//!
//! Resolution is pure — nothing here touches storage. Callers list
//! definitions and instances, run [`resolve_prunable`], and delete the
//! returned candidates themselves (deletion must be idempotent; the
//! merge resolver may yield duplicates when both strategies select the
//! same instance).

pub mod filter;
pub mod policy;
pub mod resolve;

pub use filter::{InstancePredicate, and_chain, inactive, older_than, owned};
pub use policy::RetentionPolicy;
pub use resolve::{
    OrphanResolver, PerDefinitionResolver, Resolver, UnionResolver, resolve_prunable,
};
