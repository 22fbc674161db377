//! Candidate resolvers.
//!
//! Two independent strategies over the pre-filtered instance pool: a
//! per-definition keep-count resolver and an orphan resolver. The union
//! resolver combines them; callers own deletion.

use std::collections::HashSet;

use tracing::debug;

use gantry_model::{
    RolloutInstance, RolloutPhase, WorkloadDefinition, sort_by_version_desc,
};

use crate::filter::{and_chain, standard_chain};
use crate::policy::RetentionPolicy;

/// A pruning strategy: given the live definitions and the pre-filtered
/// instance pool, yield the instances safe to delete.
pub trait Resolver: Send + Sync {
    fn resolve(
        &self,
        definitions: &[WorkloadDefinition],
        instances: &[RolloutInstance],
    ) -> Vec<RolloutInstance>;
}

/// Retains the `keep_complete` most recent Complete and `keep_failed`
/// most recent Failed instances of each definition; everything older in
/// those two buckets is a candidate. Instances in non-terminal phases
/// are never candidates. A negative keep-count disables its bucket.
pub struct PerDefinitionResolver {
    keep_complete: i32,
    keep_failed: i32,
}

impl PerDefinitionResolver {
    pub fn new(keep_complete: i32, keep_failed: i32) -> Self {
        Self {
            keep_complete,
            keep_failed,
        }
    }

    fn bucket_overflow(
        instances: &[&RolloutInstance],
        phase: RolloutPhase,
        keep: i32,
    ) -> Vec<RolloutInstance> {
        if keep < 0 {
            return Vec::new();
        }
        let mut bucket: Vec<RolloutInstance> = instances
            .iter()
            .filter(|i| i.phase() == Some(phase))
            .map(|i| (*i).clone())
            .collect();
        sort_by_version_desc(&mut bucket);
        bucket.split_off((keep as usize).min(bucket.len()))
    }
}

impl Resolver for PerDefinitionResolver {
    fn resolve(
        &self,
        definitions: &[WorkloadDefinition],
        instances: &[RolloutInstance],
    ) -> Vec<RolloutInstance> {
        let mut candidates = Vec::new();
        for definition in definitions {
            let owned: Vec<&RolloutInstance> = instances
                .iter()
                .filter(|i| {
                    i.namespace == definition.namespace
                        && i.owner() == Some(definition.name.as_str())
                })
                .collect();
            candidates.extend(Self::bucket_overflow(
                &owned,
                RolloutPhase::Complete,
                self.keep_complete,
            ));
            candidates.extend(Self::bucket_overflow(
                &owned,
                RolloutPhase::Failed,
                self.keep_failed,
            ));
        }
        candidates
    }
}

/// Selects instances whose owning definition no longer exists, provided
/// their phase is in the filter. Defaults to the terminal phases.
pub struct OrphanResolver {
    phases: Vec<RolloutPhase>,
}

impl OrphanResolver {
    pub fn new(phases: Vec<RolloutPhase>) -> Self {
        Self { phases }
    }
}

impl Default for OrphanResolver {
    fn default() -> Self {
        Self::new(vec![RolloutPhase::Complete, RolloutPhase::Failed])
    }
}

impl Resolver for OrphanResolver {
    fn resolve(
        &self,
        definitions: &[WorkloadDefinition],
        instances: &[RolloutInstance],
    ) -> Vec<RolloutInstance> {
        let live: HashSet<(&str, &str)> = definitions
            .iter()
            .map(|d| (d.namespace.as_str(), d.name.as_str()))
            .collect();
        instances
            .iter()
            .filter(|i| {
                let Some(owner) = i.owner() else {
                    return false;
                };
                !live.contains(&(i.namespace.as_str(), owner))
                    && i.phase().is_some_and(|p| self.phases.contains(&p))
            })
            .cloned()
            .collect()
    }
}

/// Union of the member resolvers' candidate sets. Duplicates are
/// possible when strategies overlap; deletion must be idempotent.
pub struct UnionResolver {
    members: Vec<Box<dyn Resolver>>,
}

impl UnionResolver {
    pub fn new(members: Vec<Box<dyn Resolver>>) -> Self {
        Self { members }
    }
}

impl Resolver for UnionResolver {
    fn resolve(
        &self,
        definitions: &[WorkloadDefinition],
        instances: &[RolloutInstance],
    ) -> Vec<RolloutInstance> {
        self.members
            .iter()
            .flat_map(|m| m.resolve(definitions, instances))
            .collect()
    }
}

/// Run a full prune resolution: pre-filter the instance pool, then
/// apply the per-definition resolver plus, when the policy asks for it,
/// the orphan resolver.
pub fn resolve_prunable(
    definitions: &[WorkloadDefinition],
    instances: Vec<RolloutInstance>,
    policy: &RetentionPolicy,
) -> Vec<RolloutInstance> {
    let pool = and_chain(standard_chain(policy.keep_younger_than_seconds), instances);

    let mut members: Vec<Box<dyn Resolver>> = vec![Box::new(PerDefinitionResolver::new(
        policy.keep_complete,
        policy.keep_failed,
    ))];
    if policy.orphans {
        members.push(Box::new(OrphanResolver::default()));
    }

    let candidates = UnionResolver::new(members).resolve(definitions, &pool);
    debug!(
        pool = pool.len(),
        candidates = candidates.len(),
        "prune resolution finished"
    );
    candidates
}
