//! Rollback candidate generation.
//!
//! `generate_rollback` is pure: it merges selected fields from a
//! historical snapshot onto the current definition, disables automatic
//! image triggers, and bumps the version. The `RollbackGenerator` does
//! the surrounding I/O: resolving the target revision, decoding the
//! snapshot, and validating the request. The candidate is returned, not
//! committed — callers submit it as an instantiate/update of their own.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use gantry_model::{DefinitionCodec, WorkloadDefinition, decode_definition, instance_name};

use crate::error::{RolloutError, RolloutResult};
use crate::store::{DefinitionStore, InstanceStore};

/// Which parts of the historical snapshot to merge onto the candidate.
#[derive(Debug, Clone, Default)]
pub struct RollbackSpec {
    /// Target revision; 0 means "the previous rollout".
    pub revision: i64,
    pub include_template: bool,
    pub include_triggers: bool,
    /// Replica count and selector.
    pub include_replication_meta: bool,
    pub include_strategy: bool,
}

/// Merge fields from a historical definition `to` onto a copy of the
/// current definition `from`, per the inclusion spec.
///
/// Regardless of the inclusion flags, every image-change trigger on the candidate
/// ends up with `automatic = false`: a rollback must never be
/// immediately undone by a pending automatic image trigger. The
/// candidate's version is unconditionally bumped.
pub fn generate_rollback(
    from: &WorkloadDefinition,
    to: &WorkloadDefinition,
    spec: &RollbackSpec,
) -> WorkloadDefinition {
    let mut candidate = from.clone();

    if spec.include_template {
        candidate.spec.template = to.spec.template.clone();
    }
    if spec.include_replication_meta {
        candidate.spec.replicas = to.spec.replicas;
        candidate.spec.selector = to
            .spec
            .selector
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
    }
    if spec.include_triggers {
        candidate.spec.triggers = to.spec.triggers.clone();
    }
    if spec.include_strategy {
        candidate.spec.strategy = to.spec.strategy.clone();
    }

    for trigger in &mut candidate.spec.triggers {
        if let Some(params) = trigger.image_params_mut() {
            params.automatic = false;
        }
    }

    candidate.status.latest_version += 1;
    candidate
}

/// Builds rollback candidates from the definition/instance corpus.
pub struct RollbackGenerator {
    definitions: Arc<dyn DefinitionStore>,
    instances: Arc<dyn InstanceStore>,
    codec: Arc<dyn DefinitionCodec>,
}

impl RollbackGenerator {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        instances: Arc<dyn InstanceStore>,
        codec: Arc<dyn DefinitionCodec>,
    ) -> Self {
        Self {
            definitions,
            instances,
            codec,
        }
    }

    /// Produce a rollback candidate for the named definition, merging
    /// the requested annotations onto it. The candidate is not
    /// persisted.
    pub fn generate(
        &self,
        namespace: &str,
        name: &str,
        spec: &RollbackSpec,
        updated_annotations: &HashMap<String, String>,
    ) -> RolloutResult<WorkloadDefinition> {
        let (from, _) = self
            .definitions
            .get(namespace, name)?
            .ok_or_else(|| RolloutError::DefinitionNotFound(format!("{namespace}/{name}")))?;

        let latest = from.status.latest_version;
        if latest == 0 {
            return Err(RolloutError::Invalid(format!(
                "cannot rollback an undeployed definition {}",
                from.label()
            )));
        }
        if spec.revision == 0 && latest == 1 {
            return Err(RolloutError::Invalid(format!(
                "no previous rollout exists for definition {}",
                from.label()
            )));
        }
        if spec.revision < 0 {
            return Err(RolloutError::Invalid(format!(
                "revision must be non-negative, got {}",
                spec.revision
            )));
        }
        let revision = if spec.revision == 0 {
            latest - 1
        } else {
            spec.revision
        };
        if revision == latest {
            return Err(RolloutError::Invalid(format!(
                "version {revision} is already the latest"
            )));
        }

        let target = instance_name(name, revision);
        let instance = self
            .instances
            .get(namespace, &target)?
            .ok_or_else(|| RolloutError::InstanceNotFound(format!("{namespace}/{target}")))?;
        let to = decode_definition(&instance, &*self.codec)?;

        let mut candidate = generate_rollback(&from, &to, spec);
        candidate
            .annotations
            .extend(updated_annotations.iter().map(|(k, v)| (k.clone(), v.clone())));

        info!(
            definition = %from.label(),
            from_version = latest,
            to_version = revision,
            "rollback candidate generated"
        );
        Ok(candidate)
    }
}
