//! The instantiation orchestrator.
//!
//! A single externally visible operation, `instantiate`, wrapping the
//! trigger evaluator in a read-modify-write loop with bounded conflict
//! retry. A negative decision is a successful no-op, not an error.

use std::sync::Arc;

use tracing::{debug, info};

use gantry_model::{
    DefinitionCodec, RolloutDetails, TriggerType, WorkloadDefinition, decode_definition,
    instance_name,
};
use gantry_trigger::{
    ImageStreamLookup, TemplateEq, decide_rollout_with, default_template_eq,
    resolve_image_triggers,
};

use crate::admission::Admission;
use crate::error::{RolloutError, RolloutResult};
use crate::retry::retry_conflict;
use crate::store::{DefinitionStore, InstanceStore};

/// Default bounded retry budget for conflict-looping commits.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Options on an instantiate request.
#[derive(Debug, Clone, Default)]
pub struct InstantiateOptions {
    /// Treat the request as a manual rollout regardless of triggers.
    pub force: bool,
    /// Resolve image triggers against the image streams before deciding.
    pub latest: bool,
    /// Trigger types excluded from resolution.
    pub excluded: Vec<TriggerType>,
}

/// Result of an instantiate request.
#[derive(Debug, Clone, PartialEq)]
pub enum InstantiateOutcome {
    /// A rollout was committed; the updated definition.
    Updated(WorkloadDefinition),
    /// No trigger condition justified a rollout. Success, not an error.
    Unchanged,
}

/// Orchestrates rollout instantiation against the storage, image, and
/// admission collaborators.
pub struct Instantiator {
    definitions: Arc<dyn DefinitionStore>,
    instances: Arc<dyn InstanceStore>,
    images: Arc<dyn ImageStreamLookup>,
    admission: Arc<dyn Admission>,
    codec: Arc<dyn DefinitionCodec>,
    template_eq: TemplateEq,
    max_attempts: u32,
}

impl Instantiator {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        instances: Arc<dyn InstanceStore>,
        images: Arc<dyn ImageStreamLookup>,
        admission: Arc<dyn Admission>,
        codec: Arc<dyn DefinitionCodec>,
    ) -> Self {
        Self {
            definitions,
            instances,
            images,
            admission,
            codec,
            template_eq: default_template_eq,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the conflict retry budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Override the template comparison used by the rollout decision.
    pub fn with_template_eq(mut self, template_eq: TemplateEq) -> Self {
        self.template_eq = template_eq;
        self
    }

    /// Decide and, if warranted, commit a new rollout version for the
    /// named definition. Conflicting commits restart the whole attempt
    /// against freshly read state, up to the retry budget.
    pub fn instantiate(
        &self,
        namespace: &str,
        name: &str,
        options: &InstantiateOptions,
    ) -> RolloutResult<InstantiateOutcome> {
        retry_conflict(self.max_attempts, RolloutError::is_conflict, || {
            self.attempt(namespace, name, options)
        })
    }

    fn attempt(
        &self,
        namespace: &str,
        name: &str,
        options: &InstantiateOptions,
    ) -> RolloutResult<InstantiateOutcome> {
        let (mut definition, resource_version) = self
            .definitions
            .get(namespace, name)?
            .ok_or_else(|| RolloutError::DefinitionNotFound(format!("{namespace}/{name}")))?;

        if definition.spec.paused {
            return Err(RolloutError::Invalid(format!(
                "cannot instantiate paused definition {}",
                definition.label()
            )));
        }

        if options.latest {
            resolve_image_triggers(
                &mut definition,
                &*self.images,
                options.force,
                &options.excluded,
            )?;
        }

        // Every committed version has exactly one instance; a missing
        // instance for a non-zero version means the reconciliation
        // invariant broke upstream.
        let decoded = if definition.status.latest_version > 0 {
            let latest_name = instance_name(&definition.name, definition.status.latest_version);
            let instance = self
                .instances
                .get(namespace, &latest_name)?
                .ok_or_else(|| {
                    RolloutError::IllegalState(format!(
                        "definition {} is at version {} but instance {} does not exist",
                        definition.label(),
                        definition.status.latest_version,
                        latest_name
                    ))
                })?;
            Some(decode_definition(&instance, &*self.codec)?)
        } else {
            None
        };

        let (should_rollout, causes) = decide_rollout_with(
            &definition,
            decoded.as_ref(),
            options.force,
            self.template_eq,
        )?;
        if !should_rollout {
            debug!(definition = %definition.label(), "no trigger condition warrants a rollout");
            return Ok(InstantiateOutcome::Unchanged);
        }

        definition.status.details = RolloutDetails::from_causes(causes);
        definition.status.latest_version += 1;

        self.admission.mutate(&mut definition)?;
        self.admission.validate(&definition)?;

        let (committed, _) = self.definitions.update(&definition, resource_version)?;
        info!(
            definition = %committed.label(),
            version = committed.status.latest_version,
            cause = committed
                .status
                .details
                .as_ref()
                .map(|d| d.message.as_str())
                .unwrap_or(""),
            "rollout committed"
        );
        Ok(InstantiateOutcome::Updated(committed))
    }
}
