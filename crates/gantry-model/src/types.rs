//! Core domain types for Gantry.
//!
//! A `WorkloadDefinition` is the desired-state record for a versioned
//! workload. Every committed rollout increments `status.latest_version`
//! by exactly one and materializes a `RolloutInstance` named
//! `{definition}-{version}`. All types serialize to JSON for storage
//! and for the annotation snapshot scheme.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Unique name of a workload definition (namespace-scoped).
pub type DefinitionName = String;

/// Current unix timestamp in seconds.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ── Definition ────────────────────────────────────────────────────

/// Desired-state record for a versioned workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadDefinition {
    pub name: DefinitionName,
    pub namespace: String,
    /// Spec generation, bumped by the API layer on every spec change.
    pub generation: i64,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    pub spec: DefinitionSpec,
    pub status: DefinitionStatus,
}

impl WorkloadDefinition {
    /// Build the composite key for the definitions table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// String identifier used in logs: `{namespace}/{name}`.
    pub fn label(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Whether this definition has never produced a rollout.
    pub fn is_initial(&self) -> bool {
        self.status.latest_version == 0
    }

    /// Whether any config-change trigger is declared.
    pub fn has_config_change_trigger(&self) -> bool {
        self.spec
            .triggers
            .iter()
            .any(|t| matches!(t, Trigger::ConfigChange))
    }

    /// Whether any image-change trigger is declared.
    pub fn has_image_change_trigger(&self) -> bool {
        self.spec
            .triggers
            .iter()
            .any(|t| matches!(t, Trigger::ImageChange(_)))
    }

    /// Whether every declared image-change trigger has resolved at least
    /// once. Returns false when no image-change trigger is declared.
    pub fn has_resolved_image_triggers(&self) -> bool {
        let mut has_image_trigger = false;
        for trigger in &self.spec.triggers {
            if let Trigger::ImageChange(params) = trigger {
                has_image_trigger = true;
                if params.last_triggered_image.is_empty() {
                    return false;
                }
            }
        }
        has_image_trigger
    }
}

/// Desired state: what to run and when to roll it out again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefinitionSpec {
    /// Desired replica count for each materialized instance.
    pub replicas: u32,
    /// Label selector correlating instances and pods to this definition.
    pub selector: HashMap<String, String>,
    /// Pod template materialized by every rollout.
    pub template: PodTemplate,
    /// Ordered trigger list; evaluation order is declaration order.
    pub triggers: Vec<Trigger>,
    /// How a new instance replaces the previous one.
    pub strategy: Strategy,
    /// Seconds a pod must be ready before it counts as available.
    pub min_ready_seconds: u32,
    /// How many old instances to keep around, if bounded.
    pub revision_history_limit: Option<u32>,
    /// A paused definition never rolls out automatically.
    pub paused: bool,
}

/// Observed state, written only by the reconciliation path and by
/// instantiate/rollback commits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DefinitionStatus {
    /// Monotonic rollout version; 0 means "never rolled out".
    pub latest_version: i64,
    /// Last spec generation acted upon.
    pub observed_generation: i64,
    pub replicas: u32,
    pub updated_replicas: u32,
    pub available_replicas: u32,
    pub unavailable_replicas: u32,
    pub ready_replicas: u32,
    pub conditions: Vec<Condition>,
    /// Causes of the most recent rollout.
    pub details: Option<RolloutDetails>,
}

// ── Pod template ──────────────────────────────────────────────────

/// The pod template stamped into every rollout instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PodTemplate {
    pub labels: HashMap<String, String>,
    pub containers: Vec<Container>,
    pub init_containers: Vec<Container>,
}

impl PodTemplate {
    /// All containers, main and init, in declaration order.
    pub fn all_containers_mut(&mut self) -> impl Iterator<Item = &mut Container> {
        self.containers
            .iter_mut()
            .chain(self.init_containers.iter_mut())
    }
}

/// A single container in the pod template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

// ── Triggers ──────────────────────────────────────────────────────

/// A declared condition that can cause a new rollout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Fire when the pod template changes.
    ConfigChange,
    /// Fire when a referenced image stream tag moves.
    ImageChange(ImageChangeParams),
    /// Only fires through an explicit operator request.
    Manual,
}

impl Trigger {
    /// Discriminant for exclusion lists and cause records.
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            Trigger::ConfigChange => TriggerType::ConfigChange,
            Trigger::ImageChange(_) => TriggerType::ImageChange,
            Trigger::Manual => TriggerType::Manual,
        }
    }

    pub fn image_params(&self) -> Option<&ImageChangeParams> {
        match self {
            Trigger::ImageChange(params) => Some(params),
            _ => None,
        }
    }

    pub fn image_params_mut(&mut self) -> Option<&mut ImageChangeParams> {
        match self {
            Trigger::ImageChange(params) => Some(params),
            _ => None,
        }
    }
}

/// Trigger discriminant, used for exclusion lists on instantiate requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    ConfigChange,
    ImageChange,
    Manual,
}

/// Parameters of an image-change trigger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageChangeParams {
    /// Whether the trigger fires without operator involvement.
    pub automatic: bool,
    /// Names of template containers (main or init) to retag.
    pub container_names: Vec<String>,
    /// The image stream tag watched by this trigger.
    pub from: StreamTagRef,
    /// The last resolved image reference actually applied; empty until
    /// the trigger resolves for the first time.
    #[serde(default)]
    pub last_triggered_image: String,
}

/// Reference to an image stream tag in `name:tag` form. The namespace
/// defaults to the owning definition's namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamTagRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl StreamTagRef {
    /// Split the `name:tag` reference into stream name and tag.
    pub fn split(&self) -> ModelResult<(&str, &str)> {
        match self.name.split_once(':') {
            Some((stream, tag)) if !stream.is_empty() && !tag.is_empty() => Ok((stream, tag)),
            _ => Err(ModelError::InvalidTagRef(self.name.clone())),
        }
    }

    /// Whether two references point at the same stream tag once the
    /// namespace default is applied.
    pub fn same_tag(&self, other: &StreamTagRef, default_namespace: &str) -> bool {
        let ns = |r: &StreamTagRef| {
            r.namespace
                .clone()
                .unwrap_or_else(|| default_namespace.to_string())
        };
        self.name == other.name && ns(self) == ns(other)
    }
}

// ── Strategy ──────────────────────────────────────────────────────

/// How a new rollout instance replaces the previous one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Strategy {
    /// Scale the new instance up and the old down in lockstep.
    Rolling(RollingParams),
    /// Scale the old instance down to zero, then the new one up.
    Recreate(RecreateParams),
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Rolling(RollingParams::default())
    }
}

/// Pacing parameters for a rolling strategy. Validated, not scheduled,
/// by this core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollingParams {
    /// Extra replicas permitted above the desired count during a rollout.
    pub max_surge: u32,
    /// Replicas permitted to be unavailable during a rollout.
    pub max_unavailable: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl Default for RollingParams {
    fn default() -> Self {
        Self {
            max_surge: 1,
            max_unavailable: 0,
            timeout_seconds: None,
        }
    }
}

/// Parameters for a recreate strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecreateParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// Maximum unavailable replicas a rolling definition tolerates; zero for
/// non-rolling strategies.
pub fn max_unavailable(definition: &WorkloadDefinition) -> u32 {
    match &definition.spec.strategy {
        Strategy::Rolling(params) => params.max_unavailable,
        _ => 0,
    }
}

/// Maximum surge replicas a rolling definition tolerates; zero for
/// non-rolling strategies.
pub fn max_surge(definition: &WorkloadDefinition) -> u32 {
    match &definition.spec.strategy {
        Strategy::Rolling(params) => params.max_surge,
        _ => 0,
    }
}

// ── Causes ────────────────────────────────────────────────────────

/// Recorded justification for why a rollout was created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cause {
    ConfigChange,
    ImageChange {
        /// The resolved image reference that moved.
        image: String,
    },
    Manual,
}

impl Cause {
    /// Human summary recorded in `status.details.message`.
    pub fn summary(&self) -> &'static str {
        match self {
            Cause::ConfigChange => "config change",
            Cause::ImageChange { .. } => "image change",
            Cause::Manual => "manual change",
        }
    }
}

/// Causes and summary of the most recent rollout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RolloutDetails {
    pub message: String,
    pub causes: Vec<Cause>,
}

impl RolloutDetails {
    /// Build details from an ordered cause list. The first cause picks
    /// the summary message.
    pub fn from_causes(causes: Vec<Cause>) -> Option<Self> {
        let message = causes.first()?.summary().to_string();
        Some(Self { message, causes })
    }
}

// ── Conditions ────────────────────────────────────────────────────

/// Condition kinds reported on a definition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    Available,
    Progressing,
    ReplicaFailure,
}

/// Three-valued condition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A single reported condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    /// Unix seconds of the last update to this condition.
    pub last_update_time: u64,
    /// Unix seconds of the last status flip of this condition.
    pub last_transition_time: u64,
}
