//! Rollout instances and the annotation scheme that binds them to their
//! definition.
//!
//! An instance is one materialized rollout of a definition, named
//! `{definition}-{version}`. It is immutable once created except for its
//! phase/replica annotations, which are owned by the reconciliation
//! collaborator. The definition snapshot it was built from is embedded
//! in an annotation via the injected codec; version numbering is derived
//! from annotations, never separately stored.

use std::cmp::Reverse;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::codec::DefinitionCodec;
use crate::error::{ModelError, ModelResult};
use crate::phase::RolloutPhase;
use crate::types::{WorkloadDefinition, now_unix};

/// Annotation keys carried on rollout instances.
pub mod keys {
    /// Name of the owning definition.
    pub const DEFINITION: &str = "gantry.io/definition";
    /// Name of the instance itself, also stamped on pods.
    pub const INSTANCE: &str = "gantry.io/instance";
    /// Rollout version this instance materializes.
    pub const VERSION: &str = "gantry.io/version";
    /// Current phase string (new/pending/running/complete/failed).
    pub const PHASE: &str = "gantry.io/phase";
    /// Optional human reason for the current phase.
    pub const PHASE_REASON: &str = "gantry.io/phase-reason";
    /// Encoded definition snapshot at creation time.
    pub const ENCODED_DEFINITION: &str = "gantry.io/encoded-definition";
    /// Target replica count for this rollout.
    pub const DESIRED_REPLICAS: &str = "gantry.io/desired-replicas";
    /// Replica count last reported by the reconciler.
    pub const CURRENT_REPLICAS: &str = "gantry.io/replicas";
    /// Set when an operator cancelled the rollout.
    pub const CANCELLED: &str = "gantry.io/cancelled";
}

/// Suffix of the helper pod that drives an instance's rollout.
pub const DEPLOYER_POD_SUFFIX: &str = "deploy";

/// One materialized, versioned rollout of a definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RolloutInstance {
    pub name: String,
    pub namespace: String,
    /// Label selector correlating pods to this instance.
    pub selector: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    /// Unix seconds when this instance was created.
    pub created_at: u64,
}

impl RolloutInstance {
    /// Build the composite key for the instances table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// String identifier used in logs: `{namespace}/{name}`.
    pub fn label(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    fn annotation(&self, key: &str) -> &str {
        self.annotations.get(key).map(String::as_str).unwrap_or("")
    }

    /// Name of the owning definition, if the ownership annotation is set.
    pub fn owner(&self) -> Option<&str> {
        self.annotations.get(keys::DEFINITION).map(String::as_str)
    }

    /// Rollout version from the version annotation; -1 when missing or
    /// unparsable.
    pub fn version(&self) -> i64 {
        self.annotation(keys::VERSION).parse().unwrap_or(-1)
    }

    /// Current phase from the phase annotation, if set and valid.
    pub fn phase(&self) -> Option<RolloutPhase> {
        self.annotation(keys::PHASE).parse().ok()
    }

    /// Human reason for the current phase, if any.
    pub fn phase_reason(&self) -> &str {
        self.annotation(keys::PHASE_REASON)
    }

    /// Target replica count for this rollout.
    pub fn desired_replicas(&self) -> u32 {
        self.annotation(keys::DESIRED_REPLICAS).parse().unwrap_or(0)
    }

    /// Replica count last reported by the reconciler.
    pub fn current_replicas(&self) -> u32 {
        self.annotation(keys::CURRENT_REPLICAS).parse().unwrap_or(0)
    }

    /// Whether an operator cancelled this rollout.
    pub fn is_cancelled(&self) -> bool {
        self.annotation(keys::CANCELLED) == "true"
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == Some(RolloutPhase::Complete)
    }

    pub fn is_failed(&self) -> bool {
        self.phase() == Some(RolloutPhase::Failed)
    }

    /// Whether this instance reached a terminal phase.
    pub fn is_terminal(&self) -> bool {
        self.phase().is_some_and(RolloutPhase::is_terminal)
    }
}

/// Deterministic instance name for the version-th rollout of a definition.
pub fn instance_name(definition_name: &str, version: i64) -> String {
    format!("{definition_name}-{version}")
}

/// Name of the helper pod that drives the named instance's rollout.
pub fn deployer_pod_name(instance_name: &str) -> String {
    format!("{instance_name}-{DEPLOYER_POD_SUFFIX}")
}

/// Materialize the rollout instance for a definition's current
/// `latest_version`, embedding the encoded snapshot. The instance starts
/// in phase New with zero current replicas.
pub fn make_instance(
    definition: &WorkloadDefinition,
    codec: &dyn DefinitionCodec,
) -> ModelResult<RolloutInstance> {
    let encoded = codec.encode(definition)?;
    let name = instance_name(&definition.name, definition.status.latest_version);

    // Pods created for this instance must be attributable to both the
    // definition and this specific rollout.
    let mut selector = definition.spec.selector.clone();
    selector.insert(keys::DEFINITION.to_string(), definition.name.clone());
    selector.insert(keys::INSTANCE.to_string(), name.clone());

    let mut annotations = HashMap::from([
        (keys::DEFINITION.to_string(), definition.name.clone()),
        (keys::INSTANCE.to_string(), name.clone()),
        (
            keys::VERSION.to_string(),
            definition.status.latest_version.to_string(),
        ),
        (keys::PHASE.to_string(), RolloutPhase::New.to_string()),
        (
            keys::ENCODED_DEFINITION.to_string(),
            encoded,
        ),
        (
            keys::DESIRED_REPLICAS.to_string(),
            definition.spec.replicas.to_string(),
        ),
        (keys::CURRENT_REPLICAS.to_string(), "0".to_string()),
    ]);
    if let Some(details) = &definition.status.details {
        if !details.message.is_empty() {
            annotations.insert(keys::PHASE_REASON.to_string(), details.message.clone());
        }
    }

    Ok(RolloutInstance {
        name,
        namespace: definition.namespace.clone(),
        selector,
        annotations,
        created_at: now_unix(),
    })
}

/// Decode the definition snapshot embedded in an instance.
pub fn decode_definition(
    instance: &RolloutInstance,
    codec: &dyn DefinitionCodec,
) -> ModelResult<WorkloadDefinition> {
    let raw = instance
        .annotations
        .get(keys::ENCODED_DEFINITION)
        .ok_or_else(|| ModelError::MissingSnapshot(instance.name.clone()))?;
    codec.decode(raw)
}

/// Sort instances by embedded version, most recent first. Ties are not
/// expected (version is unique per definition).
pub fn sort_by_version_desc(instances: &mut [RolloutInstance]) {
    instances.sort_by_key(|i| Reverse(i.version()));
}

/// Whether the most recent instance matches the definition's
/// `latest_version`, and which instance that is. The latest instance is
/// not always the active one.
pub fn latest_instance_info<'a>(
    definition: &WorkloadDefinition,
    instances: &'a mut [RolloutInstance],
) -> (bool, Option<&'a RolloutInstance>) {
    if definition.status.latest_version == 0 || instances.is_empty() {
        return (false, None);
    }
    sort_by_version_desc(instances);
    let candidate = &instances[0];
    (
        candidate.version() == definition.status.latest_version,
        Some(candidate),
    )
}

/// The most recent Complete instance, if any. The active instance is not
/// always the latest one.
pub fn active_instance<'a>(instances: &'a [RolloutInstance]) -> Option<&'a RolloutInstance> {
    instances
        .iter()
        .filter(|i| i.is_complete())
        .max_by_key(|i| i.version())
}

/// Instances relevant for the revision-history quota of a definition:
/// everything older than the active instance, or — when no rollout ever
/// completed — everything except the latest version.
pub fn instances_for_cleanup<'a>(
    definition: &WorkloadDefinition,
    instances: &'a [RolloutInstance],
) -> Vec<&'a RolloutInstance> {
    let mut relevant: Vec<&RolloutInstance> = match active_instance(instances) {
        None => instances
            .iter()
            .filter(|i| i.version() != definition.status.latest_version)
            .collect(),
        Some(active) => instances
            .iter()
            .filter(|i| i.version() < active.version())
            .collect(),
    };
    // Oldest first: pruning starts at the oldest until back under quota.
    relevant.sort_by_key(|i| i.version());
    relevant
}

/// Sum of desired replicas across instances.
pub fn total_desired_replicas(instances: &[RolloutInstance]) -> u32 {
    instances.iter().map(RolloutInstance::desired_replicas).sum()
}

/// Sum of reconciler-reported replicas across instances.
pub fn total_current_replicas(instances: &[RolloutInstance]) -> u32 {
    instances.iter().map(RolloutInstance::current_replicas).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::fixtures::{ok_definition, ok_instance};

    #[test]
    fn instance_name_is_deterministic() {
        assert_eq!(instance_name("frontend", 4), "frontend-4");
        assert_eq!(deployer_pod_name("frontend-4"), "frontend-4-deploy");
    }

    #[test]
    fn make_instance_stamps_annotations() {
        let def = ok_definition(3);
        let instance = make_instance(&def, &JsonCodec).unwrap();

        assert_eq!(instance.name, "frontend-3");
        assert_eq!(instance.namespace, def.namespace);
        assert_eq!(instance.owner(), Some("frontend"));
        assert_eq!(instance.version(), 3);
        assert_eq!(instance.phase(), Some(RolloutPhase::New));
        assert_eq!(instance.desired_replicas(), def.spec.replicas);
        assert_eq!(instance.current_replicas(), 0);
        assert_eq!(
            instance.selector.get(keys::INSTANCE).map(String::as_str),
            Some("frontend-3")
        );
    }

    #[test]
    fn snapshot_roundtrips_through_annotations() {
        let def = ok_definition(2);
        let instance = make_instance(&def, &JsonCodec).unwrap();
        let decoded = decode_definition(&instance, &JsonCodec).unwrap();
        assert_eq!(decoded, def);
    }

    #[test]
    fn decode_requires_snapshot_annotation() {
        let def = ok_definition(1);
        let mut instance = make_instance(&def, &JsonCodec).unwrap();
        instance.annotations.remove(keys::ENCODED_DEFINITION);
        assert!(matches!(
            decode_definition(&instance, &JsonCodec),
            Err(ModelError::MissingSnapshot(_))
        ));
    }

    #[test]
    fn version_defaults_to_negative_one() {
        let def = ok_definition(1);
        let mut instance = make_instance(&def, &JsonCodec).unwrap();
        instance
            .annotations
            .insert(keys::VERSION.to_string(), "not-a-number".to_string());
        assert_eq!(instance.version(), -1);
        instance.annotations.remove(keys::VERSION);
        assert_eq!(instance.version(), -1);
    }

    #[test]
    fn sort_orders_most_recent_first() {
        let def = ok_definition(1);
        let mut instances = vec![
            ok_instance(&def, 1, RolloutPhase::Complete),
            ok_instance(&def, 3, RolloutPhase::Running),
            ok_instance(&def, 2, RolloutPhase::Failed),
        ];
        sort_by_version_desc(&mut instances);
        let versions: Vec<i64> = instances.iter().map(RolloutInstance::version).collect();
        assert_eq!(versions, vec![3, 2, 1]);
    }

    #[test]
    fn latest_instance_detects_version_match() {
        let mut def = ok_definition(3);
        let mut instances = vec![
            ok_instance(&def, 1, RolloutPhase::Complete),
            ok_instance(&def, 3, RolloutPhase::Running),
        ];
        let (is_latest, candidate) = latest_instance_info(&def, &mut instances);
        assert!(is_latest);
        assert_eq!(candidate.unwrap().version(), 3);

        def.status.latest_version = 4;
        let (is_latest, _) = latest_instance_info(&def, &mut instances);
        assert!(!is_latest);

        def.status.latest_version = 0;
        let (is_latest, candidate) = latest_instance_info(&def, &mut instances);
        assert!(!is_latest);
        assert!(candidate.is_none());
    }

    #[test]
    fn active_instance_is_latest_complete() {
        let def = ok_definition(4);
        let instances = vec![
            ok_instance(&def, 1, RolloutPhase::Complete),
            ok_instance(&def, 2, RolloutPhase::Complete),
            ok_instance(&def, 3, RolloutPhase::Failed),
            ok_instance(&def, 4, RolloutPhase::Running),
        ];
        assert_eq!(active_instance(&instances).unwrap().version(), 2);
        assert!(active_instance(&instances[2..]).is_none());
    }

    #[test]
    fn cleanup_excludes_active_and_newer() {
        let def = ok_definition(4);
        let instances = vec![
            ok_instance(&def, 1, RolloutPhase::Complete),
            ok_instance(&def, 2, RolloutPhase::Failed),
            ok_instance(&def, 3, RolloutPhase::Complete),
            ok_instance(&def, 4, RolloutPhase::Running),
        ];
        // Active is version 3; only 1 and 2 are cleanup-relevant, oldest first.
        let relevant = instances_for_cleanup(&def, &instances);
        let versions: Vec<i64> = relevant.iter().map(|i| i.version()).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn cleanup_without_active_keeps_only_latest() {
        let def = ok_definition(3);
        let instances = vec![
            ok_instance(&def, 1, RolloutPhase::Failed),
            ok_instance(&def, 2, RolloutPhase::Failed),
            ok_instance(&def, 3, RolloutPhase::Running),
        ];
        let relevant = instances_for_cleanup(&def, &instances);
        let versions: Vec<i64> = relevant.iter().map(|i| i.version()).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn replica_totals_from_annotations() {
        let def = ok_definition(2);
        let mut a = ok_instance(&def, 1, RolloutPhase::Complete);
        a.annotations
            .insert(keys::CURRENT_REPLICAS.to_string(), "2".to_string());
        let b = ok_instance(&def, 2, RolloutPhase::Running);
        let instances = vec![a, b];
        assert_eq!(total_desired_replicas(&instances), 2 * def.spec.replicas);
        assert_eq!(total_current_replicas(&instances), 2);
    }
}
