//! Pre-built fixtures shared by tests across the Gantry crates.
//!
//! Factory functions for a known-good definition and its instances,
//! with sensible defaults that individual tests can mutate.

use std::collections::HashMap;

use crate::codec::JsonCodec;
use crate::instance::{RolloutInstance, keys, make_instance};
use crate::phase::RolloutPhase;
use crate::types::{
    Container, DefinitionSpec, DefinitionStatus, ImageChangeParams, PodTemplate, Strategy,
    StreamTagRef, Trigger, WorkloadDefinition,
};

/// Image stream watched by the fixture definition's image trigger.
pub const STREAM_NAME: &str = "app";
/// Tag watched by the fixture definition's image trigger.
pub const STREAM_TAG: &str = "latest";
/// Image reference the fixture stream tag currently resolves to.
pub const IMAGE_REFERENCE: &str =
    "registry.local/prod/app@sha256:0000000000000000000000000000000000000000000000000000000000000001";

/// A known-good definition named `frontend` at the given rollout version,
/// with one automatic image-change trigger and one config-change trigger.
pub fn ok_definition(latest_version: i64) -> WorkloadDefinition {
    WorkloadDefinition {
        name: "frontend".to_string(),
        namespace: "prod".to_string(),
        generation: 1,
        annotations: HashMap::new(),
        spec: DefinitionSpec {
            replicas: 2,
            selector: HashMap::from([("app".to_string(), "frontend".to_string())]),
            template: PodTemplate {
                labels: HashMap::from([("app".to_string(), "frontend".to_string())]),
                containers: vec![
                    Container {
                        name: "web".to_string(),
                        image: IMAGE_REFERENCE.to_string(),
                        env: HashMap::new(),
                    },
                    Container {
                        name: "sidecar".to_string(),
                        image: "registry.local/prod/sidecar:v1".to_string(),
                        env: HashMap::new(),
                    },
                ],
                init_containers: vec![],
            },
            triggers: vec![
                Trigger::ImageChange(ImageChangeParams {
                    automatic: true,
                    container_names: vec!["web".to_string()],
                    from: StreamTagRef {
                        namespace: None,
                        name: format!("{STREAM_NAME}:{STREAM_TAG}"),
                    },
                    last_triggered_image: IMAGE_REFERENCE.to_string(),
                }),
                Trigger::ConfigChange,
            ],
            strategy: Strategy::default(),
            min_ready_seconds: 0,
            revision_history_limit: None,
            paused: false,
        },
        status: DefinitionStatus {
            latest_version,
            observed_generation: 1,
            ..DefinitionStatus::default()
        },
    }
}

/// A materialized instance of `definition` at the given version and phase.
/// The embedded snapshot records the definition as it was at that version.
pub fn ok_instance(
    definition: &WorkloadDefinition,
    version: i64,
    phase: RolloutPhase,
) -> RolloutInstance {
    let mut snapshot = definition.clone();
    snapshot.status.latest_version = version;
    let mut instance = make_instance(&snapshot, &JsonCodec)
        .expect("fixture definition must encode");
    instance
        .annotations
        .insert(keys::PHASE.to_string(), phase.to_string());
    instance
}
