//! REST API handlers for rollout orchestration.
//!
//! Instantiate, rollback, and prune. The instantiate handler also
//! materializes the rollout instance for a committed version, so the
//! next decision can read the embedded snapshot back.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use gantry_model::{
    JsonCodec, RolloutPhase, TriggerType, deployer_pod_name, make_instance,
};
use gantry_prune::{RetentionPolicy, resolve_prunable};
use gantry_rollout::{InstantiateOptions, InstantiateOutcome};

use crate::ApiState;
use crate::handlers::{ApiResponse, error_response, status_for};

/// Request body for an instantiate.
#[derive(serde::Deserialize)]
pub struct InstantiateRequest {
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub latest: bool,
    #[serde(default)]
    pub exclude: Vec<TriggerType>,
}

/// POST /api/v1/namespaces/:ns/definitions/:name/instantiate
pub async fn instantiate(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(req): Json<InstantiateRequest>,
) -> impl IntoResponse {
    let options = InstantiateOptions {
        force: req.force,
        latest: req.latest,
        excluded: req.exclude,
    };
    let mut result = state.instantiator.instantiate(&namespace, &name, &options);
    if matches!(result, Err(gantry_rollout::RolloutError::IllegalState(_))) {
        // The commit and the instance write below are two store
        // operations; a crash between them leaves a committed version
        // with no instance. Rebuild that instance from the stored
        // definition, as the reconciliation loop would, then decide
        // again.
        if let Err(resp) = materialize_missing_latest(&state, &namespace, &name) {
            return resp;
        }
        result = state.instantiator.instantiate(&namespace, &name, &options);
    }
    match result {
        Ok(InstantiateOutcome::Updated(definition)) => {
            let instance = match make_instance(&definition, &JsonCodec) {
                Ok(instance) => instance,
                Err(e) => {
                    return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                        .into_response();
                }
            };
            if let Err(e) = state.store.put_instance(&instance) {
                return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                    .into_response();
            }
            ApiResponse::ok(definition).into_response()
        }
        Ok(InstantiateOutcome::Unchanged) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e.to_string(), status_for(&e)).into_response(),
    }
}

/// Recreate the rollout instance for the definition's current
/// `latest_version` from the stored definition.
fn materialize_missing_latest(
    state: &ApiState,
    namespace: &str,
    name: &str,
) -> Result<(), axum::response::Response> {
    let definition = match state.store.get_definition(namespace, name) {
        Ok(Some((definition, _))) => definition,
        // A concurrent delete; the retried instantiate reports it.
        Ok(None) => return Ok(()),
        Err(e) => {
            return Err(
                error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
            );
        }
    };
    let instance = match make_instance(&definition, &JsonCodec) {
        Ok(instance) => instance,
        Err(e) => {
            return Err(
                error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
            );
        }
    };
    if let Err(e) = state.store.put_instance(&instance) {
        return Err(
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
        );
    }
    info!(
        namespace,
        definition = name,
        instance = %instance.name,
        "materialized missing instance for committed version"
    );
    Ok(())
}

fn default_true() -> bool {
    true
}

/// Request body for a rollback.
#[derive(serde::Deserialize)]
pub struct RollbackRequest {
    /// Target revision; 0 (the default) means "the previous rollout".
    #[serde(default)]
    pub revision: i64,
    #[serde(default)]
    pub updated_annotations: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub include_template: bool,
    #[serde(default)]
    pub include_triggers: bool,
    #[serde(default)]
    pub include_replication_meta: bool,
    #[serde(default)]
    pub include_strategy: bool,
}

/// POST /api/v1/namespaces/:ns/definitions/:name/rollback
///
/// Returns a candidate definition; the caller reviews and commits it
/// through the regular update path.
pub async fn rollback(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(req): Json<RollbackRequest>,
) -> impl IntoResponse {
    let spec = gantry_rollout::RollbackSpec {
        revision: req.revision,
        include_template: req.include_template,
        include_triggers: req.include_triggers,
        include_replication_meta: req.include_replication_meta,
        include_strategy: req.include_strategy,
    };
    match state
        .rollback
        .generate(&namespace, &name, &spec, &req.updated_annotations)
    {
        Ok(candidate) => ApiResponse::ok(candidate).into_response(),
        Err(e) => error_response(&e.to_string(), status_for(&e)).into_response(),
    }
}

/// Request body for a prune run.
#[derive(serde::Deserialize)]
pub struct PruneRequest {
    #[serde(default = "PruneRequest::default_keep_younger_than")]
    pub keep_younger_than_seconds: u64,
    #[serde(default)]
    pub orphans: bool,
    #[serde(default = "PruneRequest::default_keep_complete")]
    pub keep_complete: i32,
    #[serde(default = "PruneRequest::default_keep_failed")]
    pub keep_failed: i32,
    /// When false (the default) this is a dry run: candidates are
    /// reported but nothing is deleted.
    #[serde(default)]
    pub delete: bool,
}

impl PruneRequest {
    fn default_keep_younger_than() -> u64 {
        RetentionPolicy::default().keep_younger_than_seconds
    }
    fn default_keep_complete() -> i32 {
        RetentionPolicy::default().keep_complete
    }
    fn default_keep_failed() -> i32 {
        RetentionPolicy::default().keep_failed
    }
}

/// One prunable instance in a prune report.
#[derive(serde::Serialize)]
pub struct PruneCandidate {
    pub name: String,
    pub namespace: String,
    pub version: i64,
    pub phase: Option<RolloutPhase>,
    /// Helper pod to cascade-delete for failed rollouts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployer_pod: Option<String>,
}

/// Result of a prune run.
#[derive(serde::Serialize)]
pub struct PruneReport {
    pub candidates: Vec<PruneCandidate>,
    pub deleted: u32,
}

/// POST /api/v1/namespaces/:ns/prune
pub async fn prune(
    State(state): State<ApiState>,
    Path(namespace): Path<String>,
    Json(req): Json<PruneRequest>,
) -> impl IntoResponse {
    let policy = RetentionPolicy {
        keep_younger_than_seconds: req.keep_younger_than_seconds,
        orphans: req.orphans,
        keep_complete: req.keep_complete,
        keep_failed: req.keep_failed,
    };

    let definitions = match state.store.list_definitions(&namespace) {
        Ok(definitions) => definitions,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };
    let instances = match state.store.list_instances(&namespace, None) {
        Ok(instances) => instances,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };

    let mut resolved = resolve_prunable(&definitions, instances, &policy);
    // The union resolver may select an instance twice; deletion is
    // idempotent but the report should not repeat itself.
    resolved.sort_by(|a, b| a.name.cmp(&b.name));
    resolved.dedup_by(|a, b| a.name == b.name);

    let mut deleted = 0;
    let mut candidates = Vec::with_capacity(resolved.len());
    for instance in resolved {
        if req.delete {
            match state.store.delete_instance(&instance.namespace, &instance.name) {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                        .into_response();
                }
            }
        }
        candidates.push(PruneCandidate {
            deployer_pod: instance
                .is_failed()
                .then(|| deployer_pod_name(&instance.name)),
            version: instance.version(),
            phase: instance.phase(),
            name: instance.name,
            namespace: instance.namespace,
        });
    }

    info!(
        %namespace,
        candidates = candidates.len(),
        deleted,
        dry_run = !req.delete,
        "prune run finished"
    );
    ApiResponse::ok(PruneReport { candidates, deleted }).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{PutTagRequest, put_stream_tag};
    use gantry_model::fixtures::{IMAGE_REFERENCE, STREAM_NAME, STREAM_TAG, ok_definition, ok_instance};
    use gantry_model::instance::keys;
    use gantry_state::StateStore;

    const NEW_REFERENCE: &str =
        "registry.local/prod/app@sha256:0000000000000000000000000000000000000000000000000000000000000002";

    fn test_state() -> ApiState {
        ApiState::new(StateStore::open_in_memory().unwrap())
    }

    fn instantiate_request() -> InstantiateRequest {
        InstantiateRequest {
            force: false,
            latest: false,
            exclude: Vec::new(),
        }
    }

    fn path(name: &str) -> Path<(String, String)> {
        Path(("prod".to_string(), name.to_string()))
    }

    #[tokio::test]
    async fn initial_instantiate_commits_version_one() {
        let state = test_state();
        state.store.create_definition(&ok_definition(0)).unwrap();

        let resp = instantiate(State(state.clone()), path("frontend"), Json(instantiate_request()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let (def, _) = state.store.get_definition("prod", "frontend").unwrap().unwrap();
        assert_eq!(def.status.latest_version, 1);
        // The rollout instance was materialized alongside the commit.
        let instance = state.store.get_instance("prod", "frontend-1").unwrap().unwrap();
        assert_eq!(instance.version(), 1);
        assert_eq!(instance.phase(), Some(RolloutPhase::New));
    }

    #[tokio::test]
    async fn settled_definition_returns_no_content() {
        let state = test_state();
        let def = ok_definition(1);
        state.store.create_definition(&def).unwrap();
        state
            .store
            .put_instance(&ok_instance(&def, 1, RolloutPhase::Complete))
            .unwrap();

        let resp = instantiate(State(state), path("frontend"), Json(instantiate_request()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn committed_version_without_instance_is_healed() {
        let state = test_state();
        // A crash after commit but before the instance write: version 1
        // is recorded, no instance exists.
        state.store.create_definition(&ok_definition(1)).unwrap();

        let resp = instantiate(State(state.clone()), path("frontend"), Json(instantiate_request()))
            .await
            .into_response();
        // The instance is rebuilt from the stored definition, and the
        // retried decision finds nothing new to roll out.
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let instance = state.store.get_instance("prod", "frontend-1").unwrap().unwrap();
        assert_eq!(instance.version(), 1);
        assert_eq!(
            state.store.get_definition("prod", "frontend").unwrap().unwrap().0.status.latest_version,
            1
        );
    }

    #[tokio::test]
    async fn instantiate_missing_definition_is_not_found() {
        let resp = instantiate(State(test_state()), path("nope"), Json(instantiate_request()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn paused_definition_is_unprocessable() {
        let state = test_state();
        let mut def = ok_definition(0);
        def.spec.paused = true;
        state.store.create_definition(&def).unwrap();

        let resp = instantiate(State(state), path("frontend"), Json(instantiate_request()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn moved_stream_tag_drives_a_new_version() {
        let state = test_state();
        let def = ok_definition(1);
        state.store.create_definition(&def).unwrap();
        state
            .store
            .put_instance(&ok_instance(&def, 1, RolloutPhase::Complete))
            .unwrap();
        state.images.put_tag("prod", STREAM_NAME, STREAM_TAG, NEW_REFERENCE);

        let req = InstantiateRequest {
            latest: true,
            ..instantiate_request()
        };
        let resp = instantiate(State(state.clone()), path("frontend"), Json(req))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let (def, _) = state.store.get_definition("prod", "frontend").unwrap().unwrap();
        assert_eq!(def.status.latest_version, 2);
        assert_eq!(def.spec.template.containers[0].image, NEW_REFERENCE);
    }

    #[tokio::test]
    async fn rollback_returns_a_candidate_without_committing() {
        let state = test_state();
        let def = ok_definition(2);
        state.store.create_definition(&def).unwrap();
        for v in 1..=2 {
            state
                .store
                .put_instance(&ok_instance(&def, v, RolloutPhase::Complete))
                .unwrap();
        }

        let req = RollbackRequest {
            revision: 0,
            updated_annotations: HashMap::new(),
            include_template: true,
            include_triggers: false,
            include_replication_meta: false,
            include_strategy: false,
        };
        let resp = rollback(State(state.clone()), path("frontend"), Json(req))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        // The stored definition is untouched; the candidate is advisory.
        let (stored, _) = state.store.get_definition("prod", "frontend").unwrap().unwrap();
        assert_eq!(stored.status.latest_version, 2);
    }

    #[tokio::test]
    async fn rollback_of_undeployed_definition_is_unprocessable() {
        let state = test_state();
        state.store.create_definition(&ok_definition(0)).unwrap();

        let req = RollbackRequest {
            revision: 0,
            updated_annotations: HashMap::new(),
            include_template: true,
            include_triggers: false,
            include_replication_meta: false,
            include_strategy: false,
        };
        let resp = rollback(State(state), path("frontend"), Json(req))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    /// An old, fully scaled-down instance eligible for pruning.
    fn retired(def: &gantry_model::WorkloadDefinition, version: i64, phase: RolloutPhase) -> gantry_model::RolloutInstance {
        let mut instance = ok_instance(def, version, phase);
        instance
            .annotations
            .insert(keys::DESIRED_REPLICAS.to_string(), "0".to_string());
        instance.created_at = 0;
        instance
    }

    #[tokio::test]
    async fn prune_dry_run_reports_without_deleting() {
        let state = test_state();
        let def = ok_definition(3);
        state.store.create_definition(&def).unwrap();
        for v in 1..=3 {
            state
                .store
                .put_instance(&retired(&def, v, RolloutPhase::Complete))
                .unwrap();
        }

        let req = PruneRequest {
            keep_younger_than_seconds: 60,
            orphans: false,
            keep_complete: 1,
            keep_failed: 0,
            delete: false,
        };
        let resp = prune(State(state.clone()), Path("prod".to_string()), Json(req))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        // Nothing was deleted.
        assert_eq!(state.store.list_instances("prod", None).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn prune_deletes_beyond_the_keep_count() {
        let state = test_state();
        let def = ok_definition(3);
        state.store.create_definition(&def).unwrap();
        for v in 1..=3 {
            state
                .store
                .put_instance(&retired(&def, v, RolloutPhase::Complete))
                .unwrap();
        }

        let req = PruneRequest {
            keep_younger_than_seconds: 60,
            orphans: false,
            keep_complete: 1,
            keep_failed: 0,
            delete: true,
        };
        let resp = prune(State(state.clone()), Path("prod".to_string()), Json(req))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let remaining = state.store.list_instances("prod", None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].version(), 3);
    }

    #[tokio::test]
    async fn prune_reaps_orphans_only_when_asked() {
        let state = test_state();
        let mut gone = ok_definition(1);
        gone.name = "deleted-app".to_string();
        // The definition itself is never stored; only its instance remains.
        state
            .store
            .put_instance(&retired(&gone, 1, RolloutPhase::Failed))
            .unwrap();

        let mut req = PruneRequest {
            keep_younger_than_seconds: 60,
            orphans: false,
            keep_complete: 5,
            keep_failed: 1,
            delete: true,
        };
        let resp = prune(State(state.clone()), Path("prod".to_string()), Json(req))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.store.list_instances("prod", None).unwrap().len(), 1);

        req = PruneRequest {
            keep_younger_than_seconds: 60,
            orphans: true,
            keep_complete: 5,
            keep_failed: 1,
            delete: true,
        };
        let resp = prune(State(state), Path("prod".to_string()), Json(req))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stream_tag_update_is_visible_to_the_lookup() {
        use gantry_trigger::ImageStreamLookup;

        let state = test_state();
        let resp = put_stream_tag(
            State(state.clone()),
            Path(("prod".to_string(), STREAM_NAME.to_string(), STREAM_TAG.to_string())),
            Json(PutTagRequest {
                reference: IMAGE_REFERENCE.to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let stream = state.images.get_stream("prod", STREAM_NAME).unwrap().unwrap();
        assert_eq!(stream.resolve_tag(STREAM_TAG), Some(IMAGE_REFERENCE));
    }
}
