//! REST API handlers for definitions, instances, and image streams.
//!
//! Each handler reads/writes via `StateStore` and returns JSON responses.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use gantry_model::WorkloadDefinition;
use gantry_rollout::{Admission, RolloutError, TriggerAdmission};
use gantry_state::StateError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// HTTP status for an orchestration error.
pub(crate) fn status_for(err: &RolloutError) -> StatusCode {
    match err {
        RolloutError::DefinitionNotFound(_) | RolloutError::InstanceNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        RolloutError::Conflict(_) => StatusCode::CONFLICT,
        err if err.is_client_error() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ── Definitions ────────────────────────────────────────────────

/// GET /api/v1/namespaces/:ns/definitions
pub async fn list_definitions(
    State(state): State<ApiState>,
    Path(namespace): Path<String>,
) -> impl IntoResponse {
    match state.store.list_definitions(&namespace) {
        Ok(definitions) => ApiResponse::ok(definitions).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/namespaces/:ns/definitions/:name
pub async fn get_definition(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_definition(&namespace, &name) {
        Ok(Some((definition, _))) => ApiResponse::ok(definition).into_response(),
        Ok(None) => error_response("definition not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/namespaces/:ns/definitions
pub async fn create_definition(
    State(state): State<ApiState>,
    Path(namespace): Path<String>,
    Json(mut definition): Json<WorkloadDefinition>,
) -> impl IntoResponse {
    definition.namespace = namespace;

    let admission = TriggerAdmission;
    if let Err(e) = admission
        .mutate(&mut definition)
        .and_then(|()| admission.validate(&definition))
    {
        return error_response(&e.to_string(), status_for(&e)).into_response();
    }

    match state.store.create_definition(&definition) {
        Ok(_) => (StatusCode::CREATED, ApiResponse::ok(definition)).into_response(),
        Err(StateError::Conflict(key)) => {
            error_response(&format!("definition {key} already exists"), StatusCode::CONFLICT)
                .into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// DELETE /api/v1/namespaces/:ns/definitions/:name
pub async fn delete_definition(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.delete_definition(&namespace, &name) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("definition not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Instances ──────────────────────────────────────────────────

/// GET /api/v1/namespaces/:ns/definitions/:name/instances
pub async fn list_instances(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.list_instances(&namespace, Some(&name)) {
        Ok(mut instances) => {
            gantry_model::sort_by_version_desc(&mut instances);
            ApiResponse::ok(instances).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Image streams ──────────────────────────────────────────────

/// Request body for a stream tag update.
#[derive(serde::Deserialize)]
pub struct PutTagRequest {
    pub reference: String,
}

/// PUT /api/v1/namespaces/:ns/imagestreams/:name/tags/:tag
///
/// Points the tag at a new image reference. Definitions watching the
/// tag pick it up on their next instantiate with `latest`.
pub async fn put_stream_tag(
    State(state): State<ApiState>,
    Path((namespace, name, tag)): Path<(String, String, String)>,
    Json(req): Json<PutTagRequest>,
) -> impl IntoResponse {
    state.images.put_tag(&namespace, &name, &tag, &req.reference);
    ApiResponse::ok(format!("{namespace}/{name}:{tag}")).into_response()
}
