//! gantry-api — REST API for Gantry.
//!
//! Provides axum route handlers for workload definitions, rollout
//! instantiation, rollback, and pruning.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/namespaces/:ns/definitions` | List definitions |
//! | POST | `/api/v1/namespaces/:ns/definitions` | Create a definition |
//! | GET | `/api/v1/namespaces/:ns/definitions/:name` | Get a definition |
//! | DELETE | `/api/v1/namespaces/:ns/definitions/:name` | Delete a definition |
//! | GET | `/api/v1/namespaces/:ns/definitions/:name/instances` | List rollout instances |
//! | POST | `/api/v1/namespaces/:ns/definitions/:name/instantiate` | Request a rollout |
//! | POST | `/api/v1/namespaces/:ns/definitions/:name/rollback` | Generate a rollback candidate |
//! | POST | `/api/v1/namespaces/:ns/prune` | Resolve (and optionally delete) prunable instances |
//! | PUT | `/api/v1/namespaces/:ns/imagestreams/:name/tags/:tag` | Point a stream tag at an image |

pub mod handlers;
pub mod rollout_handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};

use gantry_model::JsonCodec;
use gantry_rollout::{Instantiator, RollbackGenerator, TriggerAdmission};
use gantry_state::StateStore;
use gantry_trigger::StaticImageStreams;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub images: Arc<StaticImageStreams>,
    pub instantiator: Arc<Instantiator>,
    pub rollback: Arc<RollbackGenerator>,
}

impl ApiState {
    /// Wire the orchestrator collaborators around a store.
    pub fn new(store: StateStore) -> Self {
        Self::with_max_attempts(store, gantry_rollout::DEFAULT_MAX_ATTEMPTS)
    }

    /// Same, with an explicit conflict retry budget.
    pub fn with_max_attempts(store: StateStore, max_attempts: u32) -> Self {
        let images = Arc::new(StaticImageStreams::new());
        let definitions = Arc::new(store.clone());
        let instances = Arc::new(store.clone());
        let codec = Arc::new(JsonCodec);
        let instantiator = Arc::new(
            Instantiator::new(
                definitions.clone(),
                instances.clone(),
                images.clone(),
                Arc::new(TriggerAdmission),
                codec.clone(),
            )
            .with_max_attempts(max_attempts),
        );
        let rollback = Arc::new(RollbackGenerator::new(definitions, instances, codec));
        Self {
            store,
            images,
            instantiator,
            rollback,
        }
    }
}

/// Build the complete API router with default wiring.
pub fn build_router(store: StateStore) -> Router {
    build_router_with_state(ApiState::new(store))
}

/// Build the complete API router around pre-wired state.
pub fn build_router_with_state(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/namespaces/{namespace}/definitions",
            get(handlers::list_definitions).post(handlers::create_definition),
        )
        .route(
            "/namespaces/{namespace}/definitions/{name}",
            get(handlers::get_definition).delete(handlers::delete_definition),
        )
        .route(
            "/namespaces/{namespace}/definitions/{name}/instances",
            get(handlers::list_instances),
        )
        .route(
            "/namespaces/{namespace}/definitions/{name}/instantiate",
            post(rollout_handlers::instantiate),
        )
        .route(
            "/namespaces/{namespace}/definitions/{name}/rollback",
            post(rollout_handlers::rollback),
        )
        .route(
            "/namespaces/{namespace}/prune",
            post(rollout_handlers::prune),
        )
        .route(
            "/namespaces/{namespace}/imagestreams/{name}/tags/{tag}",
            put(handlers::put_stream_tag),
        )
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
