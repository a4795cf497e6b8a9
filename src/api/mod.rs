//! HTTP API module - REST endpoints over the generation pipeline

mod benchmark;
mod metadata;
mod prompt;
mod queue;

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::queue::{GenerationQueue, SharedContext};
use crate::store::{EntityCache, RemoteStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<GenerationQueue>,
    pub cache: Arc<EntityCache>,
    pub store: Arc<dyn RemoteStore>,
    pub context: SharedContext,
    /// Prefix used for entity tags in prompts and tag import
    pub entity_tag: String,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
        .merge(prompt::router())
        .merge(metadata::router())
        .merge(queue::router())
        .merge(benchmark::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error response
#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
}

pub(crate) fn error_response(
    status: StatusCode,
    error: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Root endpoint
async fn root() -> impl IntoResponse {
    Json(RootResponse {
        name: "promptd",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let api_key = if state.context.read().api_key.is_empty() {
        "missing"
    } else {
        "ok"
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            api_key,
            entities: state.cache.len(),
        }),
    )
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    api_key: &'static str,
    entities: usize,
}
