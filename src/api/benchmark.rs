//! Benchmark configuration and entity endpoints

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};

use super::{error_response, AppState};
use crate::benchmark::BenchmarkConfig;

/// Build the benchmark router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/benchmark", get(get_benchmark).put(put_benchmark))
        .route("/entities", get(list_entities))
        .route("/entities/refresh", post(refresh_entities))
}

/// GET /benchmark
async fn get_benchmark(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.context.read().benchmark.clone())
}

/// PUT /benchmark
/// Replaces the benchmark used by subsequent tasks and persists it
async fn put_benchmark(
    State(state): State<AppState>,
    Json(config): Json<BenchmarkConfig>,
) -> axum::response::Response {
    let removed = {
        let mut ctx = state.context.write();
        let removed = ctx.benchmark.slots.len().saturating_sub(config.slots.len());
        ctx.benchmark = config.clone();
        removed
    };
    if removed > 0 {
        // Results are positional; a shorter slot list orphans trailing images
        warn!("Benchmark shrank by {} slots", removed);
    }

    if let Err(e) = state.store.save_benchmark_config(&config).await {
        return error_response(
            StatusCode::BAD_GATEWAY,
            format!("Benchmark applied but not saved: {}", e),
        );
    }

    info!("Benchmark updated ({} slots)", config.slots.len());
    Json(config).into_response()
}

/// GET /entities
async fn list_entities(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.cache.list())
}

/// POST /entities/refresh
async fn refresh_entities(State(state): State<AppState>) -> axum::response::Response {
    match state.cache.refresh_from(state.store.as_ref()).await {
        Ok(_) => Json(state.cache.list()).into_response(),
        Err(e) => error_response(
            StatusCode::BAD_GATEWAY,
            format!("Failed to load entities: {}", e),
        ),
    }
}
