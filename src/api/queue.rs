//! Queue control endpoints

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{error_response, AppState};
use crate::queue::{tasks_for, tasks_for_missing, GenTask, QueueStatus};

/// Build the queue router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/queue", get(snapshot))
        .route("/queue/enqueue", post(enqueue))
        .route("/queue/pause", post(pause))
        .route("/queue/resume", post(resume))
        .route("/queue/retry", post(retry))
}

/// Either explicit slots per entity, or every not-yet-generated slot
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnqueueRequest {
    entity_ids: Vec<String>,
    /// Slot indices; ignored when `missing_only` is set
    #[serde(default)]
    slots: Vec<usize>,
    #[serde(default)]
    missing_only: bool,
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    enqueued: usize,
    tasks: Vec<GenTask>,
}

#[derive(Debug, Serialize)]
struct ControlResponse {
    status: QueueStatus,
    pending: usize,
    failed: usize,
}

fn control_response(state: &AppState) -> Json<ControlResponse> {
    Json(ControlResponse {
        status: state.queue.status(),
        pending: state.queue.pending_count(),
        failed: state.queue.failed_count(),
    })
}

/// GET /queue
async fn snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.queue.snapshot())
}

/// POST /queue/enqueue
async fn enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> axum::response::Response {
    let tasks = if request.missing_only {
        let slot_count = state.context.read().benchmark.slots.len();
        let mut tasks = Vec::new();
        for id in &request.entity_ids {
            match state.cache.get(id) {
                Some(entity) => tasks.extend(tasks_for_missing(&entity, slot_count)),
                None => {
                    return error_response(
                        StatusCode::NOT_FOUND,
                        format!("Entity not found: {}", id),
                    )
                }
            }
        }
        tasks
    } else {
        if request.slots.is_empty() {
            return error_response(StatusCode::BAD_REQUEST, "No slots given");
        }
        tasks_for(&request.entity_ids, &request.slots)
    };

    let enqueued = state.queue.enqueue(tasks.clone());
    (StatusCode::ACCEPTED, Json(EnqueueResponse { enqueued, tasks })).into_response()
}

/// POST /queue/pause
async fn pause(State(state): State<AppState>) -> impl IntoResponse {
    state.queue.pause();
    control_response(&state)
}

/// POST /queue/resume
async fn resume(State(state): State<AppState>) -> impl IntoResponse {
    state.queue.resume();
    control_response(&state)
}

/// POST /queue/retry
async fn retry(State(state): State<AppState>) -> impl IntoResponse {
    state.queue.retry_failed();
    control_response(&state)
}
