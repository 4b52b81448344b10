//! Welcome-message dispatch routes.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};

use flock_common::error::AppError;
use flock_engine::lease::{RedisLease, run_with_lease};
use flock_engine::{EnqueueRequest, EnqueueSummary, RunSummary};

use crate::middleware::auth::{AuthUser, WorkerAuth};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/dispatch/welcome", post(enqueue_welcome))
        .route("/api/dispatch/worker/run", post(run_worker))
}

/// POST /api/dispatch/welcome. Queue welcome messages for contacts registered
/// in a date range.
async fn enqueue_welcome(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<EnqueueRequest>, JsonRejection>,
) -> Result<Json<EnqueueSummary>, AppError> {
    let Json(request) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    let summary = state.enqueuer.enqueue(&auth.scope, &request).await?;
    Ok(Json(summary))
}

/// POST /api/dispatch/worker/run. Process one batch of due jobs.
///
/// Called by a trusted scheduler, not an end-user session. Responds 409 while
/// another run holds the worker lease.
async fn run_worker(
    State(state): State<AppState>,
    _auth: WorkerAuth,
) -> Result<Json<RunSummary>, AppError> {
    let lease = RedisLease::new(state.redis.clone());
    let summary = run_with_lease(&state.worker, &lease, state.config.worker_lease_seconds)
        .await?
        .ok_or_else(|| AppError::Conflict("A worker run is already in progress".to_string()))?;

    Ok(Json(summary))
}
