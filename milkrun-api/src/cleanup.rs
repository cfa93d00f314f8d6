use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use milkrun_reconcile::{CycleReport, WorkerStatus};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/cleanup/run", post(run_cleanup))
        .route("/api/cleanup/status", get(cleanup_status))
}

/// POST /api/cleanup/run
/// Run one reconciliation cycle now; refused while a cycle is in flight
pub async fn run_cleanup(State(state): State<AppState>) -> Result<Json<CycleReport>, ApiError> {
    let report = state
        .worker
        .try_run_cycle()
        .await
        .map_err(|e| ApiError::ConflictError(e.to_string()))?;

    Ok(Json(report))
}

/// GET /api/cleanup/status
/// Whether a cycle is running and what the last one did
pub async fn cleanup_status(State(state): State<AppState>) -> Json<WorkerStatus> {
    Json(state.worker.status().await)
}
