//! Sync cycle status and manual trigger

use axum::{extract::State, Json};

use crate::error::{ApiError, ApiResult};
use crate::sync::SyncCycleResult;
use crate::AppState;

/// GET /api/v1/sync/status
///
/// Result of the last completed cycle, 404 before the first one.
pub async fn sync_status(State(state): State<AppState>) -> ApiResult<Json<SyncCycleResult>> {
    state
        .runner
        .last_result()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no sync cycle has completed yet".to_string()))
}

/// POST /api/v1/sync/run
///
/// Runs one cycle now and returns its result. 409 if a cycle is running.
/// The cycle finishes even if the client disconnects first.
pub async fn run_sync(State(state): State<AppState>) -> ApiResult<Json<SyncCycleResult>> {
    let result = state.runner.try_run_cycle().await?;
    Ok(Json(result))
}
