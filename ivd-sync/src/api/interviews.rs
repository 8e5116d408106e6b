//! Read access to persisted interviews
//!
//! Only committed rows are visible; in-flight cycles never show here.

use axum::{extract::State, Json};
use ivd_common::SubmissionRecord;
use serde::Serialize;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

/// GET /api/v1/interviews
pub async fn list_interviews(State(state): State<AppState>) -> ApiResult<Json<Vec<SubmissionRecord>>> {
    let records = state.store.all().await?;
    Ok(Json(records))
}

/// GET /api/v1/interviews/count
pub async fn count_interviews(State(state): State<AppState>) -> ApiResult<Json<CountResponse>> {
    let count = state.store.count().await?;
    Ok(Json(CountResponse { count }))
}
