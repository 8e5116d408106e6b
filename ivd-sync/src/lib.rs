//! ivd-sync library - Interview duration sync service
//!
//! Polls the form server for new submissions, derives each interview's
//! duration from its audit trail, stores the enriched records once, and
//! serves them over HTTP.

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod sync;
pub mod transport;

pub use crate::error::{ApiError, ApiResult};

use crate::db::InterviewStore;
use crate::sync::SyncRunner;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Persisted interviews
    pub store: Arc<dyn InterviewStore>,
    /// Sync cycle guard, shared with the scheduler
    pub runner: Arc<SyncRunner>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<dyn InterviewStore>, runner: Arc<SyncRunner>) -> Self {
        Self {
            store,
            runner,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let v1 = Router::new()
        .route("/interviews", get(api::list_interviews))
        .route("/interviews/count", get(api::count_interviews))
        .route("/sync/status", get(api::sync_status))
        .route("/sync/run", post(api::run_sync));

    Router::new()
        .nest("/api/v1", v1)
        .merge(api::health_routes())
        .layer(middleware::from_fn(api::log_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
