//! HTTP API handlers for ivd-sync

pub mod health;
pub mod interviews;
pub mod middleware;
pub mod sync;

pub use health::health_routes;
pub use interviews::{count_interviews, list_interviews};
pub use middleware::log_requests;
pub use sync::{run_sync, sync_status};
