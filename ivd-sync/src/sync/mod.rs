//! Incremental sync pipeline
//!
//! Fetch current submissions, keep the ones not yet stored, derive each
//! one's interview duration from its audit trail, and commit the batch.

pub mod audit;
pub mod dedup;
pub mod duration;
pub mod fetcher;
pub mod orchestrator;
pub mod runner;
pub mod scheduler;

pub use audit::{compute_duration, parse_audit_csv, AuditEvent};
pub use dedup::filter_new;
pub use duration::{Checkpoints, DurationResolver, Resolution};
pub use fetcher::{decode_submission, SubmissionFetcher};
pub use orchestrator::{AbortReason, CycleState, SyncCycleResult, SyncOrchestrator};
pub use runner::{RunError, SyncRunner};
pub use scheduler::{Schedule, Scheduler};
