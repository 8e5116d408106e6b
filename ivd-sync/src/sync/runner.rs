//! Single-slot guard around the orchestrator
//!
//! At most one cycle runs at any time, whether it was started by the
//! scheduler or through the HTTP API. A trigger that finds a cycle in
//! flight is skipped, never queued.
//!
//! Each cycle runs on its own task holding the slot. Dropping the caller's
//! future (an HTTP client hanging up) detaches from the cycle but never
//! stops it.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinError;
use tracing::warn;

use super::orchestrator::{SyncCycleResult, SyncOrchestrator};

/// Why a trigger produced no cycle result
#[derive(Debug, Error)]
pub enum RunError {
    #[error("a sync cycle is already running")]
    Busy,

    #[error("sync cycle task failed: {0}")]
    Task(#[from] JoinError),
}

pub struct SyncRunner {
    orchestrator: Arc<SyncOrchestrator>,
    in_flight: Arc<Mutex<()>>,
    last_result: Arc<RwLock<Option<SyncCycleResult>>>,
}

impl SyncRunner {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            in_flight: Arc::new(Mutex::new(())),
            last_result: Arc::new(RwLock::new(None)),
        }
    }

    /// Run a cycle unless one is already running
    pub async fn try_run_cycle(&self) -> Result<SyncCycleResult, RunError> {
        let Ok(slot) = self.in_flight.clone().try_lock_owned() else {
            warn!("Sync cycle already in flight, trigger skipped");
            return Err(RunError::Busy);
        };

        let orchestrator = self.orchestrator.clone();
        let last_result = self.last_result.clone();
        let cycle = tokio::spawn(async move {
            let result = orchestrator.run_cycle().await;
            *last_result.write().await = Some(result.clone());
            drop(slot);
            result
        });

        Ok(cycle.await?)
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Result of the most recently completed cycle
    pub async fn last_result(&self) -> Option<SyncCycleResult> {
        self.last_result.read().await.clone()
    }
}
