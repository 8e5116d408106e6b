//! Sync cycle driver
//!
//! One cycle runs FETCHING → DEDUPING → ENRICHING → PERSISTING → DONE.
//! FETCHING and DEDUPING may end the cycle early (ABORTED). Nothing is
//! carried between cycles except what the store holds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use ivd_common::config::TomlConfig;
use ivd_common::SubmissionRecord;
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::dedup::filter_new;
use super::duration::{DurationResolver, Resolution};
use super::fetcher::SubmissionFetcher;
use crate::db::{InterviewStore, StoreError};
use crate::transport::HttpTransport;

/// Pipeline state within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Fetching,
    Deduping,
    Enriching,
    Persisting,
    Done,
    Aborted,
}

/// Why a cycle stopped before enrichment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Fetch returned nothing (remote unreachable, unusable payload or empty form)
    NoSubmissions,
    /// Everything fetched is already stored
    NoNewRecords,
    /// Existing keys could not be read
    StoreUnavailable,
}

/// Counters of one cycle, for logs and the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SyncCycleResult {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: CycleState,
    pub abort_reason: Option<AbortReason>,
    pub fetched: usize,
    pub already_known: usize,
    pub newly_processed: usize,
    /// Records that received a duration
    pub enriched: usize,
    pub persisted: u64,
    /// Audit fetches that failed (not found, transport or parse error)
    pub failed: usize,
    /// Set when the batch commit failed for a reason other than a key conflict
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

impl SyncCycleResult {
    fn new(cycle: u64) -> Self {
        Self {
            cycle,
            started_at: Utc::now(),
            finished_at: None,
            state: CycleState::Fetching,
            abort_reason: None,
            fetched: 0,
            already_known: 0,
            newly_processed: 0,
            enriched: 0,
            persisted: 0,
            failed: 0,
            persist_error: None,
        }
    }

    fn enter(&mut self, state: CycleState) {
        debug!(from = ?self.state, to = ?state, "Cycle state transition");
        self.state = state;
    }

    fn abort(mut self, reason: AbortReason) -> Self {
        self.enter(CycleState::Aborted);
        self.abort_reason = Some(reason);
        self.finished_at = Some(Utc::now());
        self
    }

    fn finish(mut self) -> Self {
        self.enter(CycleState::Done);
        self.finished_at = Some(Utc::now());
        self
    }
}

/// Drives fetch, dedup, enrichment and persistence for one cycle at a time
pub struct SyncOrchestrator {
    fetcher: SubmissionFetcher,
    resolver: DurationResolver,
    store: Arc<dyn InterviewStore>,
    fields: Vec<String>,
    concurrency: usize,
    cycles: AtomicU64,
}

impl SyncOrchestrator {
    pub fn new(
        fetcher: SubmissionFetcher,
        resolver: DurationResolver,
        store: Arc<dyn InterviewStore>,
        fields: Vec<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            resolver,
            store,
            fields,
            concurrency: concurrency.max(1),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn from_config(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn InterviewStore>,
        config: &TomlConfig,
    ) -> Self {
        Self::new(
            SubmissionFetcher::from_config(transport.clone(), &config.kobo),
            DurationResolver::from_config(transport, &config.kobo, &config.audit),
            store,
            config.kobo.fields.clone(),
            config.sync.effective_concurrency(),
        )
    }

    /// Run one full cycle
    ///
    /// Never fails: every outcome is reported in the returned result.
    pub async fn run_cycle(&self) -> SyncCycleResult {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let span = info_span!("sync_cycle", cycle);
        self.execute(cycle).instrument(span).await
    }

    async fn execute(&self, cycle: u64) -> SyncCycleResult {
        info!("Sync cycle started");
        let mut result = SyncCycleResult::new(cycle);

        // FETCHING
        let fetched = self.fetcher.fetch_all(&self.fields).await;
        result.fetched = fetched.len();
        if fetched.is_empty() {
            error!(severity = "critical", "No records to process");
            return log_result(result.abort(AbortReason::NoSubmissions));
        }

        // DEDUPING
        result.enter(CycleState::Deduping);
        let existing = match self.store.existing_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                error!(error = %e, "Failed to read existing keys");
                return log_result(result.abort(AbortReason::StoreUnavailable));
            }
        };
        if !existing.is_empty() {
            info!(count = existing.len(), "Loaded existing keys from the database");
        }

        let new_records = filter_new(fetched, &existing);
        result.newly_processed = new_records.len();
        result.already_known = result.fetched - new_records.len();
        if new_records.is_empty() {
            info!("No new records to process");
            return log_result(result.abort(AbortReason::NoNewRecords));
        }

        // ENRICHING
        result.enter(CycleState::Enriching);
        let (records, resolutions) = self.enrich(new_records).await;
        result.enriched = resolutions
            .iter()
            .filter(|r| matches!(r, Resolution::Computed(_)))
            .count();
        result.failed = resolutions.iter().filter(|r| r.is_failure()).count();

        // PERSISTING
        result.enter(CycleState::Persisting);
        match self.store.insert_new(&records).await {
            Ok(inserted) => {
                result.persisted = inserted;
                info!(inserted, "Inserted new records into the database");
            }
            Err(StoreError::Conflict(detail)) => {
                warn!(
                    detail = %detail,
                    "Uniqueness conflict during bulk insert, batch skipped until next cycle"
                );
            }
            Err(e) => {
                error!(error = %e, "Error during bulk insert, batch rolled back");
                result.persist_error = Some(e.to_string());
            }
        }

        log_result(result.finish())
    }

    /// Resolve durations for every record that has an audit locator
    ///
    /// Each record is attempted exactly once, at most `concurrency` at a
    /// time. Output keeps input order.
    async fn enrich(
        &self,
        records: Vec<SubmissionRecord>,
    ) -> (Vec<SubmissionRecord>, Vec<Resolution>) {
        let resolver = &self.resolver;

        let attempts: Vec<(SubmissionRecord, Option<Resolution>)> = stream::iter(records)
            .map(move |mut record| async move {
                let resolution = match record.audit_locator.as_deref() {
                    Some(locator) => Some(resolver.resolve_detailed(locator).await),
                    None => None,
                };
                if let Some(resolution) = resolution {
                    record.duration_minutes = resolution.duration();
                }
                (record, resolution)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut records = Vec::with_capacity(attempts.len());
        let mut resolutions = Vec::new();
        for (record, resolution) in attempts {
            records.push(record);
            resolutions.extend(resolution);
        }
        (records, resolutions)
    }
}

fn log_result(result: SyncCycleResult) -> SyncCycleResult {
    info!(
        state = ?result.state,
        abort_reason = ?result.abort_reason,
        fetched = result.fetched,
        already_known = result.already_known,
        newly_processed = result.newly_processed,
        enriched = result.enriched,
        persisted = result.persisted,
        failed = result.failed,
        "Sync cycle finished"
    );
    result
}
