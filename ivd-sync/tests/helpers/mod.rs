//! Test helpers for ivd-sync integration tests
//!
//! - ScriptedTransport: canned responses keyed by URL, with a request log
//!   and an optional gate that holds requests until released
//! - FailingStore: an InterviewStore whose writes always fail
//! - Fixture builders for submission pages and audit trails

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ivd_common::config::TomlConfig;
use ivd_common::SubmissionRecord;
use ivd_sync::db::{InterviewStore, SqliteInterviewRepository, StoreError};
use ivd_sync::sync::{SyncOrchestrator, SyncRunner};
use ivd_sync::transport::{HttpTransport, TransportError};
use serde_json::{json, Value};
use tokio::sync::Notify;

pub const SERVER: &str = "http://kobo.test";
pub const FORM_UID: &str = "aTestForm";
pub const AUDIT_BASE: &str = "http://kobo.test/media/original?media_file=";
pub const START_NODE: &str = "/form/intro/first_note";
pub const END_NODE: &str = "/form/main/quality_note";

/// Transport that answers from a URL map
///
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, Result<String, TransportError>>>,
    prefix_responses: Mutex<Vec<(String, Result<String, TransportError>)>>,
    requests: Mutex<Vec<String>>,
    gate: Option<Arc<Notify>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every request until the returned handle is notified
    pub fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let transport = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (transport, gate)
    }

    /// Every request takes `latency` to answer
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Most requests ever outstanding at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn respond(&self, url: impl Into<String>, body: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.into(), Ok(body.into()));
    }

    pub fn fail(&self, url: impl Into<String>, error: TransportError) {
        self.responses.lock().unwrap().insert(url.into(), Err(error));
    }

    /// Answer any URL starting with `prefix` (first-page URLs carry a query)
    pub fn respond_prefix(&self, prefix: impl Into<String>, body: impl Into<String>) {
        self.prefix_responses
            .lock()
            .unwrap()
            .push((prefix.into(), Ok(body.into())));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str, _headers: &[(String, String)]) -> Result<String, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());
        let outstanding = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(outstanding, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(response) = self.responses.lock().unwrap().get(url) {
            return response.clone();
        }
        let prefixed = self
            .prefix_responses
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, response)| response.clone());

        prefixed.unwrap_or_else(|| Err(TransportError::NotFound(url.to_string())))
    }
}

/// Which failure a `FailingStore` reports on insert
#[derive(Clone, Copy)]
pub enum InsertFailure {
    Conflict,
    Database,
}

/// Store with no rows whose inserts always fail
pub struct FailingStore {
    pub failure: InsertFailure,
    pub unreadable: bool,
}

#[async_trait]
impl InterviewStore for FailingStore {
    async fn existing_keys(&self) -> Result<HashSet<String>, StoreError> {
        if self.unreadable {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(HashSet::new())
    }

    async fn insert_new(&self, _records: &[SubmissionRecord]) -> Result<u64, StoreError> {
        match self.failure {
            InsertFailure::Conflict => Err(StoreError::Conflict(
                "UNIQUE constraint failed: interviews.uuid".to_string(),
            )),
            InsertFailure::Database => Err(StoreError::Database(sqlx::Error::PoolTimedOut)),
        }
    }

    async fn all(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(0)
    }
}

/// Configuration pointing at the scripted server
pub fn test_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.kobo.server = SERVER.to_string();
    config.kobo.form_uid = FORM_UID.to_string();
    config.kobo.api_token = "test-token".to_string();
    config.kobo.audit_base_url = AUDIT_BASE.to_string();
    config.audit.start_node = START_NODE.to_string();
    config.audit.end_node = END_NODE.to_string();
    config.audit.precision = 1;
    config.sync.concurrency = 4;
    config
}

/// Prefix shared by every first-page submissions URL
pub fn data_prefix() -> String {
    format!("{}/api/v2/assets/{}/data/", SERVER, FORM_UID)
}

pub fn audit_url(locator: &str) -> String {
    format!("{}{}", AUDIT_BASE, locator)
}

/// One submission object as the data endpoint returns it
pub fn submission(key: &str, enumerator: &str, audit_file: Option<&str>) -> Value {
    let attachments = match audit_file {
        Some(name) => json!([{ "filename": name }]),
        None => json!([]),
    };
    json!({
        "_uuid": key,
        "metadata/enumerator_Id": enumerator,
        "_attachments": attachments,
    })
}

/// A data endpoint page
pub fn page(results: Vec<Value>, next: Option<&str>) -> String {
    json!({
        "count": results.len(),
        "next": next,
        "results": results,
    })
    .to_string()
}

/// Audit trail with the start checkpoint at `start_ms` and the end
/// checkpoint at `end_ms`
pub fn audit_trail(start_ms: i64, end_ms: i64) -> String {
    format!(
        "event,node,start,end\n\
         form start,,{s0},\n\
         note,{start},{start_ms},{start_ms}\n\
         question,/form/main/q1,{mid},{mid}\n\
         note,{end},{end_ms},{end_ms}\n",
        s0 = start_ms - 500,
        start = START_NODE,
        end = END_NODE,
        mid = (start_ms + end_ms) / 2,
    )
}

/// SQLite-backed store on a private in-memory database
pub async fn memory_store() -> Arc<SqliteInterviewRepository> {
    let pool = ivd_common::db::open_in_memory()
        .await
        .expect("Failed to open in-memory database");
    Arc::new(SqliteInterviewRepository::new(pool))
}

pub fn runner(
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn InterviewStore>,
) -> Arc<SyncRunner> {
    let orchestrator = SyncOrchestrator::from_config(transport, store, &test_config());
    Arc::new(SyncRunner::new(orchestrator))
}
