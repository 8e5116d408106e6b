//! Persistence gateway
//!
//! The sync pipeline and the read API only see `InterviewStore`; the SQLite
//! mapping lives in `interviews`.

use std::collections::HashSet;

use async_trait::async_trait;
use ivd_common::SubmissionRecord;
use thiserror::Error;

mod interviews;
pub use interviews::SqliteInterviewRepository;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key uniqueness violated by a concurrent writer
    #[error("Uniqueness conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::Conflict(db_err.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

/// Key-addressable interview storage
#[async_trait]
pub trait InterviewStore: Send + Sync {
    /// Keys of every stored record
    async fn existing_keys(&self) -> Result<HashSet<String>, StoreError>;

    /// Insert a batch atomically, silently skipping keys already stored
    ///
    /// Returns the number of rows actually inserted. Any error leaves the
    /// store unchanged.
    async fn insert_new(&self, records: &[SubmissionRecord]) -> Result<u64, StoreError>;

    /// Every stored record in insertion order
    async fn all(&self) -> Result<Vec<SubmissionRecord>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;
}
