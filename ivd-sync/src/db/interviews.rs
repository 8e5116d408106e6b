//! SQLite mapping for interview records

use std::collections::HashSet;

use async_trait::async_trait;
use ivd_common::SubmissionRecord;
use sqlx::SqlitePool;
use tracing::debug;

use super::{InterviewStore, StoreError};

/// Row shape of the `interviews` table
#[derive(Debug, sqlx::FromRow)]
struct InterviewRow {
    uuid: String,
    enumerator_id: String,
    audit_locator: Option<String>,
    duration_minutes: Option<f64>,
}

impl From<InterviewRow> for SubmissionRecord {
    fn from(row: InterviewRow) -> Self {
        SubmissionRecord {
            key: row.uuid,
            enumerator_id: row.enumerator_id,
            audit_locator: row.audit_locator,
            duration_minutes: row.duration_minutes,
        }
    }
}

/// `InterviewStore` backed by a SQLite pool
#[derive(Clone)]
pub struct SqliteInterviewRepository {
    pool: SqlitePool,
}

impl SqliteInterviewRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl InterviewStore for SqliteInterviewRepository {
    async fn existing_keys(&self) -> Result<HashSet<String>, StoreError> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT uuid FROM interviews")
            .fetch_all(&self.pool)
            .await?;
        Ok(keys.into_iter().collect())
    }

    async fn insert_new(&self, records: &[SubmissionRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        // Dropping the transaction on an early return rolls it back
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO interviews (uuid, enumerator_id, audit_locator, duration_minutes)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(uuid) DO NOTHING
                "#,
            )
            .bind(&record.key)
            .bind(&record.enumerator_id)
            .bind(&record.audit_locator)
            .bind(record.duration_minutes)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;

        debug!(
            offered = records.len(),
            inserted,
            "Interview batch committed"
        );

        Ok(inserted)
    }

    async fn all(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        let rows: Vec<InterviewRow> = sqlx::query_as(
            "SELECT uuid, enumerator_id, audit_locator, duration_minutes FROM interviews ORDER BY created_at, rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SubmissionRecord::from).collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interviews")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
