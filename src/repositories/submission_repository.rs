use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{AppError, Result};
use crate::models::SubmissionRecord;
use crate::observability::{get_metrics, LatencyTimer};
use sqlx::PgPool;

/// Durable record of confirmed submissions, unique by ledger signature.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn find_by_signature(&self, signature: &str) -> Result<Option<SubmissionRecord>>;

    /// Inserts unless a record with the same signature exists. Returns the
    /// stored record and whether this call created it.
    async fn create_if_absent(&self, record: &SubmissionRecord) -> Result<(SubmissionRecord, bool)>;

    async fn list_by_sender(&self, sender_id: &str, limit: i64) -> Result<Vec<SubmissionRecord>>;
}

/// Repository for SubmissionRecord operations.
pub struct PostgresSubmissionStore {
    pool: PgPool,
}

impl PostgresSubmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionStore for PostgresSubmissionStore {
    async fn find_by_signature(&self, signature: &str) -> Result<Option<SubmissionRecord>> {
        let timer = LatencyTimer::new();
        let row = sqlx::query_as::<_, SubmissionRecord>(
            r#"
            SELECT signature, sender_id, recipient_id, amount, currency, status, created_at
            FROM submission_records
            WHERE signature = $1
            "#,
        )
        .bind(signature)
        .fetch_optional(&self.pool)
        .await;

        get_metrics().record_db_query("find_submission", timer.elapsed_ms(), row.is_ok());
        row.map_err(AppError::Database)
    }

    async fn create_if_absent(&self, record: &SubmissionRecord) -> Result<(SubmissionRecord, bool)> {
        let timer = LatencyTimer::new();
        let inserted = sqlx::query_as::<_, SubmissionRecord>(
            r#"
            INSERT INTO submission_records (signature, sender_id, recipient_id, amount, currency, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (signature) DO NOTHING
            RETURNING signature, sender_id, recipient_id, amount, currency, status, created_at
            "#,
        )
        .bind(&record.signature)
        .bind(&record.sender_id)
        .bind(&record.recipient_id)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.status)
        .bind(record.created_at)
        .fetch_optional(&self.pool)
        .await;

        get_metrics().record_db_query("insert_submission", timer.elapsed_ms(), inserted.is_ok());
        if let Some(row) = inserted.map_err(AppError::Database)? {
            return Ok((row, true));
        }

        // Lost the race to another writer; the row exists now.
        let existing = self
            .find_by_signature(&record.signature)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Submission {} vanished after conflict", record.signature)))?;
        Ok((existing, false))
    }

    async fn list_by_sender(&self, sender_id: &str, limit: i64) -> Result<Vec<SubmissionRecord>> {
        let rows = sqlx::query_as::<_, SubmissionRecord>(
            r#"
            SELECT signature, sender_id, recipient_id, amount, currency, status, created_at
            FROM submission_records
            WHERE sender_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(sender_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}

/// In-process store with the same uniqueness rule.
#[derive(Clone, Default)]
pub struct MemorySubmissionStore {
    records: Arc<Mutex<HashMap<String, SubmissionRecord>>>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SubmissionRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn find_by_signature(&self, signature: &str) -> Result<Option<SubmissionRecord>> {
        Ok(self.lock().get(signature).cloned())
    }

    async fn create_if_absent(&self, record: &SubmissionRecord) -> Result<(SubmissionRecord, bool)> {
        let mut records = self.lock();
        if let Some(existing) = records.get(&record.signature) {
            return Ok((existing.clone(), false));
        }
        records.insert(record.signature.clone(), record.clone());
        Ok((record.clone(), true))
    }

    async fn list_by_sender(&self, sender_id: &str, limit: i64) -> Result<Vec<SubmissionRecord>> {
        let mut rows: Vec<SubmissionRecord> = self
            .lock()
            .values()
            .filter(|r| r.sender_id == sender_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}
