//! Postgres-backed quarantine, stored beside the counters it blocks.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use stockroom_core::SequenceKey;
use stockroom_numbering::{CounterStoreError, QuarantineEntry, QuarantineStore};
use tracing::instrument;

use super::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct PostgresQuarantine {
    pool: Arc<PgPool>,
}

impl PostgresQuarantine {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl QuarantineStore for PostgresQuarantine {
    #[instrument(skip(self, reason), fields(key = %key), err)]
    async fn block(&self, key: &SequenceKey, reason: &str) -> Result<bool, CounterStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO quarantined_keys (key, reason) VALUES ($1, $2)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key.as_str())
        .bind(reason)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("quarantine block", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn release(
        &self,
        key: &SequenceKey,
    ) -> Result<Option<QuarantineEntry>, CounterStoreError> {
        let row = sqlx::query(
            "DELETE FROM quarantined_keys WHERE key = $1 RETURNING key, reason, since",
        )
        .bind(key.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("quarantine release", e))?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn get(&self, key: &SequenceKey) -> Result<Option<QuarantineEntry>, CounterStoreError> {
        let row = sqlx::query("SELECT key, reason, since FROM quarantined_keys WHERE key = $1")
            .bind(key.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("quarantine get", e))?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<QuarantineEntry>, CounterStoreError> {
        let rows = sqlx::query("SELECT key, reason, since FROM quarantined_keys ORDER BY key ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("quarantine list", e))?;
        rows.iter().map(entry_from_row).collect()
    }
}

fn entry_from_row(row: &PgRow) -> Result<QuarantineEntry, CounterStoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("quarantine decode", e);
    let key: String = row.try_get("key").map_err(decode)?;
    let reason: String = row.try_get("reason").map_err(decode)?;
    let since: DateTime<Utc> = row.try_get("since").map_err(decode)?;
    let key = SequenceKey::from_str(&key)
        .map_err(|e| CounterStoreError::Storage(format!("stored key `{key}`: {e}")))?;
    Ok(QuarantineEntry { key, reason, since })
}
