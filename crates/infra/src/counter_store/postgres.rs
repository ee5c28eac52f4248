//! Postgres-backed counter store.
//!
//! Every operation is one statement. Allocation is an upsert that increments
//! in place and returns the new value, so the row lock taken by Postgres is
//! what serialises concurrent callers; raising the floor uses `GREATEST`.
//! No value is ever read into the application and written back. Allocation
//! also checks `quarantined_keys` in the same statement, so a key blocked by
//! any process stops allocating everywhere.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool, Row};
use stockroom_core::SequenceKey;
use stockroom_numbering::{Counter, CounterStore, CounterStoreError};
use tracing::instrument;

use super::{from_db_seq, map_sqlx_error, to_db_seq};

// Yields no row while the key is quarantined.
const ALLOCATE_NEXT: &str = r#"
    INSERT INTO counters (key, seq)
    SELECT $1, 1
    WHERE NOT EXISTS (SELECT 1 FROM quarantined_keys WHERE key = $1)
    ON CONFLICT (key) DO UPDATE
        SET seq = counters.seq + 1, updated_at = NOW()
    RETURNING seq
"#;

const RAISE_FLOOR: &str = r#"
    INSERT INTO counters (key, seq) VALUES ($1, $2)
    ON CONFLICT (key) DO UPDATE
        SET seq = GREATEST(counters.seq, EXCLUDED.seq), updated_at = NOW()
    RETURNING seq
"#;

#[derive(Debug, Clone)]
pub struct PostgresCounterStore {
    pool: Arc<PgPool>,
}

impl PostgresCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CounterStore for PostgresCounterStore {
    #[instrument(skip(self), fields(key = %key), err)]
    async fn peek(&self, key: &SequenceKey) -> Result<u64, CounterStoreError> {
        peek_with(&*self.pool, key).await
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn allocate_next(&self, key: &SequenceKey) -> Result<u64, CounterStoreError> {
        allocate_next_with(&*self.pool, key).await
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn raise_floor(
        &self,
        key: &SequenceKey,
        candidate: u64,
    ) -> Result<u64, CounterStoreError> {
        raise_floor_with(&*self.pool, key, candidate).await
    }

    async fn list(&self) -> Result<Vec<Counter>, CounterStoreError> {
        list_with(&*self.pool).await
    }
}

pub(crate) async fn peek_with<'c, E>(exec: E, key: &SequenceKey) -> Result<u64, CounterStoreError>
where
    E: PgExecutor<'c>,
{
    let seq: Option<i64> = sqlx::query_scalar("SELECT seq FROM counters WHERE key = $1")
        .bind(key.as_str())
        .fetch_optional(exec)
        .await
        .map_err(|e| map_sqlx_error("peek", e))?;
    seq.map_or(Ok(0), from_db_seq)
}

pub(crate) async fn allocate_next_with<'c, E>(
    exec: E,
    key: &SequenceKey,
) -> Result<u64, CounterStoreError>
where
    E: PgExecutor<'c>,
{
    let seq: Option<i64> = sqlx::query_scalar(ALLOCATE_NEXT)
        .bind(key.as_str())
        .fetch_optional(exec)
        .await
        .map_err(|e| {
            if is_out_of_range(&e) {
                CounterStoreError::Exhausted(key.clone())
            } else {
                map_sqlx_error("allocate_next", e)
            }
        })?;
    match seq {
        Some(seq) => from_db_seq(seq),
        None => Err(CounterStoreError::Quarantined(key.clone())),
    }
}

pub(crate) async fn raise_floor_with<'c, E>(
    exec: E,
    key: &SequenceKey,
    candidate: u64,
) -> Result<u64, CounterStoreError>
where
    E: PgExecutor<'c>,
{
    let candidate = to_db_seq(key, candidate)?;
    let seq: i64 = sqlx::query_scalar(RAISE_FLOOR)
        .bind(key.as_str())
        .bind(candidate)
        .fetch_one(exec)
        .await
        .map_err(|e| map_sqlx_error("raise_floor", e))?;
    from_db_seq(seq)
}

pub(crate) async fn list_with<'c, E>(exec: E) -> Result<Vec<Counter>, CounterStoreError>
where
    E: PgExecutor<'c>,
{
    let rows = sqlx::query("SELECT key, seq FROM counters ORDER BY key ASC")
        .fetch_all(exec)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

    rows.into_iter()
        .map(|row| {
            let key: String = row
                .try_get("key")
                .map_err(|e| map_sqlx_error("list", e))?;
            let seq: i64 = row
                .try_get("seq")
                .map_err(|e| map_sqlx_error("list", e))?;
            let key = SequenceKey::from_str(&key)
                .map_err(|e| CounterStoreError::Storage(format!("stored key `{key}`: {e}")))?;
            Ok(Counter {
                key,
                seq: from_db_seq(seq)?,
            })
        })
        .collect()
}

/// `numeric_value_out_of_range`: `seq + 1` overflowed BIGINT.
fn is_out_of_range(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("22003"))
}
