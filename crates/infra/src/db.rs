//! Postgres pool and schema bootstrap.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::instrument;

/// Statements run by [`ensure_schema`], in order. All are idempotent.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS counters (
        key TEXT PRIMARY KEY,
        seq BIGINT NOT NULL CHECK (seq >= 0),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id UUID NOT NULL,
        number TEXT NULL,
        body JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (collection, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS quarantined_keys (
        key TEXT PRIMARY KEY,
        reason TEXT NOT NULL,
        since TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    // Last line of defence against two documents sharing a number.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS documents_collection_number_key
        ON documents (collection, number)
        WHERE number IS NOT NULL
    "#,
];

/// Connect a pool. Acquisition fails fast so an unreachable database surfaces
/// as an error instead of a hung request.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

#[instrument(skip(pool), err)]
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("database schema ready");
    Ok(())
}
