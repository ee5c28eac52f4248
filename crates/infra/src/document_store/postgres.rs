//! Postgres-backed document store.
//!
//! `insert_numbered` runs the counter increment and the document insert in
//! one transaction: either both commit or neither does, so numbers issued
//! through this store leave no gaps. The `(collection, number)` unique index
//! turns any duplicate into a constraint violation, which quarantines the key.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | `DocumentStoreError` |
//! |------------|-----------------|----------------------|
//! | Database (unique violation) | `23505` | `DuplicateNumber` |
//! | pool timeout / closed, I/O, TLS | N/A | `Unavailable` |
//! | anything else | any | `Storage` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use stockroom_core::{DocumentId, NumberFormat, SequenceKey};
use stockroom_numbering::{
    Counter, CounterStore, CounterStoreError, DocumentScan, KeyQuarantine, NumberAllocator,
    ScanError, ScannedNumber,
};
use tokio::sync::Mutex;
use tracing::instrument;

use super::{Document, DocumentStore, DocumentStoreError, body_number, merge_patch};
use crate::counter_store::postgres::{allocate_next_with, list_with, peek_with, raise_floor_with};
use crate::counter_store::{is_connectivity, is_unique_violation};

const SELECT_DOCUMENT: &str = r#"
    SELECT id, collection, number, body, created_at, updated_at
    FROM documents
"#;

#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
    format: NumberFormat,
    quarantine: KeyQuarantine,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool, format: NumberFormat, quarantine: KeyQuarantine) -> Self {
        Self {
            pool: Arc::new(pool),
            format,
            quarantine,
        }
    }

    async fn begin(
        &self,
        operation: &str,
    ) -> Result<Transaction<'static, Postgres>, DocumentStoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn insert_row(
        tx: &mut Transaction<'static, Postgres>,
        document: &Document,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, number, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&document.collection)
        .bind(document.id.as_uuid())
        .bind(document.number.as_deref())
        .bind(Json(&document.body))
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

/// Counter operations bound to an open transaction, so allocation commits or
/// rolls back together with the document it numbers.
struct TxCounters {
    tx: Mutex<Transaction<'static, Postgres>>,
}

impl TxCounters {
    fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx: Mutex::new(tx) }
    }

    fn into_inner(self) -> Transaction<'static, Postgres> {
        self.tx.into_inner()
    }
}

#[async_trait]
impl CounterStore for TxCounters {
    async fn peek(&self, key: &SequenceKey) -> Result<u64, CounterStoreError> {
        let mut tx = self.tx.lock().await;
        peek_with(&mut **tx, key).await
    }

    async fn allocate_next(&self, key: &SequenceKey) -> Result<u64, CounterStoreError> {
        let mut tx = self.tx.lock().await;
        allocate_next_with(&mut **tx, key).await
    }

    async fn raise_floor(
        &self,
        key: &SequenceKey,
        candidate: u64,
    ) -> Result<u64, CounterStoreError> {
        let mut tx = self.tx.lock().await;
        raise_floor_with(&mut **tx, key, candidate).await
    }

    async fn list(&self) -> Result<Vec<Counter>, CounterStoreError> {
        let mut tx = self.tx.lock().await;
        list_with(&mut **tx).await
    }
}

#[async_trait]
impl DocumentScan for PostgresDocumentStore {
    #[instrument(skip(self), err)]
    async fn scan_numbers(
        &self,
        collection: &str,
        number_field: &str,
        starts_with: &str,
    ) -> Result<Vec<ScannedNumber>, ScanError> {
        let rows = sqlx::query(
            r#"
            SELECT id, body ->> $2 AS number
            FROM documents
            WHERE collection = $1 AND body ->> $2 LIKE $3 ESCAPE '\'
            "#,
        )
        .bind(collection)
        .bind(number_field)
        .bind(format!("{}%", escape_like(starts_with)))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| {
            if is_connectivity(&e) {
                ScanError::Unavailable(e.to_string())
            } else {
                ScanError::Storage(e.to_string())
            }
        })?;

        rows.iter()
            .map(|row| {
                let id: uuid::Uuid = row
                    .try_get("id")
                    .map_err(|e| ScanError::Storage(e.to_string()))?;
                let number: String = row
                    .try_get("number")
                    .map_err(|e| ScanError::Storage(e.to_string()))?;
                Ok(ScannedNumber {
                    document_id: id.to_string(),
                    number,
                })
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(skip(self, body), err)]
    async fn insert(
        &self,
        collection: &str,
        body: Map<String, Value>,
        number_field: Option<&str>,
    ) -> Result<Document, DocumentStoreError> {
        let number = body_number(&body, number_field);
        let mut document = Document::new(collection, body);
        document.number = number;

        let mut tx = self.begin("insert").await?;
        if let Err(e) = Self::insert_row(&mut tx, &document).await {
            return Err(match (is_unique_violation(&e), document.number) {
                (true, Some(number)) => DocumentStoreError::DuplicateNumber {
                    collection: collection.to_string(),
                    number,
                    key: None,
                },
                _ => map_sqlx_error("insert", e),
            });
        }
        tx.commit().await.map_err(|e| map_sqlx_error("insert", e))?;
        Ok(document)
    }

    #[instrument(skip(self, body, key), fields(key = %key), err)]
    async fn insert_numbered(
        &self,
        collection: &str,
        body: Map<String, Value>,
        number_field: &str,
        key: &SequenceKey,
    ) -> Result<Document, DocumentStoreError> {
        let tx = self.begin("insert_numbered").await?;
        let allocator = NumberAllocator::with_quarantine(
            TxCounters::new(tx),
            self.format,
            self.quarantine.clone(),
        );
        // On error the transaction is dropped, which rolls it back.
        let number = allocator.next_for_key(key).await?;
        let mut tx = allocator.into_store().into_inner();

        let mut document = Document::new(collection, body);
        document
            .body
            .insert(number_field.to_string(), Value::String(number.to_string()));
        document.number = Some(number.to_string());

        if let Err(e) = Self::insert_row(&mut tx, &document).await {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            if is_unique_violation(&e) {
                let reason = format!("document number `{number}` already stored in `{collection}`");
                if let Err(e) = self.quarantine.block(key, reason).await {
                    tracing::error!(error = %e, "failed to quarantine key");
                }
                return Err(DocumentStoreError::DuplicateNumber {
                    collection: collection.to_string(),
                    number: number.into_string(),
                    key: Some(key.clone()),
                });
            }
            return Err(map_sqlx_error("insert_numbered", e));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("insert_numbered", e))?;
        tracing::info!(number = %number, "numbered document stored");
        Ok(document)
    }

    #[instrument(skip(self), fields(id = %id), err)]
    async fn get(&self, collection: &str, id: DocumentId) -> Result<Document, DocumentStoreError> {
        let row = sqlx::query(&format!("{SELECT_DOCUMENT} WHERE collection = $1 AND id = $2"))
            .bind(collection)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;

        match row {
            Some(row) => document_from_row(&row),
            None => Err(DocumentStoreError::NotFound {
                collection: collection.to_string(),
                id,
            }),
        }
    }

    #[instrument(skip(self), err)]
    async fn list(&self, collection: &str) -> Result<Vec<Document>, DocumentStoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_DOCUMENT} WHERE collection = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(collection)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(document_from_row).collect()
    }

    #[instrument(skip(self, patch), fields(id = %id), err)]
    async fn update(
        &self,
        collection: &str,
        id: DocumentId,
        patch: Map<String, Value>,
    ) -> Result<Document, DocumentStoreError> {
        let mut tx = self.begin("update").await?;

        let row = sqlx::query(&format!(
            "{SELECT_DOCUMENT} WHERE collection = $1 AND id = $2 FOR UPDATE"
        ))
        .bind(collection)
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        let Some(row) = row else {
            return Err(DocumentStoreError::NotFound {
                collection: collection.to_string(),
                id,
            });
        };
        let mut document = document_from_row(&row)?;
        merge_patch(&mut document.body, patch);
        document.updated_at = Utc::now();

        sqlx::query(
            "UPDATE documents SET body = $3, updated_at = $4 WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id.as_uuid())
        .bind(Json(&document.body))
        .bind(document.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("update", e))?;
        Ok(document)
    }
}

// SQLx row types

#[derive(Debug)]
struct DocumentRow {
    id: uuid::Uuid,
    collection: String,
    number: Option<String>,
    body: Json<Map<String, Value>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for DocumentRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(DocumentRow {
            id: row.try_get("id")?,
            collection: row.try_get("collection")?,
            number: row.try_get("number")?,
            body: row.try_get("body")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: DocumentId::from_uuid(row.id),
            collection: row.collection,
            number: row.number,
            body: row.body.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn document_from_row(row: &PgRow) -> Result<Document, DocumentStoreError> {
    use sqlx::FromRow;
    DocumentRow::from_row(row)
        .map(Document::from)
        .map_err(|e| DocumentStoreError::Storage(format!("failed to decode document row: {e}")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DocumentStoreError {
    if is_connectivity(&err) {
        DocumentStoreError::Unavailable(format!("{operation}: {err}"))
    } else {
        DocumentStoreError::Storage(format!("{operation}: {err}"))
    }
}

/// Escape `LIKE` metacharacters so a prefix matches literally.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
