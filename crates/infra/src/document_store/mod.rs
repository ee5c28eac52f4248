//! JSON document storage, one collection per entity type.
//!
//! Documents are schemaless JSON objects. A numbered document carries its
//! formatted number both in its body (under the series' number field) and in
//! [`Document::number`], which is what uniqueness is enforced on.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use stockroom_core::{DocumentId, SequenceKey};
use stockroom_numbering::{AllocationError, DocumentScan};
use thiserror::Error;

pub use in_memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: DocumentId,
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    pub body: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(collection: impl Into<String>, body: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::new(),
            collection: collection.into(),
            number: None,
            body,
            created_at: now,
            updated_at: now,
        }
    }

    /// String value of `field` in the body, if any.
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(Value::as_str)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DocumentStoreError {
    #[error("document {id} not found in `{collection}`")]
    NotFound { collection: String, id: DocumentId },

    /// Another document in the collection already carries `number`.
    #[error("document number `{number}` already exists in `{collection}`")]
    DuplicateNumber {
        collection: String,
        number: String,
        key: Option<SequenceKey>,
    },

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("document storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait DocumentStore: DocumentScan {
    /// Store `body` as a new document. When `number_field` is given and the
    /// body holds a string there, it becomes the document's number and must be
    /// unique within the collection.
    async fn insert(
        &self,
        collection: &str,
        body: Map<String, Value>,
        number_field: Option<&str>,
    ) -> Result<Document, DocumentStoreError>;

    /// Allocate the next number under `key`, write it to `number_field` and
    /// store the document. No document is stored without its number.
    async fn insert_numbered(
        &self,
        collection: &str,
        body: Map<String, Value>,
        number_field: &str,
        key: &SequenceKey,
    ) -> Result<Document, DocumentStoreError>;

    async fn get(&self, collection: &str, id: DocumentId) -> Result<Document, DocumentStoreError>;

    /// All documents of `collection`, oldest first.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, DocumentStoreError>;

    /// Shallow merge of `patch` into the body; `null` values remove the field.
    async fn update(
        &self,
        collection: &str,
        id: DocumentId,
        patch: Map<String, Value>,
    ) -> Result<Document, DocumentStoreError>;
}

#[async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn insert(
        &self,
        collection: &str,
        body: Map<String, Value>,
        number_field: Option<&str>,
    ) -> Result<Document, DocumentStoreError> {
        (**self).insert(collection, body, number_field).await
    }

    async fn insert_numbered(
        &self,
        collection: &str,
        body: Map<String, Value>,
        number_field: &str,
        key: &SequenceKey,
    ) -> Result<Document, DocumentStoreError> {
        (**self)
            .insert_numbered(collection, body, number_field, key)
            .await
    }

    async fn get(&self, collection: &str, id: DocumentId) -> Result<Document, DocumentStoreError> {
        (**self).get(collection, id).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, DocumentStoreError> {
        (**self).list(collection).await
    }

    async fn update(
        &self,
        collection: &str,
        id: DocumentId,
        patch: Map<String, Value>,
    ) -> Result<Document, DocumentStoreError> {
        (**self).update(collection, id, patch).await
    }
}

pub(crate) fn merge_patch(body: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (field, value) in patch {
        if value.is_null() {
            body.remove(&field);
        } else {
            body.insert(field, value);
        }
    }
}

/// Number carried in the body, for imports.
pub(crate) fn body_number(body: &Map<String, Value>, number_field: Option<&str>) -> Option<String> {
    number_field
        .and_then(|field| body.get(field))
        .and_then(Value::as_str)
        .map(str::to_string)
}
