//! In-memory document store for tests and single-process deployments.
//!
//! Allocation and insert are two steps here: a failed insert after a
//! successful allocation leaves a gap in the series, never a document
//! without a number.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use stockroom_core::{DocumentId, SequenceKey};
use stockroom_numbering::{CounterStore, DocumentScan, NumberAllocator, ScanError, ScannedNumber};
use tracing::instrument;

use super::{Document, DocumentStore, DocumentStoreError, body_number, merge_patch};

type Collections = HashMap<String, BTreeMap<DocumentId, Document>>;

#[derive(Debug)]
pub struct InMemoryDocumentStore<C> {
    collections: RwLock<Collections>,
    allocator: NumberAllocator<C>,
}

impl<C> InMemoryDocumentStore<C> {
    pub fn new(allocator: NumberAllocator<C>) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            allocator,
        }
    }

    pub fn allocator(&self) -> &NumberAllocator<C> {
        &self.allocator
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>, DocumentStoreError> {
        self.collections
            .read()
            .map_err(|_| DocumentStoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>, DocumentStoreError> {
        self.collections
            .write()
            .map_err(|_| DocumentStoreError::Storage("lock poisoned".to_string()))
    }

    /// Insert unless another document of the collection has the same number.
    fn store(&self, document: Document) -> Result<Document, DocumentStoreError> {
        let mut collections = self.write()?;
        let docs = collections.entry(document.collection.clone()).or_default();
        if let Some(number) = &document.number {
            if docs.values().any(|d| d.number.as_ref() == Some(number)) {
                return Err(DocumentStoreError::DuplicateNumber {
                    collection: document.collection.clone(),
                    number: number.clone(),
                    key: None,
                });
            }
        }
        docs.insert(document.id, document.clone());
        Ok(document)
    }
}

#[async_trait]
impl<C> DocumentScan for InMemoryDocumentStore<C>
where
    C: Send + Sync,
{
    async fn scan_numbers(
        &self,
        collection: &str,
        number_field: &str,
        starts_with: &str,
    ) -> Result<Vec<ScannedNumber>, ScanError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| ScanError::Storage("lock poisoned".to_string()))?;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .values()
            .filter_map(|doc| {
                let number = doc.field_str(number_field)?;
                number.starts_with(starts_with).then(|| ScannedNumber {
                    document_id: doc.id.to_string(),
                    number: number.to_string(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl<C> DocumentStore for InMemoryDocumentStore<C>
where
    C: CounterStore,
{
    async fn insert(
        &self,
        collection: &str,
        body: Map<String, Value>,
        number_field: Option<&str>,
    ) -> Result<Document, DocumentStoreError> {
        let number = body_number(&body, number_field);
        let mut document = Document::new(collection, body);
        document.number = number;
        self.store(document)
    }

    #[instrument(skip(self, body, key), fields(key = %key), err)]
    async fn insert_numbered(
        &self,
        collection: &str,
        body: Map<String, Value>,
        number_field: &str,
        key: &SequenceKey,
    ) -> Result<Document, DocumentStoreError> {
        let number = self.allocator.next_for_key(key).await?;

        let mut document = Document::new(collection, body);
        document
            .body
            .insert(number_field.to_string(), Value::String(number.to_string()));
        document.number = Some(number.to_string());

        match self.store(document) {
            Err(DocumentStoreError::DuplicateNumber {
                collection, number, ..
            }) => {
                self.allocator.report_duplicate(&number, key).await;
                Err(DocumentStoreError::DuplicateNumber {
                    collection,
                    number,
                    key: Some(key.clone()),
                })
            }
            other => other,
        }
    }

    async fn get(&self, collection: &str, id: DocumentId) -> Result<Document, DocumentStoreError> {
        self.read()?
            .get(collection)
            .and_then(|docs| docs.get(&id))
            .cloned()
            .ok_or_else(|| DocumentStoreError::NotFound {
                collection: collection.to_string(),
                id,
            })
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, DocumentStoreError> {
        let mut docs: Vec<Document> = self
            .read()?
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        docs.sort_by_key(|d| d.created_at);
        Ok(docs)
    }

    async fn update(
        &self,
        collection: &str,
        id: DocumentId,
        patch: Map<String, Value>,
    ) -> Result<Document, DocumentStoreError> {
        let mut collections = self.write()?;
        let document = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(&id))
            .ok_or_else(|| DocumentStoreError::NotFound {
                collection: collection.to_string(),
                id,
            })?;
        merge_patch(&mut document.body, patch);
        document.updated_at = Utc::now();
        Ok(document.clone())
    }
}
