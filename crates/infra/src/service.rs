//! Document operations with numbering and invalidation applied.
//!
//! Every successful mutation returns the set of cache keys to invalidate,
//! taken from the static [`InvalidationGraph`]; callers never compute it
//! themselves.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use stockroom_core::{DocumentId, NumberFormat};
use stockroom_invalidation::{EntityKind, InvalidationGraph, QueryKey};
use stockroom_numbering::CollectionBinding;
use thiserror::Error;
use tracing::instrument;

use crate::config::PeriodPolicy;
use crate::document_store::{Document, DocumentStore, DocumentStoreError};
use crate::series::SeriesCatalog;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] DocumentStoreError),
}

impl ServiceError {
    fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }
}

/// Result of a committed mutation.
#[derive(Debug, Clone, Serialize)]
pub struct Mutation {
    pub entity: EntityKind,
    pub document: Document,
    pub invalidate: BTreeSet<QueryKey>,
}

#[derive(Debug, Clone)]
pub struct DocumentService<D> {
    store: D,
    series: SeriesCatalog,
    format: NumberFormat,
    period: PeriodPolicy,
    graph: &'static InvalidationGraph,
}

impl<D> DocumentService<D> {
    pub fn new(
        store: D,
        series: SeriesCatalog,
        format: NumberFormat,
        period: PeriodPolicy,
    ) -> Self {
        Self {
            store,
            series,
            format,
            period,
            graph: InvalidationGraph::standard(),
        }
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    pub fn series(&self) -> &SeriesCatalog {
        &self.series
    }

    pub fn format(&self) -> &NumberFormat {
        &self.format
    }

    /// Period that new numbers are issued under right now.
    pub fn current_period(&self) -> String {
        self.period.resolve(Utc::now())
    }

    /// Reconciliation bindings for every configured series in `period`
    /// (current period when `None`).
    pub fn bindings(&self, period: Option<&str>) -> Result<Vec<CollectionBinding>, ServiceError> {
        let period = period.map_or_else(|| self.current_period(), str::to_string);
        self.series
            .bindings_for_period(&self.format, &period)
            .map_err(|e| ServiceError::validation(e.to_string()))
    }

    fn mutation(&self, entity: EntityKind, document: Document) -> Mutation {
        let invalidate = self.graph.invalidation_set(entity, document.id);
        Mutation {
            entity,
            document,
            invalidate,
        }
    }
}

impl<D> DocumentService<D>
where
    D: DocumentStore,
{
    /// Create a document. Numbered entities get the next number of their
    /// series; a number supplied by the caller is rejected.
    #[instrument(skip(self, body), fields(entity = %entity), err)]
    pub async fn create(
        &self,
        entity: EntityKind,
        body: Value,
        period: Option<&str>,
    ) -> Result<Mutation, ServiceError> {
        let body = into_object(body)?;

        let document = match self.series.get(entity) {
            Some(series) => {
                if body.contains_key(&series.number_field) {
                    return Err(ServiceError::validation(format!(
                        "`{}` is assigned by the server",
                        series.number_field
                    )));
                }
                let period = period.map_or_else(|| self.current_period(), str::to_string);
                let key = series
                    .key(&self.format, &period)
                    .map_err(|e| ServiceError::validation(e.to_string()))?;
                self.store
                    .insert_numbered(series.collection(), body, &series.number_field, &key)
                    .await?
            }
            None => self.store.insert(entity.collection(), body, None).await?,
        };

        tracing::info!(id = %document.id, number = ?document.number, "document created");
        Ok(self.mutation(entity, document))
    }

    /// Store a document that already carries its number (data migration,
    /// manual entry). The counter is not touched; run reconciliation after
    /// importing.
    #[instrument(skip(self, body), fields(entity = %entity), err)]
    pub async fn import(&self, entity: EntityKind, body: Value) -> Result<Mutation, ServiceError> {
        let body = into_object(body)?;
        let number_field = self.series.get(entity).map(|s| s.number_field.as_str());
        if let Some(field) = number_field {
            match body.get(field) {
                Some(Value::String(n)) if !n.trim().is_empty() => {}
                _ => {
                    return Err(ServiceError::validation(format!(
                        "imported {entity} must carry a `{field}` string"
                    )));
                }
            }
        }

        let document = self
            .store
            .insert(entity.collection(), body, number_field)
            .await?;
        tracing::info!(id = %document.id, number = ?document.number, "document imported");
        Ok(self.mutation(entity, document))
    }

    /// Shallow-merge `patch` into a document. The number field is immutable.
    #[instrument(skip(self, patch), fields(entity = %entity, id = %id), err)]
    pub async fn update(
        &self,
        entity: EntityKind,
        id: DocumentId,
        patch: Value,
    ) -> Result<Mutation, ServiceError> {
        let patch = into_object(patch)?;
        if let Some(series) = self.series.get(entity) {
            if patch.contains_key(&series.number_field) {
                return Err(ServiceError::validation(format!(
                    "`{}` cannot be changed",
                    series.number_field
                )));
            }
        }
        let document = self.store.update(entity.collection(), id, patch).await?;
        Ok(self.mutation(entity, document))
    }

    pub async fn get(&self, entity: EntityKind, id: DocumentId) -> Result<Document, ServiceError> {
        Ok(self.store.get(entity.collection(), id).await?)
    }

    pub async fn list(&self, entity: EntityKind) -> Result<Vec<Document>, ServiceError> {
        Ok(self.store.list(entity.collection()).await?)
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>, ServiceError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ServiceError::validation(format!(
            "document body must be a JSON object, got {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
