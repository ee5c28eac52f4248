//! Infrastructure layer: counter and document stores (in-memory and
//! Postgres), document series, configuration and the document service.

pub mod config;
pub mod counter_store;
pub mod db;
pub mod document_store;
pub mod series;
pub mod service;

pub use config::{ConfigError, PeriodPolicy, StockroomConfig};
pub use counter_store::{InMemoryCounterStore, PostgresCounterStore, PostgresQuarantine};
pub use document_store::{
    Document, DocumentStore, DocumentStoreError, InMemoryDocumentStore, PostgresDocumentStore,
};
pub use series::{DocumentSeries, SeriesCatalog};
pub use service::{DocumentService, Mutation, ServiceError};
