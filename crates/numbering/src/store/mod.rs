//! Counter store boundary.
//!
//! The counter store is the **sole owner** of sequence state: a durable mapping
//! from [`SequenceKey`] to the last issued integer. Implementations must provide
//! the three operations below as single atomic primitives of the backing store
//! (atomic increment-and-fetch, atomic max). Read-then-write sequences in
//! application code are not acceptable: they lose updates under concurrency.

pub mod in_memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use stockroom_core::SequenceKey;
use thiserror::Error;

pub use in_memory::InMemoryCounterStore;

/// Persisted counter row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Counter {
    pub key: SequenceKey,
    pub seq: u64,
}

/// Counter store operation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CounterStoreError {
    /// The backing store cannot be reached. Callers must not fabricate a number.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// The counter cannot be incremented any further.
    #[error("counter `{0}` is exhausted")]
    Exhausted(SequenceKey),

    /// The store refused to allocate because the key is quarantined.
    #[error("counter `{0}` is quarantined")]
    Quarantined(SequenceKey),

    #[error("counter storage error: {0}")]
    Storage(String),
}

impl CounterStoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CounterStoreError::Unavailable(_))
    }
}

/// Durable `key -> seq` mapping with atomic allocation.
///
/// `seq` is monotonically non-decreasing for the lifetime of a key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current `seq` for `key`, or 0 if nothing was ever allocated. No side effects.
    async fn peek(&self, key: &SequenceKey) -> Result<u64, CounterStoreError>;

    /// Atomically increment and return the new `seq` (1 for a fresh key).
    ///
    /// Concurrent callers targeting the same key never receive the same value.
    async fn allocate_next(&self, key: &SequenceKey) -> Result<u64, CounterStoreError>;

    /// Atomically set `seq = max(seq, candidate)` and return the resulting `seq`.
    async fn raise_floor(&self, key: &SequenceKey, candidate: u64)
    -> Result<u64, CounterStoreError>;

    /// All counters, ordered by key.
    async fn list(&self) -> Result<Vec<Counter>, CounterStoreError>;
}

#[async_trait]
impl<S> CounterStore for Arc<S>
where
    S: CounterStore + ?Sized,
{
    async fn peek(&self, key: &SequenceKey) -> Result<u64, CounterStoreError> {
        (**self).peek(key).await
    }

    async fn allocate_next(&self, key: &SequenceKey) -> Result<u64, CounterStoreError> {
        (**self).allocate_next(key).await
    }

    async fn raise_floor(
        &self,
        key: &SequenceKey,
        candidate: u64,
    ) -> Result<u64, CounterStoreError> {
        (**self).raise_floor(key, candidate).await
    }

    async fn list(&self) -> Result<Vec<Counter>, CounterStoreError> {
        (**self).list().await
    }
}
