use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use stockroom_core::SequenceKey;

use super::{Counter, CounterStore, CounterStoreError};

/// In-memory counter store.
///
/// Each key owns an `AtomicU64`; allocation is `fetch_update(checked_add)` and
/// floor raising is `fetch_max`. The map lock only guards key creation, never
/// the counter value itself.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: RwLock<HashMap<SequenceKey, Arc<AtomicU64>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn existing(&self, key: &SequenceKey) -> Result<Option<Arc<AtomicU64>>, CounterStoreError> {
        let counters = self
            .counters
            .read()
            .map_err(|_| CounterStoreError::Storage("lock poisoned".to_string()))?;
        Ok(counters.get(key).cloned())
    }

    fn cell(&self, key: &SequenceKey) -> Result<Arc<AtomicU64>, CounterStoreError> {
        if let Some(cell) = self.existing(key)? {
            return Ok(cell);
        }

        let mut counters = self
            .counters
            .write()
            .map_err(|_| CounterStoreError::Storage("lock poisoned".to_string()))?;
        Ok(counters.entry(key.clone()).or_default().clone())
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn peek(&self, key: &SequenceKey) -> Result<u64, CounterStoreError> {
        Ok(self
            .existing(key)?
            .map(|cell| cell.load(Ordering::SeqCst))
            .unwrap_or(0))
    }

    async fn allocate_next(&self, key: &SequenceKey) -> Result<u64, CounterStoreError> {
        let cell = self.cell(key)?;
        let previous = cell
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |seq| seq.checked_add(1))
            .map_err(|_| CounterStoreError::Exhausted(key.clone()))?;
        Ok(previous + 1)
    }

    async fn raise_floor(
        &self,
        key: &SequenceKey,
        candidate: u64,
    ) -> Result<u64, CounterStoreError> {
        let cell = self.cell(key)?;
        let previous = cell.fetch_max(candidate, Ordering::SeqCst);
        Ok(previous.max(candidate))
    }

    async fn list(&self) -> Result<Vec<Counter>, CounterStoreError> {
        let counters = self
            .counters
            .read()
            .map_err(|_| CounterStoreError::Storage("lock poisoned".to_string()))?;

        let mut rows: Vec<Counter> = counters
            .iter()
            .map(|(key, cell)| Counter {
                key: key.clone(),
                seq: cell.load(Ordering::SeqCst),
            })
            .collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
    }
}
