//! Keys blocked from further allocation.
//!
//! A duplicate document number means the counter store's atomicity guarantee
//! was violated for that key (e.g. two stores diverged). Allocation against
//! the key stops until an operator releases it.
//!
//! The block has to outlive the process that detected the duplicate and be
//! seen by every process allocating from the same counters, so it lives in a
//! [`QuarantineStore`] next to the counter store. [`InMemoryQuarantine`] pairs
//! with the in-memory counter store.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use stockroom_core::SequenceKey;

use crate::store::CounterStoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantineEntry {
    pub key: SequenceKey,
    pub reason: String,
    pub since: DateTime<Utc>,
}

/// Durable set of quarantined keys, shared by everything that allocates from
/// one counter store.
#[async_trait]
pub trait QuarantineStore: Send + Sync {
    /// Block `key`. Returns `false` if it was already blocked (first reason wins).
    async fn block(&self, key: &SequenceKey, reason: &str) -> Result<bool, CounterStoreError>;

    /// Remove the block on `key`, returning the removed entry.
    async fn release(&self, key: &SequenceKey)
    -> Result<Option<QuarantineEntry>, CounterStoreError>;

    async fn get(&self, key: &SequenceKey) -> Result<Option<QuarantineEntry>, CounterStoreError>;

    /// All blocked keys, ordered by key.
    async fn list(&self) -> Result<Vec<QuarantineEntry>, CounterStoreError>;
}

#[async_trait]
impl<S> QuarantineStore for Arc<S>
where
    S: QuarantineStore + ?Sized,
{
    async fn block(&self, key: &SequenceKey, reason: &str) -> Result<bool, CounterStoreError> {
        (**self).block(key, reason).await
    }

    async fn release(
        &self,
        key: &SequenceKey,
    ) -> Result<Option<QuarantineEntry>, CounterStoreError> {
        (**self).release(key).await
    }

    async fn get(&self, key: &SequenceKey) -> Result<Option<QuarantineEntry>, CounterStoreError> {
        (**self).get(key).await
    }

    async fn list(&self) -> Result<Vec<QuarantineEntry>, CounterStoreError> {
        (**self).list().await
    }
}

/// Process-local quarantine for the in-memory counter store.
#[derive(Debug, Default)]
pub struct InMemoryQuarantine {
    entries: RwLock<BTreeMap<SequenceKey, QuarantineEntry>>,
}

impl InMemoryQuarantine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuarantineStore for InMemoryQuarantine {
    async fn block(&self, key: &SequenceKey, reason: &str) -> Result<bool, CounterStoreError> {
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(
            key.clone(),
            QuarantineEntry {
                key: key.clone(),
                reason: reason.to_string(),
                since: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn release(
        &self,
        key: &SequenceKey,
    ) -> Result<Option<QuarantineEntry>, CounterStoreError> {
        Ok(self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key))
    }

    async fn get(&self, key: &SequenceKey) -> Result<Option<QuarantineEntry>, CounterStoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<QuarantineEntry>, CounterStoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect())
    }
}

/// Handle on a quarantine store. Cloning shares the same store.
#[derive(Clone)]
pub struct KeyQuarantine {
    store: Arc<dyn QuarantineStore>,
}

impl Default for KeyQuarantine {
    fn default() -> Self {
        Self::with_store(InMemoryQuarantine::new())
    }
}

impl std::fmt::Debug for KeyQuarantine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyQuarantine").finish_non_exhaustive()
    }
}

impl KeyQuarantine {
    /// Process-local quarantine.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: impl QuarantineStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub async fn block(
        &self,
        key: &SequenceKey,
        reason: impl Into<String>,
    ) -> Result<bool, CounterStoreError> {
        let reason = reason.into();
        let blocked = self.store.block(key, &reason).await?;
        if blocked {
            tracing::error!(key = %key, reason = %reason, "sequence key quarantined");
        }
        Ok(blocked)
    }

    /// Operator release. Returns the removed entry, if any.
    pub async fn release(
        &self,
        key: &SequenceKey,
    ) -> Result<Option<QuarantineEntry>, CounterStoreError> {
        let released = self.store.release(key).await?;
        if released.is_some() {
            tracing::info!(key = %key, "sequence key released from quarantine");
        }
        Ok(released)
    }

    pub async fn get(
        &self,
        key: &SequenceKey,
    ) -> Result<Option<QuarantineEntry>, CounterStoreError> {
        self.store.get(key).await
    }

    pub async fn is_blocked(&self, key: &SequenceKey) -> Result<bool, CounterStoreError> {
        Ok(self.get(key).await?.is_some())
    }

    pub async fn list(&self) -> Result<Vec<QuarantineEntry>, CounterStoreError> {
        self.store.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> SequenceKey {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn block_release_cycle() {
        let q = KeyQuarantine::new();
        let key = key("CO-2026");

        assert!(!q.is_blocked(&key).await.unwrap());
        assert!(q.block(&key, "CO-2026-4 stored twice").await.unwrap());
        assert!(!q.block(&key, "second report").await.unwrap());
        assert!(q.is_blocked(&key).await.unwrap());
        assert_eq!(
            q.get(&key).await.unwrap().unwrap().reason,
            "CO-2026-4 stored twice"
        );

        let released = q.release(&key).await.unwrap().unwrap();
        assert_eq!(released.key, key);
        assert!(!q.is_blocked(&key).await.unwrap());
        assert!(q.release(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let q = KeyQuarantine::new();
        let other = q.clone();
        q.block(&key("PO-2026"), "dup").await.unwrap();
        assert_eq!(other.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn handles_over_one_store_see_each_others_blocks() {
        let shared = Arc::new(InMemoryQuarantine::new());
        let detector = KeyQuarantine::with_store(shared.clone());
        let allocator_side = KeyQuarantine::with_store(shared);

        detector.block(&key("SHP-2026"), "dup").await.unwrap();
        assert!(allocator_side.is_blocked(&key("SHP-2026")).await.unwrap());

        allocator_side.release(&key("SHP-2026")).await.unwrap();
        assert!(detector.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn separate_stores_are_independent() {
        let a = KeyQuarantine::new();
        let b = KeyQuarantine::new();
        a.block(&key("CO-2026"), "dup").await.unwrap();
        assert!(!b.is_blocked(&key("CO-2026")).await.unwrap());
    }
}
