//! Number allocation: `(prefix, period) -> next formatted document number`.
//!
//! Allocation is a single atomic increment in the counter store. Nothing
//! orders the allocation against the success of the document write that
//! follows it: a failure in between leaves a permanent gap, which is
//! acceptable. A document persisted without a number, or two documents
//! sharing one, is not.

use stockroom_core::{DocumentNumber, DomainError, NumberFormat, SequenceKey};
use thiserror::Error;
use tracing::instrument;

use crate::quarantine::KeyQuarantine;
use crate::store::{CounterStore, CounterStoreError};

/// Allocation failure. None of these ever carries a usable number.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// The counter store cannot be reached; document creation must fail.
    #[error("counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// A duplicate number was seen under this key; allocation is halted until
    /// an operator releases the key.
    #[error("duplicate document number detected under `{key}`; allocation halted")]
    DuplicateNumberDetected { key: SequenceKey },

    /// Prefix/period do not form a valid sequence key.
    #[error("invalid document series: {0}")]
    InvalidSeries(#[from] DomainError),

    #[error("counter store error: {0}")]
    Store(CounterStoreError),
}

impl From<CounterStoreError> for AllocationError {
    fn from(value: CounterStoreError) -> Self {
        match value {
            CounterStoreError::Unavailable(msg) => AllocationError::StoreUnavailable(msg),
            CounterStoreError::Quarantined(key) => AllocationError::DuplicateNumberDetected { key },
            other => AllocationError::Store(other),
        }
    }
}

/// Issues strictly increasing document numbers per `(prefix, period)`.
#[derive(Debug, Clone)]
pub struct NumberAllocator<C> {
    store: C,
    format: NumberFormat,
    quarantine: KeyQuarantine,
}

impl<C> NumberAllocator<C> {
    pub fn new(store: C, format: NumberFormat) -> Self {
        Self::with_quarantine(store, format, KeyQuarantine::new())
    }

    /// Share a quarantine set with other allocators/reconcilers of the same store.
    pub fn with_quarantine(store: C, format: NumberFormat, quarantine: KeyQuarantine) -> Self {
        Self {
            store,
            format,
            quarantine,
        }
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    pub fn format(&self) -> &NumberFormat {
        &self.format
    }

    pub fn quarantine(&self) -> &KeyQuarantine {
        &self.quarantine
    }

    pub fn into_store(self) -> C {
        self.store
    }

    /// Record that `number` was found on more than one document.
    pub async fn report_duplicate(&self, number: &str, key: &SequenceKey) {
        let reason = format!("document number `{number}` stored more than once");
        if let Err(e) = self.quarantine.block(key, reason).await {
            tracing::error!(key = %key, error = %e, "failed to quarantine key");
        }
    }
}

impl<C> NumberAllocator<C>
where
    C: CounterStore,
{
    /// Next number for `prefix` in `period`, e.g. `next_number("CO", "2026")`
    /// -> `CO-2026-17`.
    pub async fn next_number(
        &self,
        prefix: &str,
        period: &str,
    ) -> Result<DocumentNumber, AllocationError> {
        let key = self.format.key(prefix, period)?;
        self.next_for_key(&key).await
    }

    /// Next number under an already-built sequence key.
    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn next_for_key(&self, key: &SequenceKey) -> Result<DocumentNumber, AllocationError> {
        if self.quarantine.is_blocked(key).await? {
            tracing::warn!("allocation refused for quarantined key");
            return Err(AllocationError::DuplicateNumberDetected { key: key.clone() });
        }

        let seq = self.store.allocate_next(key).await.inspect_err(|e| match e {
            CounterStoreError::Unavailable(_) => {
                tracing::error!(error = %e, "counter store unreachable; no number issued");
            }
            CounterStoreError::Quarantined(_) => {
                tracing::warn!("counter store refused a quarantined key");
            }
            _ => {}
        })?;

        let number = self.format.render(key, seq);
        tracing::debug!(number = %number, "document number allocated");
        Ok(number)
    }

    /// Current sequence for `key` (0 if never allocated).
    pub async fn peek(&self, key: &SequenceKey) -> Result<u64, AllocationError> {
        Ok(self.store.peek(key).await?)
    }
}
