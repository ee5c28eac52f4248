//! Document numbering: counter store boundary, allocator and reconciliation.
//!
//! - [`store`]: the `CounterStore` trait (sole owner of sequence state)
//! - [`allocator`]: `NumberAllocator`, issuing formatted document numbers
//! - [`quarantine`]: keys blocked after a duplicate number was detected
//! - [`reconcile`]: operator-run scan that raises counters to the numbers in use

pub mod allocator;
pub mod quarantine;
pub mod reconcile;
pub mod store;

pub use allocator::{AllocationError, NumberAllocator};
pub use quarantine::{InMemoryQuarantine, KeyQuarantine, QuarantineEntry, QuarantineStore};
pub use reconcile::{
    BindingOutcome, BindingReport, CollectionBinding, DocumentScan, ReconcileWarning,
    ReconciliationReport, Reconciler, ScanError, ScannedNumber,
};
pub use store::{Counter, CounterStore, CounterStoreError, InMemoryCounterStore};
