//! Counter reconciliation.
//!
//! Operator-run maintenance pass that repairs counter drift after manual
//! imports or partial failures. For every binding it reads the numbers in use,
//! takes the greatest trailing sequence and raises the counter to at least
//! that value. Counters are never lowered, no lock is taken on the business
//! collections, and a second run with no new documents is a no-op.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stockroom_core::{DomainError, MalformedNumber, NumberFormat, SequenceKey};
use thiserror::Error;
use tracing::instrument;

use crate::quarantine::KeyQuarantine;
use crate::store::CounterStore;

/// Which documents carry numbers for which counter key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionBinding {
    pub collection: String,
    pub number_field: String,
    /// Counter key, e.g. `CO-2026`; matched documents start with `CO-2026-`.
    pub prefix: SequenceKey,
}

impl CollectionBinding {
    pub fn new(
        collection: impl Into<String>,
        number_field: impl Into<String>,
        prefix: SequenceKey,
    ) -> Self {
        Self {
            collection: collection.into(),
            number_field: number_field.into(),
            prefix,
        }
    }
}

impl FromStr for CollectionBinding {
    type Err = DomainError;

    /// `collection:field:prefix`, e.g. `customer-orders:number:CO-2026`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(collection), Some(field), Some(prefix))
                if !collection.is_empty() && !field.is_empty() =>
            {
                Ok(Self::new(collection, field, prefix.parse()?))
            }
            _ => Err(DomainError::validation(format!(
                "binding `{s}` must look like collection:field:prefix"
            ))),
        }
    }
}

impl fmt::Display for CollectionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.collection, self.number_field, self.prefix)
    }
}

/// A number read from a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedNumber {
    pub document_id: String,
    pub number: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("scan failed: {0}")]
    Storage(String),
}

/// Read access to the number field of stored documents.
///
/// Implementations must not lock the scanned collection; concurrent writes
/// are tolerated (the result is a best-effort floor).
#[async_trait]
pub trait DocumentScan: Send + Sync {
    /// Numbers held in `number_field` of documents in `collection` whose
    /// number starts with `starts_with`.
    async fn scan_numbers(
        &self,
        collection: &str,
        number_field: &str,
        starts_with: &str,
    ) -> Result<Vec<ScannedNumber>, ScanError>;
}

#[async_trait]
impl<S> DocumentScan for Arc<S>
where
    S: DocumentScan + ?Sized,
{
    async fn scan_numbers(
        &self,
        collection: &str,
        number_field: &str,
        starts_with: &str,
    ) -> Result<Vec<ScannedNumber>, ScanError> {
        (**self).scan_numbers(collection, number_field, starts_with).await
    }
}

/// Non-fatal finding recorded during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileWarning {
    /// The stored number does not parse as `prefix-period-integer`; skipped.
    MalformedExistingNumber {
        document_id: String,
        reason: MalformedNumber,
    },
    /// Several documents carry the same sequence; the key was quarantined.
    DuplicateNumberDetected {
        seq: u64,
        numbers: Vec<String>,
        document_ids: Vec<String>,
    },
}

impl fmt::Display for ReconcileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileWarning::MalformedExistingNumber {
                document_id,
                reason,
            } => write!(f, "skipped document {document_id}: {reason}"),
            ReconcileWarning::DuplicateNumberDetected {
                seq,
                numbers,
                document_ids,
            } => write!(
                f,
                "sequence {seq} used by {} documents ({}: {}); key quarantined",
                document_ids.len(),
                numbers.join(", "),
                document_ids.join(", ")
            ),
        }
    }
}

/// What happened to one binding's counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BindingOutcome {
    /// The counter was behind the documents and has been raised.
    Raised {
        previous: u64,
        current: u64,
        observed_max: u64,
    },
    /// The counter already covered every number in use.
    Unchanged { current: u64, observed_max: u64 },
    /// No document matched the prefix; counter untouched.
    NoDocuments,
    /// Documents matched but none parsed; counter untouched.
    NoParsableNumbers,
    /// The scan or the counter update failed; counter state unknown.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingReport {
    pub binding: CollectionBinding,
    pub scanned: usize,
    pub outcome: BindingOutcome,
    pub warnings: Vec<ReconcileWarning>,
}

impl fmt::Display for BindingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.binding;
        write!(f, "{} ({}.{}): ", b.prefix, b.collection, b.number_field)?;
        match &self.outcome {
            BindingOutcome::Raised {
                previous,
                current,
                observed_max,
            } => write!(
                f,
                "raised {previous} -> {current} (max in use {observed_max}, {} scanned)",
                self.scanned
            )?,
            BindingOutcome::Unchanged {
                current,
                observed_max,
            } => write!(
                f,
                "unchanged at {current} (max in use {observed_max}, {} scanned)",
                self.scanned
            )?,
            BindingOutcome::NoDocuments => f.write_str("no documents found")?,
            BindingOutcome::NoParsableNumbers => write!(
                f,
                "no parsable numbers among {} documents; counter untouched",
                self.scanned
            )?,
            BindingOutcome::Failed { error } => write!(f, "FAILED: {error}")?,
        }
        for w in &self.warnings {
            write!(f, "\n  warning: {w}")?;
        }
        Ok(())
    }
}

/// Result of a reconciliation run, one entry per binding in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub bindings: Vec<BindingReport>,
}

impl ReconciliationReport {
    pub fn warning_count(&self) -> usize {
        self.bindings.iter().map(|b| b.warnings.len()).sum()
    }

    pub fn raised_count(&self) -> usize {
        self.bindings
            .iter()
            .filter(|b| matches!(b.outcome, BindingOutcome::Raised { .. }))
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.bindings
            .iter()
            .any(|b| matches!(b.outcome, BindingOutcome::Failed { .. }))
    }

    pub fn has_duplicates(&self) -> bool {
        self.bindings.iter().any(|b| {
            b.warnings
                .iter()
                .any(|w| matches!(w, ReconcileWarning::DuplicateNumberDetected { .. }))
        })
    }
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "reconciliation {} .. {}",
            self.started_at.to_rfc3339(),
            self.finished_at.to_rfc3339()
        )?;
        for b in &self.bindings {
            writeln!(f, "{b}")?;
        }
        write!(
            f,
            "{} binding(s), {} raised, {} warning(s)",
            self.bindings.len(),
            self.raised_count(),
            self.warning_count()
        )
    }
}

/// Scans documents and raises counters to the numbers actually in use.
#[derive(Debug, Clone)]
pub struct Reconciler<C, D> {
    counters: C,
    documents: D,
    format: NumberFormat,
    quarantine: KeyQuarantine,
}

impl<C, D> Reconciler<C, D>
where
    C: CounterStore,
    D: DocumentScan,
{
    pub fn new(counters: C, documents: D, format: NumberFormat, quarantine: KeyQuarantine) -> Self {
        Self {
            counters,
            documents,
            format,
            quarantine,
        }
    }

    /// Reconcile every binding. Failures and warnings are collected per
    /// binding; the run never stops early.
    #[instrument(skip(self, bindings), fields(bindings = bindings.len()))]
    pub async fn reconcile(&self, bindings: &[CollectionBinding]) -> ReconciliationReport {
        let started_at = Utc::now();
        let mut reports = Vec::with_capacity(bindings.len());
        for binding in bindings {
            reports.push(self.reconcile_binding(binding).await);
        }

        let report = ReconciliationReport {
            started_at,
            finished_at: Utc::now(),
            bindings: reports,
        };
        tracing::info!(
            raised = report.raised_count(),
            warnings = report.warning_count(),
            failed = report.has_failures(),
            "reconciliation finished"
        );
        report
    }

    #[instrument(skip(self), fields(binding = %binding))]
    async fn reconcile_binding(&self, binding: &CollectionBinding) -> BindingReport {
        let starts_with = self.format.number_prefix(&binding.prefix);
        let scanned = match self
            .documents
            .scan_numbers(&binding.collection, &binding.number_field, &starts_with)
            .await
        {
            Ok(scanned) => scanned,
            Err(e) => {
                tracing::error!(error = %e, "document scan failed");
                return BindingReport {
                    binding: binding.clone(),
                    scanned: 0,
                    outcome: BindingOutcome::Failed {
                        error: e.to_string(),
                    },
                    warnings: Vec::new(),
                };
            }
        };

        let mut warnings = Vec::new();
        let mut by_seq: BTreeMap<u64, Vec<&ScannedNumber>> = BTreeMap::new();
        for doc in &scanned {
            match self.format.parse_seq(&binding.prefix, &doc.number) {
                Ok(seq) => by_seq.entry(seq).or_default().push(doc),
                Err(reason) => {
                    tracing::warn!(
                        document_id = %doc.document_id,
                        number = %doc.number,
                        "skipping malformed document number"
                    );
                    warnings.push(ReconcileWarning::MalformedExistingNumber {
                        document_id: doc.document_id.clone(),
                        reason,
                    });
                }
            }
        }

        for (seq, docs) in by_seq.iter().filter(|(_, docs)| docs.len() > 1) {
            let numbers: Vec<String> = docs.iter().map(|d| d.number.clone()).collect();
            let reason = format!("sequence {seq} found on {} documents", docs.len());
            if let Err(e) = self.quarantine.block(&binding.prefix, reason).await {
                tracing::error!(error = %e, "failed to quarantine key");
            }
            warnings.push(ReconcileWarning::DuplicateNumberDetected {
                seq: *seq,
                numbers,
                document_ids: docs.iter().map(|d| d.document_id.clone()).collect(),
            });
        }

        let outcome = match by_seq.last_key_value() {
            None if scanned.is_empty() => {
                tracing::info!("no documents found");
                BindingOutcome::NoDocuments
            }
            None => BindingOutcome::NoParsableNumbers,
            Some((&observed_max, _)) => self.raise(&binding.prefix, observed_max).await,
        };

        BindingReport {
            binding: binding.clone(),
            scanned: scanned.len(),
            outcome,
            warnings,
        }
    }

    async fn raise(&self, key: &SequenceKey, observed_max: u64) -> BindingOutcome {
        // `previous` is only used for reporting; the update itself is atomic.
        let previous = match self.counters.peek(key).await {
            Ok(seq) => seq,
            Err(e) => {
                return BindingOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };
        match self.counters.raise_floor(key, observed_max).await {
            Ok(current) if previous < observed_max && current == observed_max => {
                tracing::info!(previous, current, "counter raised");
                BindingOutcome::Raised {
                    previous,
                    current,
                    observed_max,
                }
            }
            Ok(current) => BindingOutcome::Unchanged {
                current,
                observed_max,
            },
            Err(e) => {
                tracing::error!(error = %e, "counter update failed");
                BindingOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
