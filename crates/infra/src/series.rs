//! Document series: which entities are numbered, and with which prefix.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;
use stockroom_core::{DomainError, DomainResult, NumberFormat, SequenceKey};
use stockroom_invalidation::EntityKind;
use stockroom_numbering::CollectionBinding;

/// Default document attribute holding the formatted number.
pub const DEFAULT_NUMBER_FIELD: &str = "number";

/// A numbered document series, e.g. customer orders as `CO-<period>-<seq>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSeries {
    pub entity: EntityKind,
    pub prefix: String,
    pub number_field: String,
}

impl DocumentSeries {
    pub fn new(entity: EntityKind, prefix: impl Into<String>) -> Self {
        Self {
            entity,
            prefix: prefix.into(),
            number_field: DEFAULT_NUMBER_FIELD.to_string(),
        }
    }

    pub fn collection(&self) -> &'static str {
        self.entity.collection()
    }

    /// Counter key of this series for `period`.
    pub fn key(&self, format: &NumberFormat, period: &str) -> DomainResult<SequenceKey> {
        format.key(&self.prefix, period)
    }

    /// Reconciliation binding of this series for `period`.
    pub fn binding(&self, format: &NumberFormat, period: &str) -> DomainResult<CollectionBinding> {
        Ok(CollectionBinding::new(
            self.collection(),
            self.number_field.clone(),
            self.key(format, period)?,
        ))
    }
}

/// Entity -> series table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesCatalog {
    series: BTreeMap<EntityKind, DocumentSeries>,
}

impl SeriesCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The series used by the ERP out of the box.
    pub fn standard() -> Self {
        [
            (EntityKind::CustomerOrder, "CO"),
            (EntityKind::CustomerInvoice, "INV"),
            (EntityKind::Shipment, "SHP"),
            (EntityKind::Payment, "PAY"),
            (EntityKind::PurchaseOrder, "PO"),
            (EntityKind::Receipt, "RCV"),
            (EntityKind::SupplierInvoice, "SINV"),
            (EntityKind::InventoryTransfer, "TRF"),
        ]
        .into_iter()
        .fold(Self::empty(), |catalog, (entity, prefix)| {
            catalog.with(DocumentSeries::new(entity, prefix))
        })
    }

    /// Add or replace the series of `series.entity`.
    pub fn with(mut self, series: DocumentSeries) -> Self {
        self.series.insert(series.entity, series);
        self
    }

    pub fn get(&self, entity: EntityKind) -> Option<&DocumentSeries> {
        self.series.get(&entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentSeries> {
        self.series.values()
    }

    /// Reject configurations where two entities would share a counter.
    pub fn validate(&self, format: &NumberFormat) -> DomainResult<()> {
        let mut seen: BTreeMap<&str, EntityKind> = BTreeMap::new();
        for s in self.iter() {
            // Probe with a fixed period so prefix syntax is checked too.
            s.key(format, "0")?;
            if let Some(other) = seen.insert(s.prefix.as_str(), s.entity) {
                return Err(DomainError::validation(format!(
                    "prefix `{}` used by both {other} and {}",
                    s.prefix, s.entity
                )));
            }
        }
        Ok(())
    }

    /// One reconciliation binding per series for `period`.
    pub fn bindings_for_period(
        &self,
        format: &NumberFormat,
        period: &str,
    ) -> DomainResult<Vec<CollectionBinding>> {
        self.iter().map(|s| s.binding(format, period)).collect()
    }

    /// Apply overrides in `entity=PREFIX` form, comma separated
    /// (`customer-order=SO,receipt=GRN`).
    pub fn apply_overrides(mut self, spec: &str) -> DomainResult<Self> {
        for item in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (entity, prefix) = item.split_once('=').ok_or_else(|| {
                DomainError::validation(format!("series override `{item}` must be entity=PREFIX"))
            })?;
            let entity = EntityKind::from_str(entity.trim())
                .map_err(|e| DomainError::validation(e.to_string()))?;
            let prefix = prefix.trim();
            if prefix.is_empty() {
                self.series.remove(&entity);
            } else {
                let number_field = self
                    .get(entity)
                    .map(|s| s.number_field.clone())
                    .unwrap_or_else(|| DEFAULT_NUMBER_FIELD.to_string());
                self.series.insert(
                    entity,
                    DocumentSeries {
                        entity,
                        prefix: prefix.to_string(),
                        number_field,
                    },
                );
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_is_valid() {
        let catalog = SeriesCatalog::standard();
        catalog.validate(&NumberFormat::default()).unwrap();
        assert_eq!(catalog.get(EntityKind::CustomerOrder).unwrap().prefix, "CO");
        assert!(catalog.get(EntityKind::Product).is_none());
    }

    #[test]
    fn bindings_follow_series_and_period() {
        let bindings = SeriesCatalog::standard()
            .bindings_for_period(&NumberFormat::default(), "2026")
            .unwrap();
        let co = bindings
            .iter()
            .find(|b| b.collection == "customer-orders")
            .unwrap();
        assert_eq!(co.prefix.as_str(), "CO-2026");
        assert_eq!(co.number_field, "number");
        assert_eq!(bindings.len(), 8);
    }

    #[test]
    fn overrides_replace_and_remove_series() {
        let catalog = SeriesCatalog::standard()
            .apply_overrides("customer-order=SO, receipt=GRN ,payment=")
            .unwrap();
        assert_eq!(catalog.get(EntityKind::CustomerOrder).unwrap().prefix, "SO");
        assert_eq!(catalog.get(EntityKind::Receipt).unwrap().prefix, "GRN");
        assert!(catalog.get(EntityKind::Payment).is_none());
    }

    #[test]
    fn bad_overrides_are_rejected() {
        assert!(SeriesCatalog::standard().apply_overrides("warehouse=WH").is_err());
        assert!(SeriesCatalog::standard().apply_overrides("customer-order").is_err());
    }

    #[test]
    fn shared_prefixes_are_rejected() {
        let catalog =
            SeriesCatalog::standard().with(DocumentSeries::new(EntityKind::Product, "CO"));
        assert!(catalog.validate(&NumberFormat::default()).is_err());
    }
}
