//! Static entity -> dependent-keys table.
//!
//! The table is hand-authored: each row lists the cached reads, other than the
//! entity's own collection and item keys, whose results change when that
//! entity is mutated. There is no transitive closure. When a mutation starts
//! touching another aggregate (e.g. reserving stock on an order changes
//! product availability), add the edge here.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use stockroom_core::DocumentId;

use crate::entity::{EntityKind, UnknownEntity};
use crate::key::QueryKey;

/// Report key for the reporting dashboard (sales, payables, receivables totals).
pub const DASHBOARD: &str = "dashboard";

/// One dependent cache key in the static table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Dependent {
    Collection(EntityKind),
    Report(&'static str),
}

impl From<Dependent> for QueryKey {
    fn from(value: Dependent) -> Self {
        match value {
            Dependent::Collection(kind) => QueryKey::Collection(kind),
            Dependent::Report(name) => QueryKey::Report(name),
        }
    }
}

use Dependent::{Collection, Report};
use EntityKind::*;

/// Entity -> dependents. Every [`EntityKind`] has exactly one row.
pub static EDGES: &[(EntityKind, &[Dependent])] = &[
    (Product, &[]),
    (
        Customer,
        &[Collection(CustomerOrder), Collection(CustomerInvoice)],
    ),
    (
        Supplier,
        &[Collection(PurchaseOrder), Collection(SupplierInvoice)],
    ),
    // Confirming/reserving an order changes product availability.
    (
        CustomerOrder,
        &[
            Collection(CustomerInvoice),
            Collection(Shipment),
            Collection(Product),
        ],
    ),
    (
        CustomerInvoice,
        &[
            Collection(CustomerOrder),
            Collection(Payment),
            Report(DASHBOARD),
        ],
    ),
    // Shipping consumes stock and advances the order's fulfilment state.
    (Shipment, &[Collection(CustomerOrder), Collection(Product)]),
    (
        Payment,
        &[
            Collection(CustomerInvoice),
            Collection(SupplierInvoice),
            Report(DASHBOARD),
        ],
    ),
    // Open purchase orders feed the on-order quantity of products.
    (PurchaseOrder, &[Collection(Receipt), Collection(Product)]),
    (Receipt, &[Collection(Product), Collection(PurchaseOrder)]),
    (
        SupplierInvoice,
        &[
            Collection(PurchaseOrder),
            Collection(Payment),
            Report(DASHBOARD),
        ],
    ),
    (InventoryTransfer, &[Collection(Product)]),
];

static STANDARD: LazyLock<InvalidationGraph> =
    LazyLock::new(|| InvalidationGraph::from_table(EDGES));

/// Read-only lookup built once from a static table.
#[derive(Debug, Clone, Default)]
pub struct InvalidationGraph {
    edges: HashMap<EntityKind, BTreeSet<QueryKey>>,
}

impl InvalidationGraph {
    /// The process-wide graph built from [`EDGES`].
    pub fn standard() -> &'static InvalidationGraph {
        &STANDARD
    }

    /// Build a graph from a table. Repeated rows for one entity are merged.
    pub fn from_table(table: &[(EntityKind, &[Dependent])]) -> Self {
        let mut edges: HashMap<EntityKind, BTreeSet<QueryKey>> = HashMap::new();
        for (entity, dependents) in table {
            edges
                .entry(*entity)
                .or_default()
                .extend(dependents.iter().copied().map(QueryKey::from));
        }
        Self { edges }
    }

    /// Cached reads that depend on `entity`, excluding its own keys.
    ///
    /// Total over [`EntityKind`]: kinds without a row have no dependents.
    pub fn dependents_of(&self, entity: EntityKind) -> BTreeSet<QueryKey> {
        self.edges.get(&entity).cloned().unwrap_or_default()
    }

    /// Lookup by entity name (`customer-order`) or collection (`customer-orders`).
    pub fn dependents_of_name(&self, entity: &str) -> Result<BTreeSet<QueryKey>, UnknownEntity> {
        let kind: EntityKind = entity.parse()?;
        Ok(self.dependents_of(kind))
    }

    /// Everything to invalidate after `entity` with `id` was mutated: the
    /// entity's collection key, its item key and all of its dependents.
    pub fn invalidation_set(&self, entity: EntityKind, id: DocumentId) -> BTreeSet<QueryKey> {
        let mut keys = self.dependents_of(entity);
        keys.insert(QueryKey::Collection(entity));
        keys.insert(QueryKey::Item(entity, id));
        keys
    }

    /// Whether the graph has an explicit row for `entity`.
    pub fn declares(&self, entity: EntityKind) -> bool {
        self.edges.contains_key(&entity)
    }
}
