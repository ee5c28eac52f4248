//! Entity types that can be mutated through the document API.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A mutable business entity type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Product,
    Customer,
    Supplier,
    CustomerOrder,
    CustomerInvoice,
    Shipment,
    Payment,
    PurchaseOrder,
    Receipt,
    SupplierInvoice,
    InventoryTransfer,
}

impl EntityKind {
    /// Every entity kind, in declaration order.
    pub const ALL: [EntityKind; 11] = [
        EntityKind::Product,
        EntityKind::Customer,
        EntityKind::Supplier,
        EntityKind::CustomerOrder,
        EntityKind::CustomerInvoice,
        EntityKind::Shipment,
        EntityKind::Payment,
        EntityKind::PurchaseOrder,
        EntityKind::Receipt,
        EntityKind::SupplierInvoice,
        EntityKind::InventoryTransfer,
    ];

    /// Singular name, also used as the item-key prefix (`customer-order:<id>`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Customer => "customer",
            EntityKind::Supplier => "supplier",
            EntityKind::CustomerOrder => "customer-order",
            EntityKind::CustomerInvoice => "customer-invoice",
            EntityKind::Shipment => "shipment",
            EntityKind::Payment => "payment",
            EntityKind::PurchaseOrder => "purchase-order",
            EntityKind::Receipt => "receipt",
            EntityKind::SupplierInvoice => "supplier-invoice",
            EntityKind::InventoryTransfer => "inventory-transfer",
        }
    }

    /// Collection name; doubles as the list-query cache key (`customer-orders`).
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Product => "products",
            EntityKind::Customer => "customers",
            EntityKind::Supplier => "suppliers",
            EntityKind::CustomerOrder => "customer-orders",
            EntityKind::CustomerInvoice => "customer-invoices",
            EntityKind::Shipment => "shipments",
            EntityKind::Payment => "payments",
            EntityKind::PurchaseOrder => "purchase-orders",
            EntityKind::Receipt => "receipts",
            EntityKind::SupplierInvoice => "supplier-invoices",
            EntityKind::InventoryTransfer => "inventory-transfers",
        }
    }

    /// Resolve an entity kind from its collection name.
    pub fn from_collection(collection: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.collection() == collection)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown entity type `{0}`")]
pub struct UnknownEntity(pub String);

impl FromStr for EntityKind {
    type Err = UnknownEntity;

    /// Accepts the singular name (`customer-order`) or the collection name
    /// (`customer-orders`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .or_else(|| Self::from_collection(s))
            .ok_or_else(|| UnknownEntity(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>(), Ok(kind));
            assert_eq!(kind.collection().parse::<EntityKind>(), Ok(kind));
        }
    }

    #[test]
    fn names_and_collections_are_unique() {
        let names: HashSet<_> = EntityKind::ALL.iter().map(|k| k.as_str()).collect();
        let collections: HashSet<_> = EntityKind::ALL.iter().map(|k| k.collection()).collect();
        assert_eq!(names.len(), EntityKind::ALL.len());
        assert_eq!(collections.len(), EntityKind::ALL.len());
        assert!(names.is_disjoint(&collections));
    }

    #[test]
    fn serde_uses_kebab_case_names() {
        for kind in EntityKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(
            "warehouse".parse::<EntityKind>(),
            Err(UnknownEntity("warehouse".to_string()))
        );
    }
}
