//! Cache keys understood by the client data layer.

use core::fmt;

use serde::{Serialize, Serializer};
use stockroom_core::DocumentId;

use crate::entity::EntityKind;

/// A cached read that can be invalidated.
///
/// Renders as the string key the client caches under: `customer-orders`,
/// `customer-order:<id>`, or a report name such as `dashboard`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryKey {
    /// List query over an entity's collection.
    Collection(EntityKind),
    /// Single-document query.
    Item(EntityKind, DocumentId),
    /// Aggregated report/dashboard query.
    Report(&'static str),
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Collection(kind) => f.write_str(kind.collection()),
            QueryKey::Item(kind, id) => write!(f, "{}:{}", kind.as_str(), id),
            QueryKey::Report(name) => f.write_str(name),
        }
    }
}

impl Serialize for QueryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_as_client_cache_keys() {
        let id = DocumentId::new();
        assert_eq!(
            QueryKey::Collection(EntityKind::CustomerOrder).to_string(),
            "customer-orders"
        );
        assert_eq!(
            QueryKey::Item(EntityKind::CustomerOrder, id).to_string(),
            format!("customer-order:{id}")
        );
        assert_eq!(QueryKey::Report("dashboard").to_string(), "dashboard");
    }

    #[test]
    fn keys_serialize_as_strings() {
        let json = serde_json::to_string(&QueryKey::Collection(EntityKind::Receipt)).unwrap();
        assert_eq!(json, "\"receipts\"");
    }
}
