use serde::{Deserialize, Serialize};
use stockroom_core::SequenceKey;

#[derive(Debug, Default, Deserialize)]
pub struct CreateDocumentParams {
    /// Number the document in this period instead of the current one.
    pub period: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileRequest {
    pub period: Option<String>,
    /// Explicit `collection:field:prefix` bindings; the configured series are
    /// used when empty.
    #[serde(default)]
    pub bindings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CounterResponse {
    pub key: SequenceKey,
    pub seq: u64,
}
