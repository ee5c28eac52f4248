//! Operator endpoints: counter reconciliation and the duplicate-number
//! quarantine.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};

use stockroom_core::SequenceKey;
use stockroom_numbering::CollectionBinding;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/reconcile", post(reconcile))
        .route("/quarantine", get(list_quarantine))
        .route("/quarantine/:key", delete(release_quarantine))
}

/// POST /admin/reconcile
///
/// Raises counters to the highest number found in the documents. The body is
/// optional; without bindings every configured series is reconciled for the
/// given (or current) period.
pub async fn reconcile(
    Extension(services): Extension<Arc<AppServices>>,
    body: Option<Json<dto::ReconcileRequest>>,
) -> axum::response::Response {
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let bindings = if req.bindings.is_empty() {
        services.documents.bindings(req.period.as_deref())
    } else {
        req.bindings
            .iter()
            .map(|raw| raw.parse::<CollectionBinding>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| stockroom_infra::ServiceError::Validation(e.to_string()))
    };
    let bindings = match bindings {
        Ok(b) => b,
        Err(e) => return errors::service_error_to_response(e),
    };

    let report = services.reconciler.reconcile(&bindings).await;
    if report.has_duplicates() {
        tracing::error!("reconciliation found duplicate document numbers");
    }
    Json(report).into_response()
}

pub async fn list_quarantine(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.quarantine.list().await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => errors::counter_error_to_response(e),
    }
}

/// DELETE /admin/quarantine/:key
///
/// Re-enables allocation for a key once the duplicate has been resolved.
pub async fn release_quarantine(
    Extension(services): Extension<Arc<AppServices>>,
    Path(key): Path<String>,
) -> axum::response::Response {
    let key: SequenceKey = match key.parse() {
        Ok(k) => k,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_key", e.to_string());
        }
    };

    match services.quarantine.release(&key).await {
        Ok(Some(entry)) => {
            tracing::info!(key = %key, "quarantine released by operator");
            Json(entry).into_response()
        }
        Err(e) => errors::counter_error_to_response(e),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("key `{key}` is not quarantined"),
        ),
    }
}
