use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockroom_infra::{DocumentStoreError, ServiceError};
use stockroom_numbering::{AllocationError, CounterStoreError};

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        ServiceError::Store(e) => store_error_to_response(e),
    }
}

pub fn store_error_to_response(err: DocumentStoreError) -> axum::response::Response {
    match err {
        DocumentStoreError::NotFound { .. } => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        DocumentStoreError::DuplicateNumber { .. } => {
            json_error(StatusCode::CONFLICT, "duplicate_number", err.to_string())
        }
        DocumentStoreError::Allocation(e) => allocation_error_to_response(e),
        DocumentStoreError::Unavailable(msg) => {
            tracing::error!(error = %msg, "document store unavailable");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                "could not create document, try again",
            )
        }
        DocumentStoreError::Storage(msg) => {
            tracing::error!(error = %msg, "document store error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn allocation_error_to_response(err: AllocationError) -> axum::response::Response {
    match err {
        // Never leak a half-made number; the caller just retries.
        AllocationError::StoreUnavailable(_) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "store_unavailable",
            "could not create document, try again",
        ),
        AllocationError::DuplicateNumberDetected { .. } => {
            json_error(StatusCode::CONFLICT, "duplicate_number_detected", err.to_string())
        }
        AllocationError::InvalidSeries(e) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_series", e.to_string())
        }
        AllocationError::Store(e) => counter_error_to_response(e),
    }
}

pub fn counter_error_to_response(err: CounterStoreError) -> axum::response::Response {
    match err {
        CounterStoreError::Unavailable(_) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "store_unavailable",
            "counter store unavailable, try again",
        ),
        CounterStoreError::Exhausted(_) => {
            json_error(StatusCode::CONFLICT, "counter_exhausted", err.to_string())
        }
        CounterStoreError::Quarantined(_) => {
            json_error(StatusCode::CONFLICT, "duplicate_number_detected", err.to_string())
        }
        CounterStoreError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
