use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use stockroom_core::SequenceKey;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_counters))
        .route("/:key", get(peek_counter))
}

pub async fn list_counters(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.counters.list().await {
        Ok(counters) => Json(counters).into_response(),
        Err(e) => errors::counter_error_to_response(e),
    }
}

/// Current sequence of a key; 0 when nothing was ever issued under it.
pub async fn peek_counter(
    Extension(services): Extension<Arc<AppServices>>,
    Path(key): Path<String>,
) -> axum::response::Response {
    let key: SequenceKey = match key.parse() {
        Ok(k) => k,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_key", e.to_string());
        }
    };

    match services.counters.peek(&key).await {
        Ok(seq) => Json(dto::CounterResponse { key, seq }).into_response(),
        Err(e) => errors::counter_error_to_response(e),
    }
}
