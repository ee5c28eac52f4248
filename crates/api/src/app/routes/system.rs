use std::convert::Infallible;
use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::sse::Event as SseEvent};
use tokio_stream::Stream;

use crate::app::services::{self, AppServices};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Invalidation feed: one `cache.invalidate` event per committed mutation.
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    services::invalidation_sse_stream(services)
}
