use axum::{routing::get, Router};

pub mod admin;
pub mod counters;
pub mod documents;
pub mod system;

/// Router for the document, counter and stream endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/stream", get(system::stream))
        .nest("/documents", documents::router())
        .nest("/counters", counters::router())
}
