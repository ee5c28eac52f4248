//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store wiring (counter/document stores, reconciler, SSE channel)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use stockroom_infra::StockroomConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: StockroomConfig) -> Result<Router, sqlx::Error> {
    let services = Arc::new(services::build_services(&config).await?);
    Ok(router(services, middleware::AdminAuth::new(config.admin_token)))
}

/// Router over already-wired services.
pub fn router(services: Arc<services::AppServices>, admin_auth: middleware::AdminAuth) -> Router {
    let admin = routes::admin::router().layer(axum::middleware::from_fn_with_state(
        admin_auth,
        middleware::admin_auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .nest("/admin", admin)
        .layer(Extension(services))
}
