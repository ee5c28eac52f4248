use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use stockroom_core::DocumentId;
use stockroom_invalidation::EntityKind;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/:entity", post(create_document).get(list_documents))
        .route("/:entity/import", post(import_document))
        .route("/:entity/:id", get(get_document).patch(update_document))
}

fn parse_entity(raw: &str) -> Result<EntityKind, axum::response::Response> {
    raw.parse::<EntityKind>()
        .map_err(|e| errors::json_error(StatusCode::NOT_FOUND, "unknown_entity", e.to_string()))
}

fn parse_id(raw: &str) -> Result<DocumentId, axum::response::Response> {
    raw.parse::<DocumentId>()
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}

pub async fn create_document(
    Extension(services): Extension<Arc<AppServices>>,
    Path(entity): Path<String>,
    Query(params): Query<dto::CreateDocumentParams>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let entity = match parse_entity(&entity) {
        Ok(e) => e,
        Err(resp) => return resp,
    };

    match services
        .documents
        .create(entity, body, params.period.as_deref())
        .await
    {
        Ok(mutation) => {
            services.publish_invalidation(&mutation);
            (StatusCode::CREATED, Json(mutation)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn import_document(
    Extension(services): Extension<Arc<AppServices>>,
    Path(entity): Path<String>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let entity = match parse_entity(&entity) {
        Ok(e) => e,
        Err(resp) => return resp,
    };

    match services.documents.import(entity, body).await {
        Ok(mutation) => {
            services.publish_invalidation(&mutation);
            (StatusCode::CREATED, Json(mutation)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_documents(
    Extension(services): Extension<Arc<AppServices>>,
    Path(entity): Path<String>,
) -> axum::response::Response {
    let entity = match parse_entity(&entity) {
        Ok(e) => e,
        Err(resp) => return resp,
    };

    match services.documents.list(entity).await {
        Ok(docs) => Json(docs).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_document(
    Extension(services): Extension<Arc<AppServices>>,
    Path((entity, id)): Path<(String, String)>,
) -> axum::response::Response {
    let (entity, id) = match parse_entity(&entity).and_then(|e| Ok((e, parse_id(&id)?))) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.documents.get(entity, id).await {
        Ok(doc) => Json(doc).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_document(
    Extension(services): Extension<Arc<AppServices>>,
    Path((entity, id)): Path<(String, String)>,
    Json(patch): Json<Value>,
) -> axum::response::Response {
    let (entity, id) = match parse_entity(&entity).and_then(|e| Ok((e, parse_id(&id)?))) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.documents.update(entity, id, patch).await {
        Ok(mutation) => {
            services.publish_invalidation(&mutation);
            Json(mutation).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}
