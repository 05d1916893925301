use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::{GdprError, GdprService};
use crate::ids::UserId;
use crate::storage::ObjectStorage;
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct BackofficeAuthor {
    pub author_id: UserId,
}

pub fn gdpr_router<S, O>(service: Arc<GdprService<S, O>>) -> Router
where
    S: Store + 'static,
    O: ObjectStorage + 'static,
{
    Router::new()
        .route(
            "/backoffice/users/:user_id/gdpr_extract",
            post(request_extract_handler::<S, O>),
        )
        .route(
            "/backoffice/users/:user_id/pre_anonymize",
            post(pre_anonymize_handler::<S, O>),
        )
        .with_state(service)
}

fn failure_response(failure: GdprError) -> Response {
    let status = match &failure {
        GdprError::UserNotFound(_) | GdprError::ExtractNotFound(_) => StatusCode::NOT_FOUND,
        GdprError::UnprocessedExtract(_) | GdprError::UserAlreadyHasPendingAnonymization(_) => {
            StatusCode::CONFLICT
        }
        _ => {
            error!(error = %failure, "GDPR request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, axum::Json(json!({ "error": failure.to_string() }))).into_response()
}

async fn request_extract_handler<S, O>(
    State(service): State<Arc<GdprService<S, O>>>,
    Path(user_id): Path<u64>,
    axum::Json(request): axum::Json<BackofficeAuthor>,
) -> Response
where
    S: Store + 'static,
    O: ObjectStorage + 'static,
{
    let now = Utc::now().naive_utc();
    match service.request_extract(UserId(user_id), request.author_id, now) {
        Ok(extract) => (StatusCode::CREATED, axum::Json(extract)).into_response(),
        Err(failure) => failure_response(failure),
    }
}

async fn pre_anonymize_handler<S, O>(
    State(service): State<Arc<GdprService<S, O>>>,
    Path(user_id): Path<u64>,
    axum::Json(request): axum::Json<BackofficeAuthor>,
) -> Response
where
    S: Store + 'static,
    O: ObjectStorage + 'static,
{
    let now = Utc::now().naive_utc();
    match service.pre_anonymize_user(UserId(user_id), request.author_id, now) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(failure) => failure_response(failure),
    }
}
