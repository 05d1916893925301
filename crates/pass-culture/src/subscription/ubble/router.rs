use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use super::client::IdentityProvider;
use super::workflow::{UbbleError, UbbleWorkflow};
use crate::ids::UserId;
use crate::notifications::Notifier;
use crate::store::Store;
use crate::subscription::api::SubscriptionError;

#[derive(Debug, Deserialize)]
pub struct IdentificationRequest {
    pub user_id: UserId,
    pub redirect_url: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookNotification {
    pub identification_id: String,
    pub status: String,
    #[serde(default)]
    pub configuration: Option<serde_json::Value>,
}

/// Routes opening provider sessions and receiving their status notifications.
pub fn ubble_router<S, N, P>(workflow: Arc<UbbleWorkflow<S, N, P>>) -> Router
where
    S: Store + 'static,
    N: Notifier + 'static,
    P: IdentityProvider + 'static,
{
    Router::new()
        .route(
            "/native/v1/ubble_identification",
            post(identification_handler::<S, N, P>),
        )
        .route(
            "/webhooks/ubble/application_status",
            post(webhook_handler::<S, N, P>),
        )
        .with_state(workflow)
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, axum::Json(json!({ "error": message }))).into_response()
}

pub(crate) async fn identification_handler<S, N, P>(
    State(workflow): State<Arc<UbbleWorkflow<S, N, P>>>,
    axum::Json(request): axum::Json<IdentificationRequest>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
    P: IdentityProvider + 'static,
{
    let now = Utc::now().naive_utc();
    match workflow
        .begin_identification(request.user_id, &request.redirect_url, now)
        .await
    {
        Ok(identification_url) => (
            StatusCode::OK,
            axum::Json(json!({ "identification_url": identification_url })),
        )
            .into_response(),
        Err(UbbleError::NotAllowed(user_id)) => {
            warn!(user_id = %user_id, "Identity check requested while not allowed");
            error_response(
                StatusCode::BAD_REQUEST,
                "L'utilisateur n'est pas autorisé à effectuer une vérification d'identité".to_string(),
            )
        }
        Err(UbbleError::Subscription(SubscriptionError::UserNotFound(user_id))) => {
            error_response(StatusCode::NOT_FOUND, format!("user {user_id} not found"))
        }
        Err(failure) if failure.is_retryable() => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, failure.to_string())
        }
        Err(failure) => {
            error!(error = %failure, "Identity check could not be started");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, failure.to_string())
        }
    }
}

pub(crate) async fn webhook_handler<S, N, P>(
    State(workflow): State<Arc<UbbleWorkflow<S, N, P>>>,
    axum::Json(notification): axum::Json<WebhookNotification>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
    P: IdentityProvider + 'static,
{
    let now = Utc::now().naive_utc();
    match workflow
        .handle_application_status(&notification.identification_id, now)
        .await
    {
        Ok(_) => (StatusCode::OK, axum::Json(json!({}))).into_response(),
        Err(UbbleError::UnknownIdentification(identification_id)) => {
            warn!(
                identification_id = %identification_id,
                status = %notification.status,
                "Webhook received for an unknown identification"
            );
            error_response(
                StatusCode::NOT_FOUND,
                format!("no identity check found with identification_id {identification_id}"),
            )
        }
        Err(failure) if failure.is_retryable() => {
            error!(
                identification_id = %notification.identification_id,
                error = %failure,
                "Identity provider unavailable while handling webhook"
            );
            error_response(StatusCode::BAD_GATEWAY, failure.to_string())
        }
        Err(failure) => {
            error!(
                identification_id = %notification.identification_id,
                error = %failure,
                "Webhook handling failed"
            );
            error_response(StatusCode::INTERNAL_SERVER_ERROR, failure.to_string())
        }
    }
}
