use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::api::{ProfileForm, SubscriptionError, SubscriptionService};
use super::models::{
    MessageDraft, SubscriptionItemStatus, SubscriptionStep, UserSubscriptionState, YoungStatus,
};
use crate::fraud::domain::{FraudCheckType, FraudReviewStatus};
use crate::fraud::{validate_beneficiary, FraudError};
use crate::ids::UserId;
use crate::notifications::Notifier;
use crate::store::Store;
use crate::users::EligibilityType;

/// Subscription screen payload; the identity check itself stays server-side.
#[derive(Debug, Serialize)]
pub struct SubscriptionStateView {
    pub next_step: Option<SubscriptionStep>,
    pub fraud_status: SubscriptionItemStatus,
    pub young_status: YoungStatus,
    pub identity_check_type: Option<FraudCheckType>,
    pub subscription_message: Option<MessageDraft>,
    pub is_activable: bool,
}

impl From<UserSubscriptionState> for SubscriptionStateView {
    fn from(state: UserSubscriptionState) -> Self {
        Self {
            next_step: state.next_step,
            fraud_status: state.fraud_status,
            young_status: state.young_status,
            identity_check_type: state.identity_fraud_check.map(|check| check.check_type),
            subscription_message: state.subscription_message,
            is_activable: state.is_activable,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub author_id: UserId,
    pub review: FraudReviewStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub eligibility: Option<EligibilityType>,
}

pub fn subscription_router<S, N>(service: Arc<SubscriptionService<S, N>>) -> Router
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route(
            "/native/v1/subscription/:user_id/state",
            get(state_handler::<S, N>),
        )
        .route(
            "/native/v1/subscription/:user_id/profile",
            post(profile_handler::<S, N>),
        )
        .route(
            "/native/v1/subscription/:user_id/honor_statement",
            post(honor_statement_handler::<S, N>),
        )
        .route(
            "/backoffice/users/:user_id/review",
            post(review_handler::<S, N>),
        )
        .with_state(service)
}

fn failure_response(error: SubscriptionError) -> Response {
    let status = match &error {
        SubscriptionError::UserNotFound(_) => StatusCode::NOT_FOUND,
        SubscriptionError::InvalidAge(_) | SubscriptionError::CannotUpgradeBeneficiaryRole(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn state_handler<S, N>(
    State(service): State<Arc<SubscriptionService<S, N>>>,
    Path(user_id): Path<u64>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let now = Utc::now().naive_utc();
    let state = service
        .fetch_user(UserId(user_id))
        .and_then(|user| service.get_user_subscription_state(&user, now));
    match state {
        Ok(state) => {
            let view = SubscriptionStateView::from(state);
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => failure_response(error),
    }
}

pub(crate) async fn profile_handler<S, N>(
    State(service): State<Arc<SubscriptionService<S, N>>>,
    Path(user_id): Path<u64>,
    axum::Json(profile): axum::Json<ProfileForm>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let now = Utc::now().naive_utc();
    let outcome = service
        .fetch_user(UserId(user_id))
        .and_then(|mut user| service.complete_profile(&mut user, profile, now));
    match outcome {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => failure_response(error),
    }
}

pub(crate) async fn honor_statement_handler<S, N>(
    State(service): State<Arc<SubscriptionService<S, N>>>,
    Path(user_id): Path<u64>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let now = Utc::now().naive_utc();
    let outcome = service
        .fetch_user(UserId(user_id))
        .and_then(|mut user| service.submit_honor_statement(&mut user, now));
    match outcome {
        Ok(activated) => {
            (StatusCode::OK, axum::Json(json!({ "activated": activated }))).into_response()
        }
        Err(error) => failure_response(error),
    }
}

pub(crate) async fn review_handler<S, N>(
    State(service): State<Arc<SubscriptionService<S, N>>>,
    Path(user_id): Path<u64>,
    axum::Json(request): axum::Json<ReviewRequest>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let now = Utc::now().naive_utc();
    let outcome = validate_beneficiary(
        &*service,
        UserId(user_id),
        request.author_id,
        request.reason,
        request.review,
        request.eligibility,
        now,
    );
    match outcome {
        Ok(review) => (StatusCode::OK, axum::Json(review)).into_response(),
        Err(FraudError::UserNotFound(id)) => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "error": format!("user {id} not found") })),
        )
            .into_response(),
        Err(failure @ (FraudError::Eligibility(_) | FraudError::FraudCheck(_))) => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({ "error": failure.to_string() })),
        )
            .into_response(),
        Err(failure) => {
            error!(user_id, error = %failure, "Manual review failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(json!({ "error": failure.to_string() })),
            )
                .into_response()
        }
    }
}
