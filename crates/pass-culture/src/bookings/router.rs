use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::service::{BookingError, BookingService};
use crate::ids::{BookingId, StockId, UserId};
use crate::notifications::Notifier;
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct BookOfferRequest {
    pub user_id: UserId,
    pub stock_id: StockId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    pub user_id: UserId,
}

pub fn booking_router<S, N>(service: Arc<BookingService<S, N>>) -> Router
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/native/v1/bookings", post(book_offer_handler::<S, N>))
        .route(
            "/native/v1/bookings/:booking_id/cancel",
            post(cancel_by_beneficiary_handler::<S, N>),
        )
        .route(
            "/native/v1/users/:user_id/bookings",
            get(user_bookings_handler::<S, N>),
        )
        .route(
            "/pro/bookings/token/:token/use",
            patch(use_by_token_handler::<S, N>),
        )
        .route(
            "/pro/bookings/:booking_id/unuse",
            patch(unuse_handler::<S, N>),
        )
        .route(
            "/pro/bookings/:booking_id/cancel",
            post(cancel_by_offerer_handler::<S, N>),
        )
        .with_state(service)
}

pub(crate) fn failure_response(failure: BookingError) -> Response {
    let status = match failure {
        BookingError::Validation(errors) => return errors.into_response(),
        BookingError::UserNotFound(_)
        | BookingError::StockNotFound(_)
        | BookingError::OfferNotFound(_)
        | BookingError::BookingNotFound(_)
        | BookingError::TokenNotFound(_) => StatusCode::NOT_FOUND,
        BookingError::Repository(_) | BookingError::Notifier(_) | BookingError::TokenExhausted => {
            error!(error = %failure, "Booking request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, axum::Json(json!({ "error": failure.to_string() }))).into_response()
}

pub(crate) async fn book_offer_handler<S, N>(
    State(service): State<Arc<BookingService<S, N>>>,
    axum::Json(request): axum::Json<BookOfferRequest>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let now = Utc::now().naive_utc();
    let outcome = service
        .fetch_user(request.user_id)
        .and_then(|user| service.book_offer(&user, request.stock_id, request.quantity, now));
    match outcome {
        Ok(booking) => (StatusCode::OK, axum::Json(booking)).into_response(),
        Err(failure) => failure_response(failure),
    }
}

pub(crate) async fn cancel_by_beneficiary_handler<S, N>(
    State(service): State<Arc<BookingService<S, N>>>,
    Path(booking_id): Path<u64>,
    axum::Json(request): axum::Json<CancelBookingRequest>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let now = Utc::now().naive_utc();
    let outcome = service.fetch_user(request.user_id).and_then(|user| {
        service.cancel_booking_by_beneficiary(&user, BookingId(booking_id), now)
    });
    match outcome {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(failure) => failure_response(failure),
    }
}

pub(crate) async fn user_bookings_handler<S, N>(
    State(service): State<Arc<BookingService<S, N>>>,
    Path(user_id): Path<u64>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let now = Utc::now().naive_utc();
    let outcome = service.fetch_user(UserId(user_id)).and_then(|user| {
        let bookings = service.get_user_bookings(user.id)?;
        let remaining_credit = service.compute_remaining_credit(&user, now)?;
        Ok(json!({ "bookings": bookings, "remaining_credit": remaining_credit }))
    });
    match outcome {
        Ok(payload) => (StatusCode::OK, axum::Json(payload)).into_response(),
        Err(failure) => failure_response(failure),
    }
}

pub(crate) async fn use_by_token_handler<S, N>(
    State(service): State<Arc<BookingService<S, N>>>,
    Path(token): Path<String>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let now = Utc::now().naive_utc();
    match service.mark_as_used_by_token(&token, now) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(failure) => failure_response(failure),
    }
}

pub(crate) async fn unuse_handler<S, N>(
    State(service): State<Arc<BookingService<S, N>>>,
    Path(booking_id): Path<u64>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    match service.mark_as_unused(BookingId(booking_id)) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(failure) => failure_response(failure),
    }
}

pub(crate) async fn cancel_by_offerer_handler<S, N>(
    State(service): State<Arc<BookingService<S, N>>>,
    Path(booking_id): Path<u64>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let now = Utc::now().naive_utc();
    match service.cancel_booking_by_offerer(BookingId(booking_id), now) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(failure) => failure_response(failure),
    }
}
