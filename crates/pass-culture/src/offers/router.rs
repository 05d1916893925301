use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{patch, post},
    Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::error;

use super::service::{
    OfferError, OfferForm, OfferService, OffererForm, StockEdition, StockForm, VenueForm,
};
use crate::bookings::router::failure_response as booking_failure_response;
use crate::ids::{OfferId, StockId};
use crate::notifications::Notifier;
use crate::store::Store;

pub fn offer_router<S, N>(service: Arc<OfferService<S, N>>) -> Router
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/pro/offerers", post(create_offerer_handler::<S, N>))
        .route("/pro/venues", post(create_venue_handler::<S, N>))
        .route("/pro/offers", post(create_offer_handler::<S, N>))
        .route("/pro/stocks", post(create_stock_handler::<S, N>))
        .route(
            "/pro/stocks/:stock_id",
            patch(edit_stock_handler::<S, N>).delete(delete_stock_handler::<S, N>),
        )
        .route(
            "/backoffice/offers/:offer_id/validate",
            post(validate_offer_handler::<S, N>),
        )
        .with_state(service)
}

fn failure_response(failure: OfferError) -> Response {
    let status = match failure {
        OfferError::Validation(errors) => return errors.into_response(),
        OfferError::Booking(inner) => return booking_failure_response(inner),
        OfferError::OffererNotFound(_)
        | OfferError::VenueNotFound(_)
        | OfferError::OfferNotFound(_)
        | OfferError::StockNotFound(_) => StatusCode::NOT_FOUND,
        OfferError::Repository(_) => {
            error!(error = %failure, "Offer request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, axum::Json(json!({ "error": failure.to_string() }))).into_response()
}

fn created<T: serde::Serialize>(outcome: Result<T, OfferError>) -> Response {
    match outcome {
        Ok(created) => (StatusCode::CREATED, axum::Json(created)).into_response(),
        Err(failure) => failure_response(failure),
    }
}

async fn create_offerer_handler<S, N>(
    State(service): State<Arc<OfferService<S, N>>>,
    axum::Json(form): axum::Json<OffererForm>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    created(service.create_offerer(form))
}

async fn create_venue_handler<S, N>(
    State(service): State<Arc<OfferService<S, N>>>,
    axum::Json(form): axum::Json<VenueForm>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    created(service.create_venue(form))
}

async fn create_offer_handler<S, N>(
    State(service): State<Arc<OfferService<S, N>>>,
    axum::Json(form): axum::Json<OfferForm>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let now = Utc::now().naive_utc();
    created(service.create_offer(form, now))
}

async fn create_stock_handler<S, N>(
    State(service): State<Arc<OfferService<S, N>>>,
    axum::Json(form): axum::Json<StockForm>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let now = Utc::now().naive_utc();
    created(service.create_stock(form, now))
}

async fn edit_stock_handler<S, N>(
    State(service): State<Arc<OfferService<S, N>>>,
    Path(stock_id): Path<u64>,
    axum::Json(edition): axum::Json<StockEdition>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let now = Utc::now().naive_utc();
    match service.edit_stock(StockId(stock_id), edition, now) {
        Ok(stock) => (StatusCode::OK, axum::Json(stock)).into_response(),
        Err(failure) => failure_response(failure),
    }
}

async fn delete_stock_handler<S, N>(
    State(service): State<Arc<OfferService<S, N>>>,
    Path(stock_id): Path<u64>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let now = Utc::now().naive_utc();
    match service.delete_stock(StockId(stock_id), now) {
        Ok(cancelled) => (
            StatusCode::OK,
            axum::Json(json!({ "cancelled_bookings": cancelled.len() })),
        )
            .into_response(),
        Err(failure) => failure_response(failure),
    }
}

async fn validate_offer_handler<S, N>(
    State(service): State<Arc<OfferService<S, N>>>,
    Path(offer_id): Path<u64>,
) -> Response
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    match service.validate_offer(OfferId(offer_id)) {
        Ok(offer) => (StatusCode::OK, axum::Json(offer)).into_response(),
        Err(failure) => failure_response(failure),
    }
}
