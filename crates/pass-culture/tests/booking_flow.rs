//! Pro and beneficiary HTTP flows sharing one store: catalogue creation, booking, stock removal.

mod common {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use chrono::{Duration, NaiveDate, Utc};
    use serde_json::Value;
    use tower::ServiceExt;

    use pass_culture::bookings::{booking_router, BookingService};
    use pass_culture::finance::deposit::{Deposit, DepositType};
    use pass_culture::ids::{DepositId, Sequence, UserId};
    use pass_culture::notifications::InMemoryNotifier;
    use pass_culture::offers::{offer_router, OfferService};
    use pass_culture::store::{IdAllocator, InMemoryStore, UserRepository};
    use pass_culture::users::User;

    pub struct Harness {
        pub store: Arc<InMemoryStore>,
        pub notifier: Arc<InMemoryNotifier>,
        pub bookings: Arc<BookingService<InMemoryStore, InMemoryNotifier>>,
        pub app: Router,
    }

    impl Harness {
        pub fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let notifier = Arc::new(InMemoryNotifier::new());
            let offers = Arc::new(OfferService::new(store.clone(), notifier.clone()));
            let bookings = Arc::new(BookingService::new(store.clone(), notifier.clone()));
            let app = offer_router(offers).merge(booking_router(bookings.clone()));
            Self {
                store,
                notifier,
                bookings,
                app,
            }
        }

        /// Beneficiary holding a fresh 300 € credit.
        pub fn beneficiary(&self) -> User {
            let now = Utc::now().naive_utc();
            let id = UserId(self.store.next_id(Sequence::User).expect("user id"));
            let mut user = User::new(id, format!("beneficiary{id}@example.com"), now);
            user.date_of_birth = NaiveDate::from_ymd_opt(2005, 3, 12);
            user.is_email_validated = true;
            user.add_beneficiary_role();
            user.deposits.push(Deposit {
                id: DepositId(self.store.next_id(Sequence::Deposit).expect("deposit id")),
                deposit_type: DepositType::Grant18,
                amount: 300_00,
                source: "dossier ubble [1]".to_string(),
                version: 2,
                date_created: now - Duration::days(1),
                expiration_date: now + Duration::days(2 * 365),
                recredits: Vec::new(),
            });
            self.store.insert_user(user).expect("user stored")
        }

        pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            let body = match body {
                Some(payload) => {
                    request = request.header("content-type", "application/json");
                    Body::from(payload.to_string())
                }
                None => Body::empty(),
            };
            let response = self
                .app
                .clone()
                .oneshot(request.body(body).expect("request builds"))
                .await
                .expect("router responds");
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
                .await
                .expect("body readable");
            let payload = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).expect("json payload")
            };
            (status, payload)
        }

        /// Offerer, physical venue and a book offer priced at `price` cents. Returns `(offer, stock)` ids.
        pub async fn book_offer(&self, price: i64) -> (u64, u64) {
            let (status, offerer) = self
                .send(
                    "POST",
                    "/pro/offerers",
                    Some(serde_json::json!({ "name": "Librairie du Centre", "siren": "123456789" })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);

            let (status, venue) = self
                .send(
                    "POST",
                    "/pro/venues",
                    Some(serde_json::json!({
                        "offerer_id": offerer["id"],
                        "name": "Librairie du Centre - Nantes",
                        "address": "12 rue Crébillon",
                        "postal_code": "44000",
                        "city": "Nantes",
                        "siret": "12345678900012"
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);

            let (status, offer) = self
                .send(
                    "POST",
                    "/pro/offers",
                    Some(serde_json::json!({
                        "venue_id": venue["id"],
                        "name": "Les Misérables",
                        "subcategory": "LIVRE_PAPIER"
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(offer["validation"], "DRAFT");

            let (status, stock) = self
                .send(
                    "POST",
                    "/pro/stocks",
                    Some(serde_json::json!({
                        "offer_id": offer["id"],
                        "price": price,
                        "quantity": 5
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);

            let offer_id = offer["id"].as_u64().expect("offer id");
            let stock_id = stock["id"].as_u64().expect("stock id");
            (offer_id, stock_id)
        }
    }
}

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;

use common::Harness;
use pass_culture::bookings::BookingStatus;
use pass_culture::ids::{BookingId, StockId};
use pass_culture::users::User;
use pass_culture::notifications::Notification;
use pass_culture::store::{BookingRepository, OffererRepository};

#[tokio::test]
async fn beneficiary_books_then_offerer_removes_the_stock() {
    let harness = Harness::new();
    let user = harness.beneficiary();
    let (offer_id, stock_id) = harness.book_offer(15_00).await;

    let (status, offer) = harness
        .send("POST", &format!("/backoffice/offers/{offer_id}/validate"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(offer["validation"], "APPROVED");
    assert_eq!(offer["last_validation_price"], 15_00);

    let (status, booking) = harness
        .send(
            "POST",
            "/native/v1/bookings",
            Some(json!({ "user_id": user.id, "stock_id": stock_id, "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "unexpected payload {booking}");
    assert_eq!(booking["status"], "CONFIRMED");
    assert_eq!(booking["token"].as_str().map(str::len), Some(6));

    let (status, listing) = harness
        .send("GET", &format!("/native/v1/users/{}/bookings", user.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["bookings"].as_array().map(Vec::len), Some(1));
    assert_eq!(listing["remaining_credit"], 285_00);

    let (status, errors) = harness
        .send(
            "PATCH",
            &format!("/pro/stocks/{stock_id}"),
            Some(json!({ "price": 30_00 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(errors["errors"]["priceLimitationRule"].is_array());

    let (status, removal) = harness
        .send("DELETE", &format!("/pro/stocks/{stock_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removal["cancelled_bookings"], 1);

    let booking_id = BookingId(booking["id"].as_u64().expect("booking id"));
    let cancelled = harness
        .store
        .fetch_booking(booking_id)
        .expect("fetch booking")
        .expect("booking exists");
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    let stock = harness
        .store
        .fetch_stock(cancelled.stock_id)
        .expect("fetch stock")
        .expect("stock exists");
    assert!(stock.is_soft_deleted);
    assert_eq!(stock.dn_booked_quantity, 0);

    assert!(harness.notifier.sent().iter().any(|notification| matches!(
        notification,
        Notification::BookingCancelledByOfferer { booking_id: id, .. } if *id == booking_id
    )));
}

#[tokio::test]
async fn draft_offers_are_not_bookable() {
    let harness = Harness::new();
    let user = harness.beneficiary();
    let (_, stock_id) = harness.book_offer(12_00).await;

    let (status, errors) = harness
        .send(
            "POST",
            "/native/v1/bookings",
            Some(json!({ "user_id": user.id, "stock_id": stock_id, "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(errors["errors"]["stock"].is_array());
}

#[tokio::test]
async fn beneficiary_cancellation_gives_the_credit_back() {
    let harness = Harness::new();
    let user = harness.beneficiary();
    let (offer_id, stock_id) = harness.book_offer(20_00).await;
    harness
        .send("POST", &format!("/backoffice/offers/{offer_id}/validate"), None)
        .await;

    let (status, booking) = harness
        .send(
            "POST",
            "/native/v1/bookings",
            Some(json!({ "user_id": user.id, "stock_id": stock_id, "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = harness
        .send(
            "POST",
            &format!("/native/v1/bookings/{}/cancel", booking["id"]),
            Some(json!({ "user_id": user.id })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, listing) = harness
        .send("GET", &format!("/native/v1/users/{}/bookings", user.id), None)
        .await;
    assert_eq!(listing["remaining_credit"], 300_00);
    assert_eq!(listing["bookings"][0]["status"], "CANCELLED");
}

#[tokio::test]
async fn unknown_venue_is_not_found() {
    let harness = Harness::new();
    let (status, payload) = harness
        .send(
            "POST",
            "/pro/offers",
            Some(json!({ "venue_id": 404, "name": "Concert", "subcategory": "CONCERT" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(payload["error"], "venue 404 not found");
}

#[tokio::test]
async fn concurrent_bookings_never_oversell_the_stock() {
    let harness = Harness::new();
    let (offer_id, stock_id) = harness.book_offer(10_00).await;
    harness
        .send("POST", &format!("/backoffice/offers/{offer_id}/validate"), None)
        .await;
    let stock_id = StockId(stock_id);
    let users: Vec<User> = (0..12).map(|_| harness.beneficiary()).collect();
    let now = Utc::now().naive_utc();

    let booked = std::thread::scope(|scope| {
        let handles: Vec<_> = users
            .iter()
            .map(|user| {
                let bookings = harness.bookings.clone();
                scope.spawn(move || bookings.book_offer(user, stock_id, 1, now).is_ok())
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("booking thread"))
            .filter(|booked| *booked)
            .count()
    });

    assert_eq!(booked, 5);
    let stock = harness
        .store
        .fetch_stock(stock_id)
        .expect("fetch stock")
        .expect("stock exists");
    assert_eq!(stock.dn_booked_quantity, 5);
    let live = harness
        .store
        .stock_bookings(stock_id)
        .expect("stock bookings")
        .into_iter()
        .filter(|booking| !booking.is_cancelled())
        .count();
    assert_eq!(live, 5);
}

#[tokio::test]
async fn concurrent_bookings_never_spend_the_credit_twice() {
    let harness = Harness::new();
    let user = harness.beneficiary();
    let mut stocks = Vec::new();
    for _ in 0..2 {
        let (offer_id, stock_id) = harness.book_offer(200_00).await;
        harness
            .send("POST", &format!("/backoffice/offers/{offer_id}/validate"), None)
            .await;
        stocks.push(StockId(stock_id));
    }
    let now = Utc::now().naive_utc();

    let booked = std::thread::scope(|scope| {
        let handles: Vec<_> = stocks
            .iter()
            .map(|stock_id| {
                let bookings = harness.bookings.clone();
                let user = &user;
                scope.spawn(move || bookings.book_offer(user, *stock_id, 1, now).is_ok())
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("booking thread"))
            .filter(|booked| *booked)
            .count()
    });

    assert_eq!(booked, 1);
    let remaining = harness
        .bookings
        .compute_remaining_credit(&user, now)
        .expect("credit computed");
    assert_eq!(remaining, 100_00);
}

#[tokio::test]
async fn cancelling_twice_releases_the_stock_once() {
    let harness = Harness::new();
    let user = harness.beneficiary();
    let (offer_id, stock_id) = harness.book_offer(10_00).await;
    harness
        .send("POST", &format!("/backoffice/offers/{offer_id}/validate"), None)
        .await;
    let now = Utc::now().naive_utc();
    let booking = harness
        .bookings
        .book_offer(&user, StockId(stock_id), 1, now)
        .expect("booked");

    harness
        .bookings
        .cancel_booking_by_offerer(booking.id, now)
        .expect("cancelled");
    assert!(harness
        .bookings
        .cancel_booking_by_offerer(booking.id, now)
        .is_err());

    let stock = harness
        .store
        .fetch_stock(StockId(stock_id))
        .expect("fetch stock")
        .expect("stock exists");
    assert_eq!(stock.dn_booked_quantity, 0);
}
