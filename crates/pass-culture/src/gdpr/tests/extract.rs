use std::io::{Cursor, Read};

use chrono::Duration;

use super::common::{at, date, now, Harness};
use crate::bookings::{Booking, BookingStatus};
use crate::config::GdprConfig;
use crate::gdpr::{GdprError, GdprUserDataExtract, GDPR_EXTRACT_FOLDER};
use crate::ids::{BookingId, ExtractId, OfferId, OffererId, StockId, UserId, VenueId};
use crate::offers::{Offer, OfferValidationStatus, Offerer, Stock, Venue};
use crate::storage::ObjectStorage;
use crate::store::{
    ActionHistoryRepository, BookingRepository, GdprRepository, OffererRepository,
};
use crate::users::history::ActionType;
use crate::users::User;

fn book_a_concert(harness: &Harness, user: &User) {
    let store = &harness.store;
    store
        .insert_offerer(Offerer {
            id: OffererId(1),
            name: "Association des concerts".to_string(),
            siren: Some("123456789".to_string()),
            is_active: true,
            is_validated: true,
        })
        .expect("offerer stored");
    store
        .insert_venue(Venue {
            id: VenueId(1),
            offerer_id: OffererId(1),
            name: "La Cigale".to_string(),
            is_virtual: false,
            address: Some("120 boulevard de Rochechouart".to_string()),
            postal_code: Some("75018".to_string()),
            city: Some("Paris".to_string()),
            siret: None,
        })
        .expect("venue stored");
    store
        .insert_offer(Offer {
            id: OfferId(1),
            venue_id: VenueId(1),
            name: "Concert de jazz".to_string(),
            subcategory: "CONCERT".to_string(),
            is_event: true,
            is_duo: true,
            is_active: true,
            validation: OfferValidationStatus::Approved,
            last_validation_price: Some(15_00),
            date_created: at(2024, 1, 2),
        })
        .expect("offer stored");
    store
        .insert_stock(Stock {
            id: StockId(1),
            offer_id: OfferId(1),
            price: 15_00,
            quantity: Some(100),
            dn_booked_quantity: 1,
            beginning_datetime: Some(at(2024, 3, 1)),
            booking_limit_datetime: Some(at(2024, 3, 1)),
            is_soft_deleted: false,
            date_created: at(2024, 1, 2),
        })
        .expect("stock stored");
    store
        .insert_booking(Booking {
            id: BookingId(1),
            token: "ABC123".to_string(),
            user_id: user.id,
            stock_id: StockId(1),
            deposit_id: user.deposits.first().map(|deposit| deposit.id),
            quantity: 1,
            amount: 15_00,
            status: BookingStatus::Used,
            cancellation_reason: None,
            date_created: at(2024, 2, 1),
            date_used: Some(at(2024, 3, 1)),
            cancellation_date: None,
            cancellation_limit_date: Some(at(2024, 2, 3)),
        })
        .expect("booking stored");
}

fn read_archive(bytes: Vec<u8>, name: &str) -> serde_json::Value {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    let mut document = String::new();
    archive
        .by_name(name)
        .expect("json document present")
        .read_to_string(&mut document)
        .expect("readable document");
    serde_json::from_str(&document).expect("valid json")
}

#[test]
fn a_second_request_waits_for_the_first() {
    let harness = Harness::new();
    let user = harness.user("lea@example.com", date(2005, 4, 4), now());

    let extract = harness
        .service
        .request_extract(user.id, UserId(99), now())
        .expect("extract requested");
    assert_eq!(extract.expiration_date, now() + Duration::days(7));
    assert!(!extract.is_processed());

    match harness.service.request_extract(user.id, UserId(99), now()) {
        Err(GdprError::UnprocessedExtract(id)) => assert_eq!(id, user.id),
        other => panic!("expected UnprocessedExtract, got {other:?}"),
    }
    let later = now() + Duration::days(8);
    assert!(harness.service.request_extract(user.id, UserId(99), later).is_ok());
}

#[test]
fn archive_holds_the_user_data_as_json() {
    let harness = Harness::new();
    let user = harness.beneficiary(
        "lea@example.com",
        date(2005, 4, 4),
        at(2023, 4, 5),
        at(2025, 4, 5),
    );
    book_a_concert(&harness, &user);
    let extract = harness
        .service
        .request_extract(user.id, UserId(99), now())
        .expect("extract requested");

    let processed = harness
        .service
        .extract_beneficiary_data(&extract, now())
        .expect("extract generated");

    assert_eq!(processed.date_processed, Some(now()));
    let bytes = harness
        .storage
        .read(GDPR_EXTRACT_FOLDER, &extract.file_name())
        .expect("archive stored");
    let document = read_archive(bytes, "lea@example.com.json");
    assert_eq!(document["user"]["email"], "lea@example.com");
    assert_eq!(document["bookings"][0]["name"], "Concert de jazz");
    assert_eq!(document["bookings"][0]["venueName"], "La Cigale");
    assert_eq!(document["deposits"][0]["amount"], 300_00);
    assert!(document["generationDate"].is_string());

    let actions = harness.store.user_actions(user.id).expect("history");
    assert!(actions
        .iter()
        .any(|action| action.action_type == ActionType::UserExtractData
            && action.author_id == Some(UserId(99))));
}

#[test]
fn command_processes_one_extract_within_the_daily_quota() {
    let harness = Harness::with_config(GdprConfig {
        max_extracts_per_day: 1,
        extract_validity_days: 7,
    });
    let first = harness.user("a@example.com", date(2004, 1, 1), now());
    let second = harness.user("b@example.com", date(2004, 1, 1), now());
    for user in [&first, &second] {
        harness
            .service
            .request_extract(user.id, UserId(99), now())
            .expect("extract requested");
    }

    assert!(harness
        .service
        .extract_beneficiary_data_command(now())
        .expect("command ran"));
    assert_eq!(harness.store.extract_counter(now().date()).expect("counter"), 1);
    assert!(!harness
        .service
        .extract_beneficiary_data_command(now())
        .expect("command ran"));

    let tomorrow = now() + Duration::days(1);
    assert!(harness
        .service
        .extract_beneficiary_data_command(tomorrow)
        .expect("command ran"));
    assert!(!harness
        .service
        .extract_beneficiary_data_command(tomorrow + Duration::hours(1))
        .expect("command ran"));
    assert!(harness
        .store
        .list_extracts()
        .expect("extracts")
        .iter()
        .all(GdprUserDataExtract::is_processed));
}

#[test]
fn command_backs_off_while_another_run_holds_the_lock() {
    let harness = Harness::new();
    let user = harness.user("a@example.com", date(2004, 1, 1), now());
    harness
        .service
        .request_extract(user.id, UserId(99), now())
        .expect("extract requested");

    assert!(harness.store.acquire_extract_lock().expect("lock"));
    assert!(!harness
        .service
        .extract_beneficiary_data_command(now())
        .expect("command ran"));
    harness.store.release_extract_lock().expect("unlock");

    assert!(harness
        .service
        .extract_beneficiary_data_command(now())
        .expect("command ran"));
    assert!(harness.store.acquire_extract_lock().expect("lock released after run"));
}

#[test]
fn cleanup_removes_orphans_and_expired_extracts() {
    let harness = Harness::new();
    let user = harness.user("a@example.com", date(2004, 1, 1), at(2024, 6, 1));
    let expired = harness
        .service
        .request_extract(user.id, UserId(99), at(2024, 6, 1))
        .expect("extract requested");
    harness
        .service
        .extract_beneficiary_data(&expired, at(2024, 6, 1))
        .expect("extract generated");
    let current = harness
        .service
        .request_extract(user.id, UserId(99), now())
        .expect("extract requested");
    harness
        .service
        .extract_beneficiary_data(&current, now())
        .expect("extract generated");
    for orphan in ["42.zip", "notes.txt"] {
        harness
            .storage
            .store(GDPR_EXTRACT_FOLDER, orphan, b"", "application/zip")
            .expect("stored");
    }

    let deleted = harness
        .service
        .clean_gdpr_extracts(now())
        .expect("cleanup ran");

    assert_eq!(deleted, 2);
    let remaining = harness.storage.list(GDPR_EXTRACT_FOLDER).expect("listed");
    assert_eq!(remaining, vec![current.file_name(), "notes.txt".to_string()]);
    assert_eq!(harness.store.fetch_extract(expired.id).expect("store"), None);
    assert_eq!(harness.store.fetch_extract(ExtractId(42)).expect("store"), None);
    assert!(harness
        .store
        .fetch_extract(current.id)
        .expect("store")
        .is_some());
}
