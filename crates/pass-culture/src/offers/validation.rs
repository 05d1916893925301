use chrono::{Duration, NaiveDateTime};

use super::domain::{Offer, OfferValidationStatus, Stock, Venue};
use crate::api_errors::ApiErrors;
use crate::finance::reimbursement::Rate;

pub const MAX_STOCK_PRICE: i64 = 300_00;
/// Allowed deviation from the reference price once an offer has been validated.
pub const PRICE_LIMITATION_RATE: Rate = Rate(5_000);
const STOCK_DELETION_DELAY_DAYS: i64 = 2;

pub const NOT_EDITABLE_MESSAGE: &str =
    "Les offres refusées ou en attente de validation ne sont pas modifiables";
pub const PRICE_LIMITATION_MESSAGE: &str =
    "Le prix indiqué est invalide, veuillez créer une nouvelle offre";
const REQUIRED_PARAMETER_MESSAGE: &str = "Ce paramètre est obligatoire";

pub fn validate_venue(venue: &Venue) -> Result<(), ApiErrors> {
    let has_address = venue
        .address
        .as_deref()
        .map(|address| !address.trim().is_empty())
        .unwrap_or(false);
    if venue.is_virtual && has_address {
        return Err(ApiErrors::single(
            "address",
            "Un lieu virtuel ne peut pas avoir d'adresse",
        ));
    }
    Ok(())
}

/// Pending and rejected offers are frozen.
pub fn check_offer_is_editable(offer: &Offer) -> Result<(), ApiErrors> {
    match offer.validation {
        OfferValidationStatus::Pending | OfferValidationStatus::Rejected => {
            Err(ApiErrors::single("global", NOT_EDITABLE_MESSAGE))
        }
        OfferValidationStatus::Draft | OfferValidationStatus::Approved => Ok(()),
    }
}

pub fn check_stock_price(price: i64) -> Result<(), ApiErrors> {
    let mut errors = ApiErrors::new();
    if price < 0 {
        errors.add_error("price", "Le prix doit être positif");
    }
    if price > MAX_STOCK_PRICE {
        errors.add_error("price300", "Le prix d’une offre ne peut excéder 300 euros.");
    }
    errors.into_result()
}

/// `stocks` are the offer's current stocks, used when the offer was never validated with a price.
pub fn check_stock_price_limitation(
    offer: &Offer,
    price: i64,
    stocks: &[Stock],
) -> Result<(), ApiErrors> {
    if offer.validation == OfferValidationStatus::Draft {
        return Ok(());
    }
    let reference = offer.last_validation_price.or_else(|| {
        stocks
            .iter()
            .filter(|stock| !stock.is_soft_deleted)
            .map(|stock| stock.price)
            .min()
    });
    let Some(reference) = reference else {
        return Ok(());
    };

    let margin = PRICE_LIMITATION_RATE.apply(reference);
    if price < reference - margin || price > reference + margin {
        return Err(ApiErrors::single(
            "priceLimitationRule",
            PRICE_LIMITATION_MESSAGE,
        ));
    }
    Ok(())
}

pub fn check_stock_quantity(quantity: Option<i64>, booked_quantity: u32) -> Result<(), ApiErrors> {
    let Some(quantity) = quantity else {
        return Ok(());
    };
    if quantity < 0 {
        return Err(ApiErrors::single("quantity", "La quantité doit être positive"));
    }
    if quantity < i64::from(booked_quantity) {
        return Err(ApiErrors::single(
            "quantity",
            "Le stock total ne peut être inférieur au nombre de réservations",
        ));
    }
    Ok(())
}

pub fn check_required_dates_for_stock(
    offer: &Offer,
    beginning: Option<NaiveDateTime>,
    booking_limit: Option<NaiveDateTime>,
) -> Result<(), ApiErrors> {
    let mut errors = ApiErrors::new();
    if offer.is_thing() {
        if beginning.is_some() {
            errors.add_error(
                "global",
                "Impossible de mettre une date de début si l'offre ne porte pas sur un évènement",
            );
        }
        return errors.into_result();
    }

    match (beginning, booking_limit) {
        (Some(beginning), Some(limit)) if limit > beginning => errors.add_error(
            "bookingLimitDatetime",
            "La date limite de réservation pour cette offre est postérieure à la date de début de l'évènement",
        ),
        _ => {
            if beginning.is_none() {
                errors.add_error("beginningDatetime", REQUIRED_PARAMETER_MESSAGE);
            }
            if booking_limit.is_none() {
                errors.add_error("bookingLimitDatetime", REQUIRED_PARAMETER_MESSAGE);
            }
        }
    }
    errors.into_result()
}

pub fn check_stock_is_updatable(
    stock: &Stock,
    offer: &Offer,
    now: NaiveDateTime,
) -> Result<(), ApiErrors> {
    check_offer_is_editable(offer)?;
    if offer.validation != OfferValidationStatus::Draft && stock.is_event_expired(now) {
        return Err(ApiErrors::single(
            "global",
            "Les évènements passés ne sont pas modifiables",
        ));
    }
    Ok(())
}

/// Event stocks can still be removed during the two days following the event.
pub fn check_stock_is_deletable(
    stock: &Stock,
    offer: &Offer,
    now: NaiveDateTime,
) -> Result<(), ApiErrors> {
    check_offer_is_editable(offer)?;
    let too_late = stock
        .beginning_datetime
        .map(|beginning| beginning < now - Duration::days(STOCK_DELETION_DELAY_DAYS))
        .unwrap_or(false);
    if too_late {
        return Err(ApiErrors::single(
            "global",
            "L'évènement s'est terminé il y a plus de deux jours, la suppression est impossible.",
        ));
    }
    Ok(())
}
