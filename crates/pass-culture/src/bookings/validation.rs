use chrono::{Duration, NaiveDateTime};

use super::domain::{Booking, BookingStatus};
use crate::api_errors::ApiErrors;
use crate::offers::domain::{Offer, Stock};
use crate::users::User;

/// Beneficiaries may cancel within 48h of booking, and events up to 48h before they start.
pub const CONFIRMATION_DELAY_HOURS: i64 = 48;
/// Event bookings can be validated by the venue at most this long before the event starts.
pub const AUTO_USE_DELAY_HOURS: i64 = 48;

pub const INSUFFICIENT_FUNDS_MESSAGE: &str = "Le montant de la réservation dépasse le crédit restant";
const TOO_LATE_TO_CANCEL_MESSAGE: &str = "Impossible d'annuler une réservation plus de 48h après l'avoir réservée et moins de 48h avant le début de l'évènement";

/// Free offers are reserved to accounts holding a credit.
pub fn check_can_book_free_offer(user: &User, stock: &Stock) -> Result<(), ApiErrors> {
    if stock.price == 0 && !user.is_beneficiary() {
        return Err(ApiErrors::single(
            "cannotBookFreeOffers",
            "Votre compte ne vous permet pas de faire de réservation.",
        ));
    }
    Ok(())
}

/// `user_bookings` are all of the user's bookings, `offer_stocks` every stock of the offer.
pub fn check_offer_already_booked(
    user_bookings: &[Booking],
    offer_stocks: &[Stock],
) -> Result<(), ApiErrors> {
    let already_booked = user_bookings.iter().any(|booking| {
        !booking.is_cancelled() && offer_stocks.iter().any(|stock| stock.id == booking.stock_id)
    });
    if already_booked {
        return Err(ApiErrors::single(
            "offerId",
            "Cette offre a déjà été réservée par l'utilisateur",
        ));
    }
    Ok(())
}

pub fn check_quantity(is_duo: bool, quantity: u32) -> Result<(), ApiErrors> {
    match (is_duo, quantity) {
        (false, 1) | (true, 1) | (true, 2) => Ok(()),
        (false, _) => Err(ApiErrors::single(
            "quantity",
            "Vous ne pouvez réserver qu'une place pour cette offre.",
        )),
        (true, _) => Err(ApiErrors::single(
            "quantity",
            "Vous devez réserver une place ou deux dans le cas d'une offre DUO.",
        )),
    }
}

pub fn check_stock_is_bookable(
    stock: &Stock,
    offer: &Offer,
    now: NaiveDateTime,
    quantity: u32,
) -> Result<(), ApiErrors> {
    let enough_left = stock
        .remaining_quantity()
        .map(|remaining| remaining >= quantity)
        .unwrap_or(true);
    if !stock.is_bookable(now) || !offer.is_released() || !enough_left {
        return Err(ApiErrors::single("stock", "Ce stock n'est pas réservable"));
    }
    Ok(())
}

/// Active deposit total minus the non-cancelled bookings paid with it; zero without a deposit.
pub fn remaining_credit(user: &User, user_bookings: &[Booking], now: NaiveDateTime) -> i64 {
    let Some(deposit) = user.active_deposit(now) else {
        return 0;
    };
    let spent: i64 = user_bookings
        .iter()
        .filter(|booking| !booking.is_cancelled() && booking.deposit_id == Some(deposit.id))
        .map(Booking::total_amount)
        .sum();
    deposit.total_amount() - spent
}

pub fn check_expenses_limits(
    user: &User,
    user_bookings: &[Booking],
    amount: i64,
    now: NaiveDateTime,
) -> Result<(), ApiErrors> {
    if amount > remaining_credit(user, user_bookings, now) {
        return Err(ApiErrors::single(
            "insufficientFunds",
            INSUFFICIENT_FUNDS_MESSAGE,
        ));
    }
    Ok(())
}

/// `None` for things, which can be cancelled until they are used.
pub fn compute_cancellation_limit_date(
    beginning: Option<NaiveDateTime>,
    booked_at: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let beginning = beginning?;
    let delay = Duration::hours(CONFIRMATION_DELAY_HOURS);
    let before_event = beginning - delay;
    let after_booking = booked_at + delay;
    Some(before_event.min(after_booking).max(booked_at))
}

pub fn check_beneficiary_can_cancel_booking(
    user: &User,
    booking: &Booking,
    now: NaiveDateTime,
) -> Result<(), ApiErrors> {
    if booking.user_id != user.id {
        return Err(ApiErrors::single(
            "user",
            "Vous n'avez pas le droit d'accéder à cette réservation.",
        ));
    }
    if booking.is_used() {
        return Err(ApiErrors::single(
            "booking",
            "Impossible d'annuler une réservation consommée",
        ));
    }
    if booking.is_cancelled() {
        return Err(ApiErrors::single(
            "booking",
            "Cette réservation a déjà été annulée",
        ));
    }
    if booking
        .cancellation_limit_date
        .map(|limit| limit < now)
        .unwrap_or(false)
    {
        return Err(ApiErrors::single("booking", TOO_LATE_TO_CANCEL_MESSAGE));
    }
    Ok(())
}

pub fn check_booking_can_be_cancelled(booking: &Booking) -> Result<(), ApiErrors> {
    if booking.is_cancelled() {
        return Err(ApiErrors::single(
            "global",
            "Cette contremarque a déjà été annulée",
        ));
    }
    if booking.is_used() {
        return Err(ApiErrors::single(
            "global",
            "Impossible d'annuler une réservation consommée",
        ));
    }
    Ok(())
}

pub fn check_is_usable(booking: &Booking, stock: &Stock, now: NaiveDateTime) -> Result<(), ApiErrors> {
    if booking.is_cancelled() {
        return Err(ApiErrors::single("booking", "Cette réservation a été annulée"));
    }
    if booking.is_used() {
        return Err(ApiErrors::single(
            "booking",
            "Cette réservation a déjà été validée",
        ));
    }
    let too_early = stock
        .beginning_datetime
        .map(|beginning| beginning > now + Duration::hours(AUTO_USE_DELAY_HOURS))
        .unwrap_or(false);
    if too_early {
        return Err(ApiErrors::single(
            "booking",
            "Vous ne pouvez pas valider cette contremarque plus de 48h avant le début de l'évènement",
        ));
    }
    Ok(())
}

pub fn check_can_be_mark_as_unused(booking: &Booking) -> Result<(), ApiErrors> {
    match booking.status {
        BookingStatus::Used => Ok(()),
        BookingStatus::Confirmed => Err(ApiErrors::single(
            "booking",
            "Cette réservation n'a pas encore été validée",
        )),
        BookingStatus::Cancelled => Err(ApiErrors::single(
            "booking",
            "Cette réservation a été annulée",
        )),
        BookingStatus::Reimbursed => Err(ApiErrors::single(
            "payment",
            "Cette réservation a été remboursée",
        )),
    }
}
