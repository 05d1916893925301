use std::sync::Arc;

use chrono::NaiveDateTime;
use rand::Rng;
use tracing::{info, warn};

use super::domain::{Booking, BookingCancellationReason, BookingStatus};
use super::validation::{
    check_beneficiary_can_cancel_booking, check_booking_can_be_cancelled,
    check_can_be_mark_as_unused, check_can_book_free_offer, check_expenses_limits,
    check_is_usable, check_offer_already_booked, check_quantity, check_stock_is_bookable,
    compute_cancellation_limit_date, remaining_credit,
};
use crate::api_errors::ApiErrors;
use crate::ids::{BookingId, OfferId, StockId, UserId};
use crate::notifications::{Notification, Notifier, NotifierError};
use crate::offers::domain::{Offer, Stock};
use crate::store::{BookingSnapshot, RepositoryError, Store};
use crate::users::User;

const TOKEN_LENGTH: usize = 6;
const TOKEN_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TOKEN_ATTEMPTS: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Notifier(#[from] NotifierError),
    #[error("booking refused: {0}")]
    Validation(#[from] ApiErrors),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("stock {0} not found")]
    StockNotFound(StockId),
    #[error("offer {0} not found")]
    OfferNotFound(OfferId),
    #[error("booking {0} not found")]
    BookingNotFound(BookingId),
    #[error("no booking with token {0}")]
    TokenNotFound(String),
    #[error("could not allocate a unique booking token")]
    TokenExhausted,
}

pub fn generate_booking_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())] as char)
        .collect()
}

pub struct BookingService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
}

impl<S, N> BookingService<S, N>
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
        Self { store, notifier }
    }

    pub fn fetch_user(&self, user_id: UserId) -> Result<User, BookingError> {
        self.store
            .fetch_user(user_id)?
            .ok_or(BookingError::UserNotFound(user_id))
    }

    fn fetch_booking(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.store
            .fetch_booking(booking_id)?
            .ok_or(BookingError::BookingNotFound(booking_id))
    }

    fn stock_and_offer(&self, stock_id: StockId) -> Result<(Stock, Offer), BookingError> {
        let stock = self
            .store
            .fetch_stock(stock_id)?
            .ok_or(BookingError::StockNotFound(stock_id))?;
        let offer = self
            .store
            .fetch_offer(stock.offer_id)?
            .ok_or(BookingError::OfferNotFound(stock.offer_id))?;
        Ok((stock, offer))
    }

    fn unique_token(&self) -> Result<String, BookingError> {
        let mut rng = rand::thread_rng();
        for _ in 0..TOKEN_ATTEMPTS {
            let token = generate_booking_token(&mut rng);
            if self.store.find_booking_by_token(&token)?.is_none() {
                return Ok(token);
            }
        }
        Err(BookingError::TokenExhausted)
    }

    /// Credit left on the user's active deposit, in cents.
    pub fn compute_remaining_credit(
        &self,
        user: &User,
        now: NaiveDateTime,
    ) -> Result<i64, BookingError> {
        let bookings = self.store.user_bookings(user.id)?;
        Ok(remaining_credit(user, &bookings, now))
    }

    pub fn get_user_bookings(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError> {
        Ok(self.store.user_bookings(user_id)?)
    }

    /// Validation and the stock and credit bookkeeping run on records locked for the booking.
    pub fn book_offer(
        &self,
        user: &User,
        stock_id: StockId,
        quantity: u32,
        now: NaiveDateTime,
    ) -> Result<Booking, BookingError> {
        self.stock_and_offer(stock_id)?;
        let token = self.unique_token()?;

        let booking = self.store.reserve_booking::<BookingError, _>(user.id, stock_id, |snapshot| {
            let BookingSnapshot {
                user,
                stock,
                offer,
                offer_stocks,
                user_bookings,
                booking_id,
            } = snapshot;

            let mut errors = ApiErrors::new();
            for check in [
                check_offer_already_booked(&user_bookings, &offer_stocks),
                check_quantity(offer.is_duo, quantity),
                check_stock_is_bookable(&stock, &offer, now, quantity),
                check_can_book_free_offer(&user, &stock),
            ] {
                if let Err(failure) = check {
                    errors.merge(failure);
                }
            }
            errors.into_result()?;

            let total_amount = stock.price * i64::from(quantity);
            if total_amount > 0 {
                check_expenses_limits(&user, &user_bookings, total_amount, now)?;
            }

            Ok(Booking {
                id: booking_id,
                token,
                user_id: user.id,
                stock_id,
                deposit_id: user.active_deposit(now).map(|deposit| deposit.id),
                quantity,
                amount: stock.price,
                status: BookingStatus::Confirmed,
                cancellation_reason: None,
                date_created: now,
                date_used: None,
                cancellation_date: None,
                cancellation_limit_date: compute_cancellation_limit_date(
                    stock.beginning_datetime,
                    now,
                ),
            })
        })?;

        info!(
            booking_id = %booking.id,
            user_id = %user.id,
            stock_id = %stock_id,
            quantity,
            "Beneficiary booked an offer"
        );
        self.notifier.send(Notification::BookingConfirmation {
            booking_id: booking.id,
            email: user.email.clone(),
        })?;
        Ok(booking)
    }

    fn cancel<F>(
        &self,
        booking_id: BookingId,
        reason: BookingCancellationReason,
        now: NaiveDateTime,
        check: F,
    ) -> Result<Booking, BookingError>
    where
        F: FnOnce(&Booking) -> Result<(), BookingError>,
    {
        self.fetch_booking(booking_id)?;
        let booking = self.store.release_booking::<BookingError, _>(booking_id, |booking| {
            check(booking)?;
            booking.cancel(reason, now);
            Ok(())
        })?;
        info!(
            booking_id = %booking.id,
            reason = ?reason,
            "Booking cancelled"
        );
        Ok(booking)
    }

    pub fn cancel_booking_by_beneficiary(
        &self,
        user: &User,
        booking_id: BookingId,
        now: NaiveDateTime,
    ) -> Result<Booking, BookingError> {
        let booking = self.cancel(booking_id, BookingCancellationReason::Beneficiary, now, |booking| {
            Ok(check_beneficiary_can_cancel_booking(user, booking, now)?)
        })?;
        self.notifier.send(Notification::BookingCancellationByBeneficiary {
            booking_id: booking.id,
            email: user.email.clone(),
        })?;
        Ok(booking)
    }

    pub fn cancel_booking_by_offerer(
        &self,
        booking_id: BookingId,
        now: NaiveDateTime,
    ) -> Result<Booking, BookingError> {
        let booking = self.cancel(booking_id, BookingCancellationReason::Offerer, now, |booking| {
            Ok(check_booking_can_be_cancelled(booking)?)
        })?;
        match self.store.fetch_user(booking.user_id)? {
            Some(user) => self.notifier.send(Notification::BookingCancelledByOfferer {
                booking_id: booking.id,
                email: user.email,
            })?,
            None => warn!(booking_id = %booking.id, "Cancelled booking has no beneficiary"),
        }
        Ok(booking)
    }

    /// Cancel every active booking of a stock the offerer removed; returns the cancelled ones.
    pub fn cancel_stock_bookings_by_offerer(
        &self,
        stock_id: StockId,
        now: NaiveDateTime,
    ) -> Result<Vec<Booking>, BookingError> {
        let mut cancelled = Vec::new();
        for booking in self.store.stock_bookings(stock_id)? {
            if booking.is_cancelled() || booking.is_used() {
                continue;
            }
            cancelled.push(self.cancel_booking_by_offerer(booking.id, now)?);
        }
        Ok(cancelled)
    }

    pub fn mark_as_used(
        &self,
        booking_id: BookingId,
        now: NaiveDateTime,
    ) -> Result<Booking, BookingError> {
        let mut booking = self.fetch_booking(booking_id)?;
        let (stock, _) = self.stock_and_offer(booking.stock_id)?;
        check_is_usable(&booking, &stock, now)?;
        booking.status = BookingStatus::Used;
        booking.date_used = Some(now);
        self.store.update_booking(booking.clone())?;
        info!(booking_id = %booking.id, "Booking marked as used");
        Ok(booking)
    }

    pub fn mark_as_used_by_token(
        &self,
        token: &str,
        now: NaiveDateTime,
    ) -> Result<Booking, BookingError> {
        let token = token.trim().to_uppercase();
        let booking = self
            .store
            .find_booking_by_token(&token)?
            .ok_or(BookingError::TokenNotFound(token))?;
        self.mark_as_used(booking.id, now)
    }

    pub fn mark_as_unused(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        let mut booking = self.fetch_booking(booking_id)?;
        check_can_be_mark_as_unused(&booking)?;
        booking.status = BookingStatus::Confirmed;
        booking.date_used = None;
        self.store.update_booking(booking.clone())?;
        info!(booking_id = %booking.id, "Booking marked as unused");
        Ok(booking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn tokens_are_six_uppercase_alphanumerics() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let token = generate_booking_token(&mut rng);
            assert_eq!(token.len(), TOKEN_LENGTH);
            assert!(token
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }
}
