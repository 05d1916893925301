use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::info;

use super::domain::{Offer, OfferValidationStatus, Offerer, Stock, Venue};
use super::subcategories::{find_subcategory, SubcategoryId};
use super::validation::{
    check_offer_is_editable, check_required_dates_for_stock, check_stock_is_deletable,
    check_stock_is_updatable, check_stock_price, check_stock_price_limitation,
    check_stock_quantity, validate_venue,
};
use crate::api_errors::ApiErrors;
use crate::bookings::{Booking, BookingError, BookingService};
use crate::ids::{OfferId, OffererId, Sequence, StockId, VenueId};
use crate::notifications::Notifier;
use crate::store::{RepositoryError, Store};

#[derive(Debug, thiserror::Error)]
pub enum OfferError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Booking(#[from] BookingError),
    #[error("invalid offer data: {0}")]
    Validation(#[from] ApiErrors),
    #[error("offerer {0} not found")]
    OffererNotFound(OffererId),
    #[error("venue {0} not found")]
    VenueNotFound(VenueId),
    #[error("offer {0} not found")]
    OfferNotFound(OfferId),
    #[error("stock {0} not found")]
    StockNotFound(StockId),
}

#[derive(Debug, Clone, Deserialize)]
pub struct OffererForm {
    pub name: String,
    #[serde(default)]
    pub siren: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueForm {
    pub offerer_id: OffererId,
    pub name: String,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub siret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfferForm {
    pub venue_id: VenueId,
    pub name: String,
    pub subcategory: SubcategoryId,
    #[serde(default)]
    pub is_duo: bool,
}

/// New stock. Prices are in cents; a missing quantity means unlimited.
#[derive(Debug, Clone, Deserialize)]
pub struct StockForm {
    pub offer_id: OfferId,
    pub price: i64,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub beginning_datetime: Option<NaiveDateTime>,
    #[serde(default)]
    pub booking_limit_datetime: Option<NaiveDateTime>,
}

/// Partial stock edition; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockEdition {
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub beginning_datetime: Option<NaiveDateTime>,
    #[serde(default)]
    pub booking_limit_datetime: Option<NaiveDateTime>,
}

fn quantity_to_stock(quantity: Option<i64>) -> Option<u32> {
    quantity.map(|quantity| u32::try_from(quantity).unwrap_or(u32::MAX))
}

pub struct OfferService<S, N> {
    store: Arc<S>,
    bookings: BookingService<S, N>,
}

impl<S, N> OfferService<S, N>
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
        let bookings = BookingService::new(store.clone(), notifier);
        Self { store, bookings }
    }

    fn fetch_offer(&self, offer_id: OfferId) -> Result<Offer, OfferError> {
        self.store
            .fetch_offer(offer_id)?
            .ok_or(OfferError::OfferNotFound(offer_id))
    }

    fn fetch_stock(&self, stock_id: StockId) -> Result<Stock, OfferError> {
        self.store
            .fetch_stock(stock_id)?
            .ok_or(OfferError::StockNotFound(stock_id))
    }

    pub fn create_offerer(&self, form: OffererForm) -> Result<Offerer, OfferError> {
        let offerer = Offerer {
            id: OffererId(self.store.next_id(Sequence::Offerer)?),
            name: form.name,
            siren: form.siren,
            is_active: true,
            is_validated: true,
        };
        Ok(self.store.insert_offerer(offerer)?)
    }

    pub fn create_venue(&self, form: VenueForm) -> Result<Venue, OfferError> {
        if self.store.fetch_offerer(form.offerer_id)?.is_none() {
            return Err(OfferError::OffererNotFound(form.offerer_id));
        }
        let venue = Venue {
            id: VenueId(0),
            offerer_id: form.offerer_id,
            name: form.name,
            is_virtual: form.is_virtual,
            address: form.address,
            postal_code: form.postal_code,
            city: form.city,
            siret: form.siret,
        };
        validate_venue(&venue)?;
        let venue = Venue {
            id: VenueId(self.store.next_id(Sequence::Venue)?),
            ..venue
        };
        Ok(self.store.insert_venue(venue)?)
    }

    /// Offers start as drafts until `validate_offer` approves them.
    pub fn create_offer(&self, form: OfferForm, now: NaiveDateTime) -> Result<Offer, OfferError> {
        if self.store.fetch_venue(form.venue_id)?.is_none() {
            return Err(OfferError::VenueNotFound(form.venue_id));
        }
        let subcategory = find_subcategory(&form.subcategory).ok_or_else(|| {
            ApiErrors::single(
                "subcategory",
                format!("sous-catégorie inconnue : {}", form.subcategory),
            )
        })?;

        let offer = Offer {
            id: OfferId(self.store.next_id(Sequence::Offer)?),
            venue_id: form.venue_id,
            name: form.name,
            subcategory: form.subcategory,
            is_event: subcategory.is_event,
            is_duo: form.is_duo,
            is_active: true,
            validation: OfferValidationStatus::Draft,
            last_validation_price: None,
            date_created: now,
        };
        let offer = self.store.insert_offer(offer)?;
        info!(offer_id = %offer.id, venue_id = %offer.venue_id, "Offer created");
        Ok(offer)
    }

    /// Approve the offer and remember its highest stock price.
    pub fn validate_offer(&self, offer_id: OfferId) -> Result<Offer, OfferError> {
        let mut offer = self.fetch_offer(offer_id)?;
        let highest_price = self
            .store
            .offer_stocks(offer_id)?
            .iter()
            .filter(|stock| !stock.is_soft_deleted)
            .map(|stock| stock.price)
            .max();
        offer.validation = OfferValidationStatus::Approved;
        offer.last_validation_price = highest_price;
        self.store.update_offer(offer.clone())?;
        info!(offer_id = %offer.id, "Offer approved");
        Ok(offer)
    }

    pub fn create_stock(&self, form: StockForm, now: NaiveDateTime) -> Result<Stock, OfferError> {
        let offer = self.fetch_offer(form.offer_id)?;
        check_offer_is_editable(&offer)?;
        let stocks = self.store.offer_stocks(offer.id)?;

        let mut errors = ApiErrors::new();
        for check in [
            check_stock_price(form.price),
            check_stock_price_limitation(&offer, form.price, &stocks),
            check_stock_quantity(form.quantity, 0),
            check_required_dates_for_stock(
                &offer,
                form.beginning_datetime,
                form.booking_limit_datetime,
            ),
        ] {
            if let Err(failure) = check {
                errors.merge(failure);
            }
        }
        errors.into_result()?;

        let stock = Stock {
            id: StockId(self.store.next_id(Sequence::Stock)?),
            offer_id: offer.id,
            price: form.price,
            quantity: quantity_to_stock(form.quantity),
            dn_booked_quantity: 0,
            beginning_datetime: form.beginning_datetime,
            booking_limit_datetime: form.booking_limit_datetime,
            is_soft_deleted: false,
            date_created: now,
        };
        let stock = self.store.insert_stock(stock)?;
        info!(stock_id = %stock.id, offer_id = %offer.id, "Stock created");
        Ok(stock)
    }

    pub fn edit_stock(
        &self,
        stock_id: StockId,
        edition: StockEdition,
        now: NaiveDateTime,
    ) -> Result<Stock, OfferError> {
        let mut stock = self.fetch_stock(stock_id)?;
        let offer = self.fetch_offer(stock.offer_id)?;
        check_stock_is_updatable(&stock, &offer, now)?;

        let price = edition.price.unwrap_or(stock.price);
        let beginning = edition.beginning_datetime.or(stock.beginning_datetime);
        let booking_limit = edition.booking_limit_datetime.or(stock.booking_limit_datetime);
        let other_stocks: Vec<Stock> = self
            .store
            .offer_stocks(offer.id)?
            .into_iter()
            .filter(|other| other.id != stock.id)
            .collect();

        let mut errors = ApiErrors::new();
        let mut checks = vec![
            check_stock_quantity(edition.quantity, stock.dn_booked_quantity),
            check_required_dates_for_stock(&offer, beginning, booking_limit),
        ];
        if edition.price.is_some() {
            checks.push(check_stock_price(price));
            checks.push(check_stock_price_limitation(&offer, price, &other_stocks));
        }
        for check in checks {
            if let Err(failure) = check {
                errors.merge(failure);
            }
        }
        errors.into_result()?;

        stock.price = price;
        if edition.quantity.is_some() {
            stock.quantity = quantity_to_stock(edition.quantity);
        }
        stock.beginning_datetime = beginning;
        stock.booking_limit_datetime = booking_limit;
        self.store.update_stock(stock.clone())?;
        info!(stock_id = %stock.id, "Stock edited");
        Ok(stock)
    }

    /// Soft-delete the stock and cancel its bookings on behalf of the offerer.
    pub fn delete_stock(
        &self,
        stock_id: StockId,
        now: NaiveDateTime,
    ) -> Result<Vec<Booking>, OfferError> {
        let mut stock = self.fetch_stock(stock_id)?;
        let offer = self.fetch_offer(stock.offer_id)?;
        check_stock_is_deletable(&stock, &offer, now)?;

        stock.is_soft_deleted = true;
        self.store.update_stock(stock)?;
        let cancelled = self.bookings.cancel_stock_bookings_by_offerer(stock_id, now)?;
        info!(
            stock_id = %stock_id,
            cancelled_bookings = cancelled.len(),
            "Stock deleted"
        );
        Ok(cancelled)
    }
}
