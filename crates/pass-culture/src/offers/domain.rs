use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::subcategories::SubcategoryId;
use crate::ids::{OfferId, OffererId, StockId, VenueId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offerer {
    pub id: OffererId,
    pub name: String,
    pub siren: Option<String>,
    pub is_active: bool,
    pub is_validated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    pub id: VenueId,
    pub offerer_id: OffererId,
    pub name: String,
    pub is_virtual: bool,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub siret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferValidationStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub venue_id: VenueId,
    pub name: String,
    pub subcategory: SubcategoryId,
    pub is_event: bool,
    pub is_duo: bool,
    pub is_active: bool,
    pub validation: OfferValidationStatus,
    /// Highest stock price when the offer was last validated, in cents.
    pub last_validation_price: Option<i64>,
    pub date_created: NaiveDateTime,
}

impl Offer {
    pub fn is_thing(&self) -> bool {
        !self.is_event
    }

    pub fn is_released(&self) -> bool {
        self.is_active && self.validation == OfferValidationStatus::Approved
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub id: StockId,
    pub offer_id: OfferId,
    /// Price in cents.
    pub price: i64,
    /// `None` means unlimited.
    pub quantity: Option<u32>,
    pub dn_booked_quantity: u32,
    pub beginning_datetime: Option<NaiveDateTime>,
    pub booking_limit_datetime: Option<NaiveDateTime>,
    pub is_soft_deleted: bool,
    pub date_created: NaiveDateTime,
}

impl Stock {
    pub fn remaining_quantity(&self) -> Option<u32> {
        self.quantity
            .map(|quantity| quantity.saturating_sub(self.dn_booked_quantity))
    }

    pub fn has_booking_limit_datetime_passed(&self, now: NaiveDateTime) -> bool {
        self.booking_limit_datetime
            .map(|limit| limit < now)
            .unwrap_or(false)
    }

    pub fn is_event_expired(&self, now: NaiveDateTime) -> bool {
        self.beginning_datetime
            .map(|beginning| beginning <= now)
            .unwrap_or(false)
    }

    pub fn is_bookable(&self, now: NaiveDateTime) -> bool {
        !self.is_soft_deleted
            && !self.has_booking_limit_datetime_passed(now)
            && !self.is_event_expired(now)
    }
}
