use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::api_errors::ApiErrors;
use crate::bookings::domain::Booking;
use crate::dates::start_of_day;
use crate::ids::{OfferId, OffererId, ReimbursementRuleId, VenueId};
use crate::offers::domain::{Offer, Venue};
use crate::offers::subcategories::{is_known_subcategory, SubcategoryId};

/// Reimbursement rate in basis points: 10_000 means 100 %.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(pub i64);

impl Rate {
    pub const FULL: Rate = Rate(10_000);

    pub fn is_valid(&self) -> bool {
        (0..=Self::FULL.0).contains(&self.0)
    }

    /// Rate applied to an amount in cents, rounded half up to the cent.
    pub fn apply(&self, amount: i64) -> i64 {
        let scaled = self.0 * amount;
        if scaled >= 0 {
            (scaled + Self::FULL.0 / 2) / Self::FULL.0
        } else {
            (scaled - Self::FULL.0 / 2) / Self::FULL.0
        }
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02} %", self.0 / 100, (self.0 % 100).abs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RuleTarget {
    Offer(OfferId),
    Venue(VenueId),
    Offerer(OffererId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleValue {
    Rate(Rate),
    /// Amount in cents per booked place.
    Amount(i64),
}

/// Half-open `[start, end)` range; no end means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timespan {
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
}

impl Timespan {
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at >= self.start && self.end.map(|end| at < end).unwrap_or(true)
    }

    pub fn overlaps(&self, other: &Timespan) -> bool {
        let starts_before_other_ends = other.end.map(|end| self.start < end).unwrap_or(true);
        let other_starts_before_end = self.end.map(|end| other.start < end).unwrap_or(true);
        starts_before_other_ends && other_starts_before_end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomReimbursementRule {
    pub id: ReimbursementRuleId,
    pub target: RuleTarget,
    /// Empty means every subcategory.
    pub subcategories: Vec<SubcategoryId>,
    pub value: RuleValue,
    pub timespan: Timespan,
}

/// Loose input as typed in the back office or read from a CSV row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewReimbursementRule {
    pub offerer_id: Option<OffererId>,
    pub venue_id: Option<VenueId>,
    pub offer_id: Option<OfferId>,
    pub subcategories: Vec<SubcategoryId>,
    pub rate: Option<Rate>,
    pub amount: Option<i64>,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReimbursementRuleError {
    #[error("Must provide offer, venue, or offerer (only one)")]
    AmbiguousTarget,
    #[error("Must provide rate or amount (but not both)")]
    AmbiguousValue,
    #[error("Rate must be specified only with an offerer or venue (not with an offer)")]
    RateOnOffer,
    #[error("Amount must be specified only with an offer (not with an offerer or venue)")]
    AmountWithoutOffer,
    #[error("Start date must be provided")]
    MissingStartDate,
    #[error("Le lieu {venue_id} - {name} doit être un point de valorisation.")]
    NotAPricingPoint { venue_id: VenueId, name: String },
    #[error("{0}")]
    WrongDate(String),
    #[error("invalid reimbursement rule: {0}")]
    Validation(ApiErrors),
}

impl NewReimbursementRule {
    pub fn into_rule(self, id: ReimbursementRuleId) -> Result<CustomReimbursementRule, ReimbursementRuleError> {
        let target = match (self.offer_id, self.venue_id, self.offerer_id) {
            (Some(offer), None, None) => RuleTarget::Offer(offer),
            (None, Some(venue), None) => RuleTarget::Venue(venue),
            (None, None, Some(offerer)) => RuleTarget::Offerer(offerer),
            _ => return Err(ReimbursementRuleError::AmbiguousTarget),
        };
        let value = match (self.rate, self.amount) {
            (Some(rate), None) => RuleValue::Rate(rate),
            (None, Some(amount)) => RuleValue::Amount(amount),
            _ => return Err(ReimbursementRuleError::AmbiguousValue),
        };
        match (target, value) {
            (RuleTarget::Offer(_), RuleValue::Rate(_)) => {
                return Err(ReimbursementRuleError::RateOnOffer)
            }
            (RuleTarget::Venue(_) | RuleTarget::Offerer(_), RuleValue::Amount(_)) => {
                return Err(ReimbursementRuleError::AmountWithoutOffer)
            }
            _ => {}
        }
        let start = self.start_date.ok_or(ReimbursementRuleError::MissingStartDate)?;

        Ok(CustomReimbursementRule {
            id,
            target,
            subcategories: self.subcategories,
            value,
            timespan: Timespan {
                start,
                end: self.end_date,
            },
        })
    }
}

impl CustomReimbursementRule {
    /// Reimbursed amount in cents for a booking covered by this rule.
    pub fn apply(&self, booking: &Booking) -> i64 {
        match self.value {
            RuleValue::Amount(amount) => amount * i64::from(booking.quantity),
            RuleValue::Rate(rate) => rate.apply(booking.total_amount()),
        }
    }

    pub fn matches(&self, booking: &Booking, offer: &Offer, venue: &Venue, at: NaiveDateTime) -> bool {
        let target_matches = match self.target {
            RuleTarget::Offer(offer_id) => offer_id == offer.id,
            RuleTarget::Venue(venue_id) => venue_id == venue.id && offer.venue_id == venue.id,
            RuleTarget::Offerer(offerer_id) => {
                offerer_id == venue.offerer_id && offer.venue_id == venue.id
            }
        };
        target_matches
            && self.covers_subcategory(&offer.subcategory)
            && self.timespan.contains(booking.date_used.unwrap_or(at))
    }

    fn covers_subcategory(&self, subcategory: &str) -> bool {
        self.subcategories.is_empty() || self.subcategories.iter().any(|s| s == subcategory)
    }

    fn shares_subcategory_with(&self, other: &CustomReimbursementRule) -> bool {
        self.subcategories.is_empty()
            || other.subcategories.is_empty()
            || self
                .subcategories
                .iter()
                .any(|subcategory| other.subcategories.contains(subcategory))
    }

    pub fn conflicts_with(&self, other: &CustomReimbursementRule) -> bool {
        self.id != other.id
            && self.target == other.target
            && self.timespan.overlaps(&other.timespan)
            && self.shares_subcategory_with(other)
    }
}

/// Field-level checks run before a rule is persisted or edited.
pub fn validate_reimbursement_rule(
    rule: &CustomReimbursementRule,
    existing: &[CustomReimbursementRule],
    now: NaiveDateTime,
    check_start_date: bool,
) -> Result<(), ApiErrors> {
    let mut errors = ApiErrors::new();
    let tomorrow = start_of_day(now.date() + Duration::days(1));

    match rule.value {
        RuleValue::Rate(rate) if !rate.is_valid() => {
            errors.add_error("rate", "Le taux de remboursement doit être entre 0 et 100 %");
        }
        RuleValue::Amount(amount) if amount < 0 => {
            errors.add_error("amount", "Le montant de remboursement doit être positif");
        }
        _ => {}
    }

    for subcategory in &rule.subcategories {
        if !is_known_subcategory(subcategory) {
            errors.add_error("subcategories", format!("sous-catégorie inconnue : {subcategory}"));
        }
    }

    if check_start_date && rule.timespan.start < tomorrow {
        errors.add_error("start_date", "Ne peut pas commencer avant demain");
    }
    if let Some(end) = rule.timespan.end {
        if end < tomorrow {
            errors.add_error("end_date", "Ne peut pas être antérieure à demain");
        }
        if rule.timespan.start > end {
            errors.add_error("start_date", "Ne peut pas être postérieure à la date de fin");
        }
    }

    for other in existing.iter().filter(|other| rule.conflicts_with(other)) {
        errors.add_error(
            "conflicts",
            format!("Cette règle est en conflit avec la règle n°{}", other.id),
        );
    }

    errors.into_result()
}

/// Close an open-ended rule. Only the end date can change.
pub fn edit_reimbursement_rule(
    rule: &mut CustomReimbursementRule,
    end_date: NaiveDateTime,
    existing: &[CustomReimbursementRule],
    now: NaiveDateTime,
) -> Result<(), ReimbursementRuleError> {
    if end_date.date() <= now.date() {
        return Err(ReimbursementRuleError::WrongDate(
            "La date de fin doit être postérieure à la date du jour.".to_string(),
        ));
    }
    if rule.timespan.end.is_some() {
        return Err(ReimbursementRuleError::WrongDate(
            "Il n'est pas possible de modifier la date de fin lorsque celle-ci est déjà définie."
                .to_string(),
        ));
    }

    let mut edited = rule.clone();
    edited.timespan.end = Some(end_date);
    validate_reimbursement_rule(&edited, existing, now, false)
        .map_err(ReimbursementRuleError::Validation)?;
    *rule = edited;
    Ok(())
}
