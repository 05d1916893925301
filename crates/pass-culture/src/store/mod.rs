//! Storage abstractions so the domain services can be exercised in isolation.

mod memory;

use chrono::{NaiveDate, NaiveDateTime};

pub use memory::{InMemoryStore, SnapshotError};

use crate::bookings::domain::Booking;
use crate::finance::reimbursement::CustomReimbursementRule;
use crate::fraud::domain::{BeneficiaryFraudCheck, BeneficiaryFraudReview};
use crate::gdpr::domain::{GdprUserAnonymization, GdprUserDataExtract};
use crate::ids::{
    BookingId, ExtractId, FraudCheckId, OfferId, OffererId, ReimbursementRuleId, Sequence, StockId,
    UserId, VenueId,
};
use crate::offers::domain::{Offer, Offerer, Stock, Venue};
use crate::subscription::models::SubscriptionMessage;
use crate::users::history::ActionHistory;
use crate::users::User;

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
}

pub trait IdAllocator: Send + Sync {
    fn next_id(&self, sequence: Sequence) -> Result<u64, RepositoryError>;
}

pub trait UserRepository: Send + Sync {
    fn insert_user(&self, user: User) -> Result<User, RepositoryError>;
    fn update_user(&self, user: User) -> Result<(), RepositoryError>;
    fn fetch_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    fn list_users(&self) -> Result<Vec<User>, RepositoryError>;
}

pub trait FraudCheckRepository: Send + Sync {
    fn insert_fraud_check(
        &self,
        check: BeneficiaryFraudCheck,
    ) -> Result<BeneficiaryFraudCheck, RepositoryError>;
    fn update_fraud_check(&self, check: BeneficiaryFraudCheck) -> Result<(), RepositoryError>;
    fn fetch_fraud_check(
        &self,
        id: FraudCheckId,
    ) -> Result<Option<BeneficiaryFraudCheck>, RepositoryError>;
    /// Latest check carrying this provider identifier.
    fn find_fraud_check_by_third_party_id(
        &self,
        third_party_id: &str,
    ) -> Result<Option<BeneficiaryFraudCheck>, RepositoryError>;
    /// Checks of one user, oldest first.
    fn user_fraud_checks(&self, user_id: UserId)
        -> Result<Vec<BeneficiaryFraudCheck>, RepositoryError>;
}

pub trait FraudReviewRepository: Send + Sync {
    fn insert_fraud_review(
        &self,
        review: BeneficiaryFraudReview,
    ) -> Result<BeneficiaryFraudReview, RepositoryError>;
    fn update_fraud_review(&self, review: BeneficiaryFraudReview) -> Result<(), RepositoryError>;
    fn user_fraud_reviews(
        &self,
        user_id: UserId,
    ) -> Result<Vec<BeneficiaryFraudReview>, RepositoryError>;
}

pub trait SubscriptionMessageRepository: Send + Sync {
    fn insert_subscription_message(
        &self,
        message: SubscriptionMessage,
    ) -> Result<SubscriptionMessage, RepositoryError>;
    fn user_subscription_messages(
        &self,
        user_id: UserId,
    ) -> Result<Vec<SubscriptionMessage>, RepositoryError>;
}

pub trait OffererRepository: Send + Sync {
    fn insert_offerer(&self, offerer: Offerer) -> Result<Offerer, RepositoryError>;
    fn fetch_offerer(&self, id: OffererId) -> Result<Option<Offerer>, RepositoryError>;
    fn insert_venue(&self, venue: Venue) -> Result<Venue, RepositoryError>;
    fn fetch_venue(&self, id: VenueId) -> Result<Option<Venue>, RepositoryError>;
    fn insert_offer(&self, offer: Offer) -> Result<Offer, RepositoryError>;
    fn update_offer(&self, offer: Offer) -> Result<(), RepositoryError>;
    fn fetch_offer(&self, id: OfferId) -> Result<Option<Offer>, RepositoryError>;
    fn insert_stock(&self, stock: Stock) -> Result<Stock, RepositoryError>;
    /// The stored `dn_booked_quantity` is kept: only the booking operations move it.
    fn update_stock(&self, stock: Stock) -> Result<(), RepositoryError>;
    fn fetch_stock(&self, id: StockId) -> Result<Option<Stock>, RepositoryError>;
    fn offer_stocks(&self, offer_id: OfferId) -> Result<Vec<Stock>, RepositoryError>;
}

/// Records a booking decision is taken on, read under the lock that stores the booking.
#[derive(Debug, Clone)]
pub struct BookingSnapshot {
    pub user: User,
    pub stock: Stock,
    pub offer: Offer,
    pub offer_stocks: Vec<Stock>,
    pub user_bookings: Vec<Booking>,
    /// Id the booking gets if `decide` accepts it.
    pub booking_id: BookingId,
}

pub trait BookingRepository: Send + Sync {
    fn insert_booking(&self, booking: Booking) -> Result<Booking, RepositoryError>;
    /// Runs `decide` on fresh records, then stores the booking it returns and adds its quantity
    /// to the stock. Nothing else touches the user or the stock in between.
    fn reserve_booking<E, F>(
        &self,
        user_id: UserId,
        stock_id: StockId,
        decide: F,
    ) -> Result<Booking, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(BookingSnapshot) -> Result<Booking, E>;
    /// Applies `change` to the stored booking and gives its quantity back to the stock when the
    /// booking goes from active to cancelled.
    fn release_booking<E, F>(&self, booking_id: BookingId, change: F) -> Result<Booking, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(&mut Booking) -> Result<(), E>;
    fn update_booking(&self, booking: Booking) -> Result<(), RepositoryError>;
    fn fetch_booking(&self, id: BookingId) -> Result<Option<Booking>, RepositoryError>;
    fn find_booking_by_token(&self, token: &str) -> Result<Option<Booking>, RepositoryError>;
    fn user_bookings(&self, user_id: UserId) -> Result<Vec<Booking>, RepositoryError>;
    fn stock_bookings(&self, stock_id: StockId) -> Result<Vec<Booking>, RepositoryError>;
}

pub trait ReimbursementRuleRepository: Send + Sync {
    fn insert_rule(
        &self,
        rule: CustomReimbursementRule,
    ) -> Result<CustomReimbursementRule, RepositoryError>;
    fn update_rule(&self, rule: CustomReimbursementRule) -> Result<(), RepositoryError>;
    fn fetch_rule(
        &self,
        id: ReimbursementRuleId,
    ) -> Result<Option<CustomReimbursementRule>, RepositoryError>;
    fn list_rules(&self) -> Result<Vec<CustomReimbursementRule>, RepositoryError>;
}

/// Every record anonymization rewrites for one user.
#[derive(Debug, Clone)]
pub struct UserAnonymization {
    pub user: User,
    pub fraud_checks: Vec<BeneficiaryFraudCheck>,
    pub fraud_reviews: Vec<BeneficiaryFraudReview>,
    pub deleted_extracts: Vec<ExtractId>,
    pub author: Option<UserId>,
    pub date: NaiveDateTime,
}

pub trait GdprRepository: Send + Sync {
    fn insert_extract(
        &self,
        extract: GdprUserDataExtract,
    ) -> Result<GdprUserDataExtract, RepositoryError>;
    fn update_extract(&self, extract: GdprUserDataExtract) -> Result<(), RepositoryError>;
    fn fetch_extract(&self, id: ExtractId) -> Result<Option<GdprUserDataExtract>, RepositoryError>;
    fn delete_extract(&self, id: ExtractId) -> Result<(), RepositoryError>;
    /// Extracts ordered by creation date, oldest first.
    fn list_extracts(&self) -> Result<Vec<GdprUserDataExtract>, RepositoryError>;

    fn tag_for_anonymization(&self, tag: GdprUserAnonymization) -> Result<(), RepositoryError>;
    fn anonymization_tags(&self) -> Result<Vec<GdprUserAnonymization>, RepositoryError>;
    fn is_tagged_for_anonymization(&self, user_id: UserId) -> Result<bool, RepositoryError>;

    /// `false` when another worker already holds the extract lock.
    fn acquire_extract_lock(&self) -> Result<bool, RepositoryError>;
    fn release_extract_lock(&self) -> Result<(), RepositoryError>;
    fn extract_counter(&self, day: NaiveDate) -> Result<u32, RepositoryError>;
    fn increment_extract_counter(&self, day: NaiveDate) -> Result<u32, RepositoryError>;

    /// Applies the whole anonymization or nothing: rewrites the user and their checks and
    /// reviews, drops their extract rows, tag and actions without a pro structure, then records
    /// a `UserAnonymized` action. Returns how many actions were dropped.
    fn commit_anonymization(&self, anonymization: UserAnonymization)
        -> Result<usize, RepositoryError>;
}

pub trait ActionHistoryRepository: Send + Sync {
    fn record_action(&self, action: ActionHistory) -> Result<ActionHistory, RepositoryError>;
    fn user_actions(&self, user_id: UserId) -> Result<Vec<ActionHistory>, RepositoryError>;
}

/// Everything the services need from persistence.
pub trait Store:
    IdAllocator
    + UserRepository
    + FraudCheckRepository
    + FraudReviewRepository
    + SubscriptionMessageRepository
    + OffererRepository
    + BookingRepository
    + ReimbursementRuleRepository
    + GdprRepository
    + ActionHistoryRepository
{
}

impl<T> Store for T where
    T: IdAllocator
        + UserRepository
        + FraudCheckRepository
        + FraudReviewRepository
        + SubscriptionMessageRepository
        + OffererRepository
        + BookingRepository
        + ReimbursementRuleRepository
        + GdprRepository
        + ActionHistoryRepository
{
}
