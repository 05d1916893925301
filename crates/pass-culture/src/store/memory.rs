use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{
    ActionHistoryRepository, BookingRepository, BookingSnapshot, FraudCheckRepository, FraudReviewRepository,
    GdprRepository, IdAllocator, OffererRepository, ReimbursementRuleRepository, RepositoryError,
    SubscriptionMessageRepository, UserAnonymization, UserRepository,
};
use crate::bookings::domain::Booking;
use crate::finance::reimbursement::CustomReimbursementRule;
use crate::fraud::domain::{BeneficiaryFraudCheck, BeneficiaryFraudReview};
use crate::gdpr::domain::{GdprUserAnonymization, GdprUserDataExtract};
use crate::ids::{
    ActionId, BookingId, ExtractId, FraudCheckId, FraudReviewId, MessageId, OfferId, OffererId,
    ReimbursementRuleId, Sequence, StockId, UserId, VenueId,
};
use crate::offers::domain::{Offer, Offerer, Stock, Venue};
use crate::subscription::models::SubscriptionMessage;
use crate::users::history::{ActionHistory, ActionType};
use crate::users::User;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    sequences: BTreeMap<String, u64>,
    #[serde(default)]
    users: BTreeMap<UserId, User>,
    #[serde(default)]
    fraud_checks: BTreeMap<FraudCheckId, BeneficiaryFraudCheck>,
    #[serde(default)]
    fraud_reviews: BTreeMap<FraudReviewId, BeneficiaryFraudReview>,
    #[serde(default)]
    messages: BTreeMap<MessageId, SubscriptionMessage>,
    #[serde(default)]
    offerers: BTreeMap<OffererId, Offerer>,
    #[serde(default)]
    venues: BTreeMap<VenueId, Venue>,
    #[serde(default)]
    offers: BTreeMap<OfferId, Offer>,
    #[serde(default)]
    stocks: BTreeMap<StockId, Stock>,
    #[serde(default)]
    bookings: BTreeMap<BookingId, Booking>,
    #[serde(default)]
    reimbursement_rules: BTreeMap<ReimbursementRuleId, CustomReimbursementRule>,
    #[serde(default)]
    extracts: BTreeMap<ExtractId, GdprUserDataExtract>,
    #[serde(default)]
    anonymization_tags: BTreeMap<UserId, GdprUserAnonymization>,
    #[serde(default)]
    actions: BTreeMap<ActionId, ActionHistory>,
    #[serde(default)]
    extract_counters: BTreeMap<NaiveDate, u32>,
    #[serde(skip)]
    extract_lock: bool,
}

impl StoreState {
    fn peek_id(&self, sequence: Sequence) -> u64 {
        self.sequences.get(sequence.as_str()).copied().unwrap_or(0) + 1
    }

    fn claim_id(&mut self, sequence: Sequence, id: u64) {
        let counter = self.sequences.entry(sequence.as_str().to_string()).or_insert(0);
        *counter = (*counter).max(id);
    }
}

/// Mutex-guarded store persisted as a single JSON snapshot.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

fn insert_new<K: Ord, V: Clone>(
    map: &mut BTreeMap<K, V>,
    key: K,
    value: V,
) -> Result<V, RepositoryError> {
    if map.contains_key(&key) {
        return Err(RepositoryError::Conflict);
    }
    map.insert(key, value.clone());
    Ok(value)
}

fn replace_existing<K: Ord, V>(
    map: &mut BTreeMap<K, V>,
    key: K,
    value: V,
) -> Result<(), RepositoryError> {
    match map.get_mut(&key) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(RepositoryError::NotFound),
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a snapshot; a missing file yields an empty store.
    pub async fn load(path: &Path) -> Result<Self, SnapshotError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(err) => return Err(err.into()),
        };
        let state: StoreState = serde_json::from_slice(&raw)?;
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Write the snapshot next to `path` then rename it into place.
    pub async fn persist(&self, path: &Path) -> Result<(), SnapshotError> {
        let payload = {
            let state = self.lock();
            serde_json::to_vec_pretty(&*state)?
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut temporary = path.as_os_str().to_owned();
        temporary.push(".tmp");
        tokio::fs::write(&temporary, payload).await?;
        tokio::fs::rename(&temporary, path).await?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("store mutex poisoned")
    }
}

impl IdAllocator for InMemoryStore {
    fn next_id(&self, sequence: Sequence) -> Result<u64, RepositoryError> {
        let mut state = self.lock();
        let counter = state.sequences.entry(sequence.as_str().to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

impl UserRepository for InMemoryStore {
    fn insert_user(&self, user: User) -> Result<User, RepositoryError> {
        let mut state = self.lock();
        if state.users.values().any(|existing| existing.email == user.email) {
            return Err(RepositoryError::Conflict);
        }
        insert_new(&mut state.users, user.id, user)
    }

    fn update_user(&self, user: User) -> Result<(), RepositoryError> {
        replace_existing(&mut self.lock().users, user.id, user)
    }

    fn fetch_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let email = email.trim().to_lowercase();
        Ok(self
            .lock()
            .users
            .values()
            .find(|user| user.email.to_lowercase() == email)
            .cloned())
    }

    fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.lock().users.values().cloned().collect())
    }
}

impl FraudCheckRepository for InMemoryStore {
    fn insert_fraud_check(
        &self,
        check: BeneficiaryFraudCheck,
    ) -> Result<BeneficiaryFraudCheck, RepositoryError> {
        insert_new(&mut self.lock().fraud_checks, check.id, check)
    }

    fn update_fraud_check(&self, check: BeneficiaryFraudCheck) -> Result<(), RepositoryError> {
        replace_existing(&mut self.lock().fraud_checks, check.id, check)
    }

    fn fetch_fraud_check(
        &self,
        id: FraudCheckId,
    ) -> Result<Option<BeneficiaryFraudCheck>, RepositoryError> {
        Ok(self.lock().fraud_checks.get(&id).cloned())
    }

    fn find_fraud_check_by_third_party_id(
        &self,
        third_party_id: &str,
    ) -> Result<Option<BeneficiaryFraudCheck>, RepositoryError> {
        Ok(self
            .lock()
            .fraud_checks
            .values()
            .filter(|check| check.third_party_id == third_party_id)
            .max_by_key(|check| (check.date_created, check.id))
            .cloned())
    }

    fn user_fraud_checks(
        &self,
        user_id: UserId,
    ) -> Result<Vec<BeneficiaryFraudCheck>, RepositoryError> {
        Ok(self
            .lock()
            .fraud_checks
            .values()
            .filter(|check| check.user_id == user_id)
            .cloned()
            .collect())
    }
}

impl FraudReviewRepository for InMemoryStore {
    fn insert_fraud_review(
        &self,
        review: BeneficiaryFraudReview,
    ) -> Result<BeneficiaryFraudReview, RepositoryError> {
        insert_new(&mut self.lock().fraud_reviews, review.id, review)
    }

    fn update_fraud_review(&self, review: BeneficiaryFraudReview) -> Result<(), RepositoryError> {
        replace_existing(&mut self.lock().fraud_reviews, review.id, review)
    }

    fn user_fraud_reviews(
        &self,
        user_id: UserId,
    ) -> Result<Vec<BeneficiaryFraudReview>, RepositoryError> {
        Ok(self
            .lock()
            .fraud_reviews
            .values()
            .filter(|review| review.user_id == user_id)
            .cloned()
            .collect())
    }
}

impl SubscriptionMessageRepository for InMemoryStore {
    fn insert_subscription_message(
        &self,
        message: SubscriptionMessage,
    ) -> Result<SubscriptionMessage, RepositoryError> {
        insert_new(&mut self.lock().messages, message.id, message)
    }

    fn user_subscription_messages(
        &self,
        user_id: UserId,
    ) -> Result<Vec<SubscriptionMessage>, RepositoryError> {
        Ok(self
            .lock()
            .messages
            .values()
            .filter(|message| message.user_id == user_id)
            .cloned()
            .collect())
    }
}

impl OffererRepository for InMemoryStore {
    fn insert_offerer(&self, offerer: Offerer) -> Result<Offerer, RepositoryError> {
        insert_new(&mut self.lock().offerers, offerer.id, offerer)
    }

    fn fetch_offerer(&self, id: OffererId) -> Result<Option<Offerer>, RepositoryError> {
        Ok(self.lock().offerers.get(&id).cloned())
    }

    fn insert_venue(&self, venue: Venue) -> Result<Venue, RepositoryError> {
        insert_new(&mut self.lock().venues, venue.id, venue)
    }

    fn fetch_venue(&self, id: VenueId) -> Result<Option<Venue>, RepositoryError> {
        Ok(self.lock().venues.get(&id).cloned())
    }

    fn insert_offer(&self, offer: Offer) -> Result<Offer, RepositoryError> {
        insert_new(&mut self.lock().offers, offer.id, offer)
    }

    fn update_offer(&self, offer: Offer) -> Result<(), RepositoryError> {
        replace_existing(&mut self.lock().offers, offer.id, offer)
    }

    fn fetch_offer(&self, id: OfferId) -> Result<Option<Offer>, RepositoryError> {
        Ok(self.lock().offers.get(&id).cloned())
    }

    fn insert_stock(&self, stock: Stock) -> Result<Stock, RepositoryError> {
        insert_new(&mut self.lock().stocks, stock.id, stock)
    }

    fn update_stock(&self, mut stock: Stock) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let stored = state.stocks.get_mut(&stock.id).ok_or(RepositoryError::NotFound)?;
        stock.dn_booked_quantity = stored.dn_booked_quantity;
        *stored = stock;
        Ok(())
    }

    fn fetch_stock(&self, id: StockId) -> Result<Option<Stock>, RepositoryError> {
        Ok(self.lock().stocks.get(&id).cloned())
    }

    fn offer_stocks(&self, offer_id: OfferId) -> Result<Vec<Stock>, RepositoryError> {
        Ok(self
            .lock()
            .stocks
            .values()
            .filter(|stock| stock.offer_id == offer_id)
            .cloned()
            .collect())
    }
}

impl BookingRepository for InMemoryStore {
    fn insert_booking(&self, booking: Booking) -> Result<Booking, RepositoryError> {
        let mut state = self.lock();
        if state.bookings.values().any(|existing| existing.token == booking.token) {
            return Err(RepositoryError::Conflict);
        }
        insert_new(&mut state.bookings, booking.id, booking)
    }

    fn reserve_booking<E, F>(
        &self,
        user_id: UserId,
        stock_id: StockId,
        decide: F,
    ) -> Result<Booking, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(BookingSnapshot) -> Result<Booking, E>,
    {
        let mut state = self.lock();
        let user = state.users.get(&user_id).cloned().ok_or(RepositoryError::NotFound)?;
        let stock = state.stocks.get(&stock_id).cloned().ok_or(RepositoryError::NotFound)?;
        let offer = state
            .offers
            .get(&stock.offer_id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        let offer_stocks = state
            .stocks
            .values()
            .filter(|candidate| candidate.offer_id == offer.id)
            .cloned()
            .collect();
        let user_bookings = state
            .bookings
            .values()
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .collect();
        let booking_id = BookingId(state.peek_id(Sequence::Booking));

        let booking = decide(BookingSnapshot {
            user,
            stock,
            offer,
            offer_stocks,
            user_bookings,
            booking_id,
        })?;
        if booking.id != booking_id
            || booking.stock_id != stock_id
            || state.bookings.values().any(|existing| existing.token == booking.token)
        {
            return Err(RepositoryError::Conflict.into());
        }

        let stored = state.stocks.get_mut(&stock_id).ok_or(RepositoryError::NotFound)?;
        stored.dn_booked_quantity += booking.quantity;
        state.claim_id(Sequence::Booking, booking_id.0);
        state.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    fn release_booking<E, F>(&self, booking_id: BookingId, change: F) -> Result<Booking, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(&mut Booking) -> Result<(), E>,
    {
        let mut state = self.lock();
        let mut booking = state
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        let was_active = !booking.is_cancelled();
        change(&mut booking)?;

        if was_active && booking.is_cancelled() {
            if let Some(stock) = state.stocks.get_mut(&booking.stock_id) {
                stock.dn_booked_quantity =
                    stock.dn_booked_quantity.saturating_sub(booking.quantity);
            }
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    fn update_booking(&self, booking: Booking) -> Result<(), RepositoryError> {
        replace_existing(&mut self.lock().bookings, booking.id, booking)
    }

    fn fetch_booking(&self, id: BookingId) -> Result<Option<Booking>, RepositoryError> {
        Ok(self.lock().bookings.get(&id).cloned())
    }

    fn find_booking_by_token(&self, token: &str) -> Result<Option<Booking>, RepositoryError> {
        Ok(self
            .lock()
            .bookings
            .values()
            .find(|booking| booking.token.eq_ignore_ascii_case(token))
            .cloned())
    }

    fn user_bookings(&self, user_id: UserId) -> Result<Vec<Booking>, RepositoryError> {
        Ok(self
            .lock()
            .bookings
            .values()
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .collect())
    }

    fn stock_bookings(&self, stock_id: StockId) -> Result<Vec<Booking>, RepositoryError> {
        Ok(self
            .lock()
            .bookings
            .values()
            .filter(|booking| booking.stock_id == stock_id)
            .cloned()
            .collect())
    }
}

impl ReimbursementRuleRepository for InMemoryStore {
    fn insert_rule(
        &self,
        rule: CustomReimbursementRule,
    ) -> Result<CustomReimbursementRule, RepositoryError> {
        insert_new(&mut self.lock().reimbursement_rules, rule.id, rule)
    }

    fn update_rule(&self, rule: CustomReimbursementRule) -> Result<(), RepositoryError> {
        replace_existing(&mut self.lock().reimbursement_rules, rule.id, rule)
    }

    fn fetch_rule(
        &self,
        id: ReimbursementRuleId,
    ) -> Result<Option<CustomReimbursementRule>, RepositoryError> {
        Ok(self.lock().reimbursement_rules.get(&id).cloned())
    }

    fn list_rules(&self) -> Result<Vec<CustomReimbursementRule>, RepositoryError> {
        Ok(self.lock().reimbursement_rules.values().cloned().collect())
    }
}

impl GdprRepository for InMemoryStore {
    fn insert_extract(
        &self,
        extract: GdprUserDataExtract,
    ) -> Result<GdprUserDataExtract, RepositoryError> {
        insert_new(&mut self.lock().extracts, extract.id, extract)
    }

    fn update_extract(&self, extract: GdprUserDataExtract) -> Result<(), RepositoryError> {
        replace_existing(&mut self.lock().extracts, extract.id, extract)
    }

    fn fetch_extract(&self, id: ExtractId) -> Result<Option<GdprUserDataExtract>, RepositoryError> {
        Ok(self.lock().extracts.get(&id).cloned())
    }

    fn delete_extract(&self, id: ExtractId) -> Result<(), RepositoryError> {
        self.lock()
            .extracts
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn list_extracts(&self) -> Result<Vec<GdprUserDataExtract>, RepositoryError> {
        let mut extracts: Vec<_> = self.lock().extracts.values().cloned().collect();
        extracts.sort_by_key(|extract| (extract.date_created, extract.id));
        Ok(extracts)
    }

    fn tag_for_anonymization(&self, tag: GdprUserAnonymization) -> Result<(), RepositoryError> {
        insert_new(&mut self.lock().anonymization_tags, tag.user_id, tag).map(|_| ())
    }

    fn anonymization_tags(&self) -> Result<Vec<GdprUserAnonymization>, RepositoryError> {
        Ok(self.lock().anonymization_tags.values().cloned().collect())
    }

    fn is_tagged_for_anonymization(&self, user_id: UserId) -> Result<bool, RepositoryError> {
        Ok(self.lock().anonymization_tags.contains_key(&user_id))
    }

    fn acquire_extract_lock(&self) -> Result<bool, RepositoryError> {
        let mut state = self.lock();
        if state.extract_lock {
            return Ok(false);
        }
        state.extract_lock = true;
        Ok(true)
    }

    fn release_extract_lock(&self) -> Result<(), RepositoryError> {
        self.lock().extract_lock = false;
        Ok(())
    }

    fn extract_counter(&self, day: NaiveDate) -> Result<u32, RepositoryError> {
        Ok(self.lock().extract_counters.get(&day).copied().unwrap_or(0))
    }

    fn increment_extract_counter(&self, day: NaiveDate) -> Result<u32, RepositoryError> {
        let mut state = self.lock();
        // Only the current day is kept.
        state.extract_counters.retain(|counted, _| *counted == day);
        let counter = state.extract_counters.entry(day).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn commit_anonymization(
        &self,
        anonymization: UserAnonymization,
    ) -> Result<usize, RepositoryError> {
        let UserAnonymization {
            user,
            fraud_checks,
            fraud_reviews,
            deleted_extracts,
            author,
            date,
        } = anonymization;
        let user_id = user.id;

        let mut state = self.lock();
        let complete = state.users.contains_key(&user_id)
            && fraud_checks
                .iter()
                .all(|check| state.fraud_checks.contains_key(&check.id))
            && fraud_reviews
                .iter()
                .all(|review| state.fraud_reviews.contains_key(&review.id));
        if !complete {
            return Err(RepositoryError::NotFound);
        }

        for check in fraud_checks {
            state.fraud_checks.insert(check.id, check);
        }
        for review in fraud_reviews {
            state.fraud_reviews.insert(review.id, review);
        }
        for extract_id in &deleted_extracts {
            state.extracts.remove(extract_id);
        }
        state.anonymization_tags.remove(&user_id);

        let before = state.actions.len();
        state
            .actions
            .retain(|_, action| action.user_id != Some(user_id) || action.offerer_id.is_some());
        let removed = before - state.actions.len();

        state.users.insert(user_id, user);
        let action_id = ActionId(state.peek_id(Sequence::Action));
        state.claim_id(Sequence::Action, action_id.0);
        state.actions.insert(
            action_id,
            ActionHistory::for_user(
                action_id,
                ActionType::UserAnonymized,
                user_id,
                author,
                None,
                date,
            ),
        );
        Ok(removed)
    }
}

impl ActionHistoryRepository for InMemoryStore {
    fn record_action(&self, action: ActionHistory) -> Result<ActionHistory, RepositoryError> {
        insert_new(&mut self.lock().actions, action.id, action)
    }

    fn user_actions(&self, user_id: UserId) -> Result<Vec<ActionHistory>, RepositoryError> {
        Ok(self
            .lock()
            .actions
            .values()
            .filter(|action| action.user_id == Some(user_id))
            .cloned()
            .collect())
    }
}
