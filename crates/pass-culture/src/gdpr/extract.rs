use std::io::{Cursor, Write};

use chrono::{Duration, NaiveDateTime};
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{info, warn};
use zip::write::{FileOptions, ZipWriter};

use super::domain::GdprUserDataExtract;
use super::{GdprError, GdprService, GDPR_EXTRACT_FOLDER};
use crate::bookings::BookingStatus;
use crate::finance::deposit::DepositType;
use crate::fraud::domain::{FraudCheckStatus, FraudCheckType};
use crate::ids::{ActionId, ExtractId, Sequence, UserId};
use crate::storage::ObjectStorage;
use crate::store::Store;
use crate::users::history::{ActionHistory, ActionType};
use crate::users::User;

const EXTRACT_CANDIDATES: usize = 10;
const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GdprMarketing {
    pub marketing_emails: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GdprDeposit {
    pub date_created: NaiveDateTime,
    pub date_expiration: NaiveDateTime,
    pub deposit_type: DepositType,
    /// Initial amount plus recredits, in cents.
    pub amount: i64,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GdprBooking {
    pub date_created: NaiveDateTime,
    pub date_used: Option<NaiveDateTime>,
    pub cancellation_date: Option<NaiveDateTime>,
    pub status: BookingStatus,
    pub quantity: u32,
    pub amount: i64,
    pub name: Option<String>,
    pub venue_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GdprValidation {
    pub date_created: NaiveDateTime,
    pub check_type: FraudCheckType,
    pub status: FraudCheckStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GdprAction {
    pub action_date: NaiveDateTime,
    pub action_name: ActionType,
    pub comment: Option<String>,
}

/// Everything handed back to a user asking for their personal data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GdprDataContainer {
    pub generation_date: NaiveDateTime,
    pub user: User,
    pub marketing: GdprMarketing,
    pub deposits: Vec<GdprDeposit>,
    pub bookings: Vec<GdprBooking>,
    pub beneficiary_validations: Vec<GdprValidation>,
    pub actions_history: Vec<GdprAction>,
}

/// True when one of the user's extracts is neither processed nor expired.
pub fn has_unprocessed_extract(
    user: &User,
    extracts: &[GdprUserDataExtract],
    now: NaiveDateTime,
) -> bool {
    extracts.iter().any(|extract| {
        extract.user_id == user.id && !extract.is_expired(now) && !extract.is_processed()
    })
}

/// Zip holding a single `{email}.json` document.
pub fn build_archive(container: &GdprDataContainer) -> Result<Vec<u8>, GdprError> {
    let document = serde_json::to_string_pretty(container)?;
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file::<_, ()>(format!("{}.json", container.user.email), FileOptions::default())?;
    zip.write_all(document.as_bytes())?;
    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

impl<S, O> GdprService<S, O>
where
    S: Store + 'static,
    O: ObjectStorage + 'static,
{
    /// Register a back-office request for the user's data archive.
    pub fn request_extract(
        &self,
        user_id: UserId,
        author_id: UserId,
        now: NaiveDateTime,
    ) -> Result<GdprUserDataExtract, GdprError> {
        let user = self.fetch_user(user_id)?;
        let extracts = self.store.list_extracts()?;
        if has_unprocessed_extract(&user, &extracts, now) {
            return Err(GdprError::UnprocessedExtract(user_id));
        }

        let extract = GdprUserDataExtract {
            id: ExtractId(self.store.next_id(Sequence::Extract)?),
            user_id,
            author_id,
            date_created: now,
            date_processed: None,
            expiration_date: now + Duration::days(self.config.extract_validity_days),
        };
        let extract = self.store.insert_extract(extract)?;
        info!(
            extract_id = %extract.id,
            user_id = %user_id,
            author_id = %author_id,
            "GDPR extract requested"
        );
        Ok(extract)
    }

    pub fn build_data_container(
        &self,
        user: &User,
        now: NaiveDateTime,
    ) -> Result<GdprDataContainer, GdprError> {
        let deposits = user
            .deposits
            .iter()
            .map(|deposit| GdprDeposit {
                date_created: deposit.date_created,
                date_expiration: deposit.expiration_date,
                deposit_type: deposit.deposit_type,
                amount: deposit.total_amount(),
                source: deposit.source.clone(),
            })
            .collect();

        let mut bookings = Vec::new();
        for booking in self.store.user_bookings(user.id)? {
            let offer = match self.store.fetch_stock(booking.stock_id)? {
                Some(stock) => self.store.fetch_offer(stock.offer_id)?,
                None => None,
            };
            let venue = match &offer {
                Some(offer) => self.store.fetch_venue(offer.venue_id)?,
                None => None,
            };
            bookings.push(GdprBooking {
                date_created: booking.date_created,
                date_used: booking.date_used,
                cancellation_date: booking.cancellation_date,
                status: booking.status,
                quantity: booking.quantity,
                amount: booking.amount,
                name: offer.map(|offer| offer.name),
                venue_name: venue.map(|venue| venue.name),
            });
        }

        let beneficiary_validations = self
            .store
            .user_fraud_checks(user.id)?
            .into_iter()
            .map(|check| GdprValidation {
                date_created: check.date_created,
                check_type: check.check_type,
                status: check.status,
                reason: check.reason,
            })
            .collect();

        let actions_history = self
            .store
            .user_actions(user.id)?
            .into_iter()
            .map(|action| GdprAction {
                action_date: action.date,
                action_name: action.action_type,
                comment: action.comment,
            })
            .collect();

        Ok(GdprDataContainer {
            generation_date: now,
            user: user.clone(),
            marketing: GdprMarketing {
                marketing_emails: user.marketing_email_subscription,
            },
            deposits,
            bookings,
            beneficiary_validations,
            actions_history,
        })
    }

    /// Build, store and record the archive of one extract request.
    pub fn extract_beneficiary_data(
        &self,
        extract: &GdprUserDataExtract,
        now: NaiveDateTime,
    ) -> Result<GdprUserDataExtract, GdprError> {
        let user = self.fetch_user(extract.user_id)?;
        let container = self.build_data_container(&user, now)?;
        let archive = build_archive(&container)?;
        self.storage.store(
            GDPR_EXTRACT_FOLDER,
            &extract.file_name(),
            &archive,
            ARCHIVE_CONTENT_TYPE,
        )?;

        let processed = GdprUserDataExtract {
            date_processed: Some(now),
            ..extract.clone()
        };
        self.store.update_extract(processed.clone())?;

        let action_id = ActionId(self.store.next_id(Sequence::Action)?);
        self.store.record_action(ActionHistory::for_user(
            action_id,
            ActionType::UserExtractData,
            user.id,
            Some(extract.author_id),
            None,
            now,
        ))?;
        info!(
            extract_id = %extract.id,
            user_id = %user.id,
            size = archive.len(),
            "GDPR extract generated"
        );
        Ok(processed)
    }

    /// Process at most one pending extract. Returns whether one was processed.
    pub fn extract_beneficiary_data_command(&self, now: NaiveDateTime) -> Result<bool, GdprError> {
        let today = now.date();
        if !self.store.acquire_extract_lock()? {
            info!("GDPR extract already running");
            return Ok(false);
        }

        let outcome = self.process_one_extract(now);
        self.store.release_extract_lock()?;
        let processed = outcome?;
        if processed {
            let count = self.store.increment_extract_counter(today)?;
            info!(count, day = %today, "GDPR extract counter incremented");
        }
        Ok(processed)
    }

    fn process_one_extract(&self, now: NaiveDateTime) -> Result<bool, GdprError> {
        let today = now.date();
        if self.store.extract_counter(today)? >= self.config.max_extracts_per_day {
            warn!(
                max = self.config.max_extracts_per_day,
                "Daily GDPR extract quota reached"
            );
            return Ok(false);
        }

        let candidates: Vec<GdprUserDataExtract> = self
            .store
            .list_extracts()?
            .into_iter()
            .filter(|extract| !extract.is_processed() && !extract.is_expired(now))
            .take(EXTRACT_CANDIDATES)
            .collect();
        // Random pick among the oldest pending requests.
        let Some(extract) = candidates.choose(&mut rand::thread_rng()) else {
            return Ok(false);
        };
        self.extract_beneficiary_data(extract, now)?;
        Ok(true)
    }
}
