use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use tracing::{error, info, warn};

use super::extract::has_unprocessed_extract;
use super::{GdprError, GdprService, GdprUserAnonymization};
use crate::dates::{is_truncated_to_year, sub_years, truncate_datetime_to_year, truncate_to_year};
use crate::ids::{ExtractId, UserId};
use crate::storage::ObjectStorage;
use crate::store::{Store, UserAnonymization};
use crate::users::{suspend_account, SuspensionReason, User, UserRole};

/// Marker written in place of anonymized free text.
pub const ANONYMIZED: &str = "Anonymized";
pub const PRE_ANONYMIZATION_COMMENT: &str = "L'utilisateur sera anonymisé le jour de ses 21 ans";

const INTERNAL_EMAIL_DOMAIN: &str = "passculture.app";
const INACTIVITY_YEARS: u32 = 3;
const FRAUD_SUSPENSION_YEARS: u32 = 5;
const DEPOSIT_EXPIRATION_YEARS: u32 = 5;
const DEPOSIT_ANONYMIZATION_YEARS: u32 = 10;
const ANONYMIZATION_AGE: u32 = 21;

fn inactive_since(user: &User, threshold: NaiveDateTime) -> bool {
    user.last_connection_date
        .map(|last| last < threshold)
        .unwrap_or(false)
}

/// Only beneficiary roles, and either never credited or at least 21.
pub fn is_beneficiary_anonymizable(user: &User, now: NaiveDateTime) -> bool {
    let only_beneficiary = user
        .roles
        .iter()
        .all(|role| matches!(role, UserRole::Beneficiary | UserRole::UnderageBeneficiary));
    if !only_beneficiary {
        return false;
    }
    if user.deposits.is_empty() {
        return true;
    }
    user.validated_birth_date
        .map(|birth| crate::dates::age_at_date(birth, now.date()) >= ANONYMIZATION_AGE)
        .unwrap_or(false)
}

impl<S, O> GdprService<S, O>
where
    S: Store + 'static,
    O: ObjectStorage + 'static,
{
    /// Strip personal data from the account and its satellites.
    ///
    /// Returns `false` without touching anything while an extract is still pending.
    pub fn anonymize_user(
        &self,
        mut user: User,
        author: Option<UserId>,
        now: NaiveDateTime,
    ) -> Result<bool, GdprError> {
        let extracts = self.store.list_extracts()?;
        if has_unprocessed_extract(&user, &extracts, now) {
            info!(user_id = %user.id, "Anonymization postponed until the pending extract is done");
            return Ok(false);
        }

        let fraud_checks = self
            .store
            .user_fraud_checks(user.id)?
            .into_iter()
            .map(|mut check| {
                check.result_content = None;
                check.reason = Some(ANONYMIZED.to_string());
                check.date_created = truncate_datetime_to_year(check.date_created);
                check
            })
            .collect();
        let fraud_reviews = self
            .store
            .user_fraud_reviews(user.id)?
            .into_iter()
            .map(|mut review| {
                review.reason = Some(ANONYMIZED.to_string());
                review.date_reviewed = truncate_datetime_to_year(review.date_reviewed);
                review
            })
            .collect();
        let deleted_extracts: Vec<ExtractId> = extracts
            .iter()
            .filter(|extract| extract.user_id == user.id)
            .map(|extract| extract.id)
            .collect();

        for deposit in &mut user.deposits {
            deposit.source = ANONYMIZED.to_string();
        }
        user.first_name = None;
        user.last_name = None;
        user.married_name = None;
        user.postal_code = None;
        user.phone_number = None;
        user.address = None;
        user.city = None;
        user.id_piece_number = None;
        user.external_ids.clear();
        user.date_of_birth = user.date_of_birth.map(truncate_to_year);
        user.validated_birth_date = user.validated_birth_date.map(truncate_to_year);
        user.replace_roles_by_anonymized_role();
        user.email = format!("anonymous_{}@anonymized.passculture", user.id);

        let user_id = user.id;
        let removed_actions = self.store.commit_anonymization(UserAnonymization {
            user,
            fraud_checks,
            fraud_reviews,
            deleted_extracts: deleted_extracts.clone(),
            author,
            date: now,
        })?;

        // Archives left behind are orphans the cleanup job removes.
        for extract_id in deleted_extracts {
            if let Err(failure) = self.delete_extract_archive(extract_id) {
                warn!(
                    extract_id = %extract_id,
                    error = %failure,
                    "Could not delete the GDPR archive of an anonymized user"
                );
            }
        }
        info!(
            user_id = %user_id,
            author = ?author,
            removed_actions,
            "User anonymized"
        );
        Ok(true)
    }

    fn anonymize_each(&self, users: Vec<User>, now: NaiveDateTime) -> usize {
        let mut anonymized = 0;
        for user in users {
            let user_id = user.id;
            match self.anonymize_user(user, None, now) {
                Ok(true) => anonymized += 1,
                Ok(false) => {}
                Err(failure) => {
                    error!(user_id = %user_id, error = %failure, "Could not anonymize user");
                }
            }
        }
        anonymized
    }

    /// Accounts that never held a role nor a deposit and went quiet for three years.
    pub fn anonymize_non_pro_non_beneficiary_users(
        &self,
        now: NaiveDateTime,
    ) -> Result<usize, GdprError> {
        let inactivity = sub_years(now, INACTIVITY_YEARS);
        let suspension = sub_years(now, FRAUD_SUSPENSION_YEARS);
        let users: Vec<User> = self
            .store
            .list_users()?
            .into_iter()
            .filter(|user| {
                user.roles.is_empty()
                    && user.deposits.is_empty()
                    && user.email_domain() != INTERNAL_EMAIL_DOMAIN
                    && inactive_since(user, inactivity)
                    && !user.is_fraud_suspended_since(suspension)
            })
            .collect();

        let anonymized = self.anonymize_each(users, now);
        info!(anonymized, "Anonymized non pro non beneficiary users");
        Ok(anonymized)
    }

    /// Former beneficiaries whose credit expired long ago, plus tagged users who turned 21.
    pub fn anonymize_beneficiary_users(&self, now: NaiveDateTime) -> Result<usize, GdprError> {
        let inactivity = sub_years(now, INACTIVITY_YEARS);
        let suspension = sub_years(now, FRAUD_SUSPENSION_YEARS);
        let deposit_expiration = sub_years(now, DEPOSIT_EXPIRATION_YEARS);
        let majority = sub_years(now, ANONYMIZATION_AGE).date();

        let tagged: BTreeSet<UserId> = self
            .store
            .anonymization_tags()?
            .into_iter()
            .map(|tag| tag.user_id)
            .collect();

        let users: Vec<User> = self
            .store
            .list_users()?
            .into_iter()
            .filter(|user| !user.is_fraud_suspended_since(suspension))
            .filter(|user| {
                let long_expired = user.is_beneficiary()
                    && inactive_since(user, inactivity)
                    && user
                        .deposit()
                        .map(|deposit| deposit.expiration_date < deposit_expiration)
                        .unwrap_or(false);
                let tagged_and_old_enough = tagged.contains(&user.id)
                    && user
                        .validated_birth_date
                        .map(|birth| birth < majority)
                        .unwrap_or(false);
                long_expired || tagged_and_old_enough
            })
            .collect();

        let anonymized = self.anonymize_each(users, now);
        info!(anonymized, "Anonymized beneficiary users");
        Ok(anonymized)
    }

    /// Truncate the dates of deposits expired for ten years. Returns the number of deposits touched.
    pub fn anonymize_user_deposits(&self, now: NaiveDateTime) -> Result<usize, GdprError> {
        let threshold = sub_years(now, DEPOSIT_ANONYMIZATION_YEARS);
        let mut touched = 0;
        for mut user in self.store.list_users()? {
            let mut changed = false;
            for deposit in &mut user.deposits {
                let already_truncated = is_truncated_to_year(deposit.expiration_date)
                    && is_truncated_to_year(deposit.date_created);
                if deposit.expiration_date < threshold && !already_truncated {
                    deposit.expiration_date = truncate_datetime_to_year(deposit.expiration_date);
                    deposit.date_created = truncate_datetime_to_year(deposit.date_created);
                    changed = true;
                    touched += 1;
                }
            }
            if changed {
                self.store.update_user(user)?;
            }
        }
        info!(deposits = touched, "Anonymized expired deposits");
        Ok(touched)
    }

    /// Suspend the account until the user turns 21 and tag it for the beneficiary sweep.
    pub fn pre_anonymize_user(
        &self,
        user_id: UserId,
        author_id: UserId,
        now: NaiveDateTime,
    ) -> Result<(), GdprError> {
        if self.store.is_tagged_for_anonymization(user_id)? {
            return Err(GdprError::UserAlreadyHasPendingAnonymization(user_id));
        }
        let mut user = self.fetch_user(user_id)?;
        suspend_account(
            &mut user,
            SuspensionReason::WaitingForAnonymization,
            Some(author_id),
            Some(PRE_ANONYMIZATION_COMMENT.to_string()),
            &*self.store,
            now,
        )?;
        self.store.update_user(user)?;
        self.store.tag_for_anonymization(GdprUserAnonymization {
            user_id,
            date_created: now,
        })?;
        Ok(())
    }
}
