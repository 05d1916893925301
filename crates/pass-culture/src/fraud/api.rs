use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{error, warn};

use super::checks::{
    anonymize_email, check_user_eligibility, check_user_email_is_validated,
    check_user_names_valid, duplicate_beneficiary_id, duplicate_id_piece_number_fraud_item,
    duplicate_ine_hash_fraud_item, duplicate_user_fraud_item, find_duplicate_beneficiary,
    find_duplicate_id_piece_number_user, find_duplicate_ine_hash_user, missing_data_fraud_item,
    underage_user_fraud_item, validate_frauds, validate_id_piece_number_format_fraud_item,
};
use super::domain::{
    BeneficiaryFraudCheck, BeneficiaryFraudReview, FraudCheckContent, FraudCheckStatus,
    FraudCheckType, FraudItem, FraudReasonCode, FraudReviewStatus, IdentityCheckContent,
    IdentityDetails, ProfileCompletionContent,
};
use super::ubble::ubble_fraud_checks;
use crate::finance::deposit::DepositType;
use crate::ids::{FraudCheckId, Sequence, UserId};
use crate::notifications::{Notification, Notifier, NotifierError};
use crate::store::{RepositoryError, Store};
use crate::users::{suspend_account, EligibilityType, SuspensionReason, User};

const DUPLICATE_SUSPENSION_COMMENT: &str =
    "Compte automatiquement suspendu pour suspicion de doublon";

/// Error raised by the fraud service and the manual review.
#[derive(Debug, thiserror::Error)]
pub enum FraudError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Notifier(#[from] NotifierError),
    #[error("{0}")]
    FraudCheck(String),
    #[error("{0}")]
    Eligibility(String),
    #[error("fraud check {0} does not hold an identity provider result")]
    NotAnIdentityCheck(FraudCheckId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("no user validated the phone number {0}")]
    PhoneOwnerNotFound(String),
}

/// Latest identity check whose content carries a first name, a last name and a birth date.
pub fn last_filled_identity_fraud_check(
    checks: &[BeneficiaryFraudCheck],
) -> Option<&BeneficiaryFraudCheck> {
    checks
        .iter()
        .filter(|check| check.has_filled_identity())
        .max_by_key(|check| (check.date_created, check.id))
}

pub fn completed_profile_check(
    checks: &[BeneficiaryFraudCheck],
    eligibility: Option<EligibilityType>,
) -> Option<&BeneficiaryFraudCheck> {
    checks.iter().find(|check| {
        check.check_type == FraudCheckType::ProfileCompletion
            && check.status == FraudCheckStatus::Ok
            && check.eligibility_type == eligibility
    })
}

pub fn has_performed_honor_statement(
    checks: &[BeneficiaryFraudCheck],
    eligibility: Option<EligibilityType>,
) -> bool {
    checks.iter().any(|check| {
        check.check_type == FraudCheckType::HonorStatement
            && check.status == FraudCheckStatus::Ok
            && check.eligibility_type == eligibility
    })
}

pub fn has_failed_phone_validation(checks: &[BeneficiaryFraudCheck]) -> bool {
    checks.iter().any(|check| {
        check.check_type == FraudCheckType::PhoneValidation
            && check.status == FraudCheckStatus::Ko
    })
}

pub fn has_admin_ko_review(reviews: &[BeneficiaryFraudReview]) -> bool {
    reviews
        .iter()
        .any(|review| review.review == FraudReviewStatus::Ko)
}

/// Items specific to the provider that produced the check.
fn provider_fraud_items(
    users: &[User],
    user: &User,
    check: &BeneficiaryFraudCheck,
    now: NaiveDateTime,
) -> Option<Vec<FraudItem>> {
    match (check.check_type, check.result_content.as_ref()?) {
        (FraudCheckType::Ubble, FraudCheckContent::Ubble(content)) => {
            Some(ubble_fraud_checks(users, user, content, now))
        }
        (FraudCheckType::Dms, FraudCheckContent::Identity(content)) => {
            Some(dms_fraud_items(users, user, content))
        }
        (FraudCheckType::Educonnect, FraudCheckContent::Identity(content)) => {
            Some(educonnect_fraud_items(users, user, content, now))
        }
        _ => None,
    }
}

fn dms_fraud_items(users: &[User], user: &User, content: &IdentityCheckContent) -> Vec<FraudItem> {
    let id_piece_number = content.id_piece_number.as_deref();
    let mut items = vec![validate_id_piece_number_format_fraud_item(id_piece_number)];
    if let Some(number) = id_piece_number.filter(|number| !number.trim().is_empty()) {
        items.push(duplicate_id_piece_number_fraud_item(users, user, number));
    }
    items
}

fn educonnect_fraud_items(
    users: &[User],
    user: &User,
    content: &IdentityCheckContent,
    now: NaiveDateTime,
) -> Vec<FraudItem> {
    let mut items = Vec::new();
    if let Some(birth_date) = content.birth_date {
        items.push(underage_user_fraud_item(birth_date, now.date()));
    }
    if let Some(ine_hash) = content.ine_hash.as_deref() {
        items.push(duplicate_ine_hash_fraud_item(users, ine_hash, user.id));
    }
    items
}

/// Fraud rules applied to identity checks, phone validation and subscription steps.
pub struct FraudService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
}

impl<S, N> FraudService<S, N>
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
        Self { store, notifier }
    }

    /// Run every fraud item against an identity check, then persist its verdict.
    ///
    /// Duplicate handling may suspend accounts, so callers refetch `user` afterwards.
    pub fn on_identity_fraud_check_result(
        &self,
        user: &User,
        check: &mut BeneficiaryFraudCheck,
        now: NaiveDateTime,
    ) -> Result<Vec<FraudItem>, FraudError> {
        let users = self.store.list_users()?;
        let mut items = provider_fraud_items(&users, user, check, now)
            .ok_or(FraudError::NotAnIdentityCheck(check.id))?;

        let identity = check.identity().ok_or(FraudError::NotAnIdentityCheck(check.id))?;
        match (identity.first_name(), identity.last_name(), identity.birth_date()) {
            (Some(first_name), Some(last_name), Some(birth_date)) => {
                items.push(duplicate_user_fraud_item(
                    &users,
                    first_name,
                    last_name,
                    identity.married_name(),
                    birth_date,
                    user.id,
                ));
                items.push(check_user_names_valid(Some(first_name), Some(last_name)));
                items.push(check_user_eligibility(check.eligibility_type));
            }
            _ => items.push(missing_data_fraud_item()),
        }
        items.push(check_user_email_is_validated(user));

        self.handle_duplicate(&items, check.user_id, now)?;

        validate_frauds(&items, check);
        check.updated_at = now;
        self.store.update_fraud_check(check.clone())?;
        Ok(items)
    }

    /// Suspend both accounts when an underage beneficiary is found twice.
    fn handle_duplicate(
        &self,
        items: &[FraudItem],
        user_id: UserId,
        now: NaiveDateTime,
    ) -> Result<(), FraudError> {
        let Some(duplicate_id) = duplicate_beneficiary_id(items) else {
            return Ok(());
        };
        let Some(mut user) = self.store.fetch_user(user_id)? else {
            return Ok(());
        };
        if user.deposit().map(|deposit| deposit.deposit_type) != Some(DepositType::Grant15_17) {
            return Ok(());
        }
        let Some(mut duplicate) = self.store.fetch_user(duplicate_id)? else {
            return Ok(());
        };
        if !duplicate.had_deposit_of_type(DepositType::Grant15_17) {
            return Ok(());
        }

        for account in [&mut user, &mut duplicate] {
            suspend_account(
                account,
                SuspensionReason::FraudSuspicion,
                None,
                Some(DUPLICATE_SUSPENSION_COMMENT.to_string()),
                self.store.as_ref(),
                now,
            )?;
        }
        self.store.update_user(user.clone())?;
        self.store.update_user(duplicate.clone())?;

        self.notifier.send(Notification::DuplicateFraudDetection {
            user_id: user.id,
            duplicate_id: duplicate.id,
        })?;
        Ok(())
    }

    fn create_failed_phone_validation_fraud_check(
        &self,
        user: &User,
        phone_number: Option<String>,
        reason: String,
        reason_code: FraudReasonCode,
        now: NaiveDateTime,
    ) -> Result<BeneficiaryFraudCheck, FraudError> {
        let id = FraudCheckId(self.store.next_id(Sequence::FraudCheck)?);
        let mut check = BeneficiaryFraudCheck::new(
            id,
            user.id,
            FraudCheckType::PhoneValidation,
            FraudCheckStatus::Ko,
            format!("PC-{}", user.id),
            user.eligibility(now),
            now,
        );
        check.result_content = Some(FraudCheckContent::PhoneValidation { phone_number });
        check.reason = Some(reason);
        check.reason_codes = vec![reason_code];
        Ok(self.store.insert_fraud_check(check)?)
    }

    pub fn handle_phone_already_exists(
        &self,
        user: &User,
        phone_number: &str,
        now: NaiveDateTime,
    ) -> Result<BeneficiaryFraudCheck, FraudError> {
        let original = self
            .store
            .list_users()?
            .into_iter()
            .find(|candidate| {
                candidate.is_phone_validated
                    && candidate.phone_number.as_deref() == Some(phone_number)
            })
            .ok_or_else(|| FraudError::PhoneOwnerNotFound(phone_number.to_string()))?;

        self.create_failed_phone_validation_fraud_check(
            user,
            Some(phone_number.to_string()),
            format!("Le numéro est déjà utilisé par l'utilisateur {}", original.id),
            FraudReasonCode::PhoneAlreadyExists,
            now,
        )
    }

    pub fn handle_blacklisted_sms_recipient(
        &self,
        user: &User,
        phone_number: &str,
        now: NaiveDateTime,
    ) -> Result<BeneficiaryFraudCheck, FraudError> {
        self.create_failed_phone_validation_fraud_check(
            user,
            Some(phone_number.to_string()),
            "Le numéro saisi est interdit".to_string(),
            FraudReasonCode::BlacklistedPhoneNumber,
            now,
        )
    }

    pub fn handle_invalid_country_code(
        &self,
        user: &User,
        phone_number: &str,
        now: NaiveDateTime,
    ) -> Result<BeneficiaryFraudCheck, FraudError> {
        self.create_failed_phone_validation_fraud_check(
            user,
            Some(phone_number.to_string()),
            "L'indicatif téléphonique est invalide".to_string(),
            FraudReasonCode::InvalidPhoneCountryCode,
            now,
        )
    }

    pub fn handle_sms_sending_limit_reached(
        &self,
        user: &User,
        now: NaiveDateTime,
    ) -> Result<BeneficiaryFraudCheck, FraudError> {
        self.create_failed_phone_validation_fraud_check(
            user,
            user.phone_number.clone(),
            "Le nombre maximum de sms envoyés est atteint".to_string(),
            FraudReasonCode::SmsSendingLimitReached,
            now,
        )
    }

    pub fn handle_phone_validation_attempts_limit_reached(
        &self,
        user: &User,
        attempts_count: u32,
        now: NaiveDateTime,
    ) -> Result<BeneficiaryFraudCheck, FraudError> {
        self.create_failed_phone_validation_fraud_check(
            user,
            user.phone_number.clone(),
            format!("Le nombre maximum de tentatives de validation est atteint: {attempts_count}"),
            FraudReasonCode::PhoneValidationAttemptsLimitReached,
            now,
        )
    }

    pub fn has_user_pending_identity_check(
        &self,
        user: &User,
        now: NaiveDateTime,
    ) -> Result<bool, FraudError> {
        let eligibility = user.eligibility(now);
        Ok(self
            .store
            .user_fraud_checks(user.id)?
            .iter()
            .any(|check| {
                check.status == FraudCheckStatus::Pending
                    && check.check_type.is_identity_check()
                    && check.eligibility_type == eligibility
            }))
    }

    pub fn get_last_filled_identity_fraud_check(
        &self,
        user_id: UserId,
    ) -> Result<Option<BeneficiaryFraudCheck>, FraudError> {
        let checks = self.store.user_fraud_checks(user_id)?;
        Ok(last_filled_identity_fraud_check(&checks).cloned())
    }

    pub fn create_honor_statement_fraud_check(
        &self,
        user: &User,
        origin: &str,
        eligibility: Option<EligibilityType>,
        now: NaiveDateTime,
    ) -> Result<BeneficiaryFraudCheck, FraudError> {
        let id = FraudCheckId(self.store.next_id(Sequence::FraudCheck)?);
        let mut check = BeneficiaryFraudCheck::new(
            id,
            user.id,
            FraudCheckType::HonorStatement,
            FraudCheckStatus::Ok,
            format!("internal_check_{}", user.id),
            eligibility.or_else(|| user.eligibility(now)),
            now,
        );
        check.reason = Some(origin.to_string());
        Ok(self.store.insert_fraud_check(check)?)
    }

    /// `None` when the profile was already completed for this eligibility.
    pub fn create_profile_completion_fraud_check(
        &self,
        user: &User,
        eligibility: Option<EligibilityType>,
        content: ProfileCompletionContent,
        now: NaiveDateTime,
    ) -> Result<Option<BeneficiaryFraudCheck>, FraudError> {
        let checks = self.store.user_fraud_checks(user.id)?;
        if completed_profile_check(&checks, eligibility).is_some() {
            warn!(
                user_id = %user.id,
                "Profile completion fraud check for user already exists."
            );
            return Ok(None);
        }

        let id = FraudCheckId(self.store.next_id(Sequence::FraudCheck)?);
        let mut check = BeneficiaryFraudCheck::new(
            id,
            user.id,
            FraudCheckType::ProfileCompletion,
            FraudCheckStatus::Ok,
            format!("profile-completion-{}", user.id),
            eligibility,
            now,
        );
        check.reason = Some(content.origin.clone());
        check.result_content = Some(FraudCheckContent::ProfileCompletion(content));
        Ok(Some(self.store.insert_fraud_check(check)?))
    }

    /// Beneficiary sharing the identity carried by `check`, if any.
    pub fn get_duplicate_beneficiary(
        &self,
        check: &BeneficiaryFraudCheck,
    ) -> Result<Option<User>, FraudError> {
        let identity = check.identity().ok_or(FraudError::NotAnIdentityCheck(check.id))?;
        let (Some(first_name), Some(last_name), Some(birth_date)) =
            (identity.first_name(), identity.last_name(), identity.birth_date())
        else {
            return Err(FraudError::FraudCheck(format!(
                "Fraud check {} has incomplete identity data",
                check.id
            )));
        };

        let users = self.store.list_users()?;
        Ok(find_duplicate_beneficiary(
            &users,
            first_name,
            last_name,
            identity.married_name(),
            birth_date,
            check.user_id,
        )
        .cloned())
    }

    pub fn invalidate_fraud_check_for_duplicate_user(
        &self,
        check: &mut BeneficiaryFraudCheck,
        duplicate_user_id: UserId,
        now: NaiveDateTime,
    ) -> Result<(), FraudError> {
        check.status = FraudCheckStatus::Suspicious;
        check.reason_codes.push(FraudReasonCode::DuplicateUser);
        check.reason = Some(format!(
            "Fraud check invalidé: duplicat de l'utilisateur {duplicate_user_id}"
        ));
        check.updated_at = now;
        self.store.update_fraud_check(check.clone())?;
        Ok(())
    }

    /// Masked e-mail of the account that made `rejected_user` a duplicate.
    pub fn get_duplicate_beneficiary_anonymized_email(
        &self,
        rejected_user: &User,
        identity: &dyn IdentityDetails,
        duplicate_reason_code: FraudReasonCode,
    ) -> Result<Option<String>, FraudError> {
        let users = self.store.list_users()?;
        let duplicate = match duplicate_reason_code {
            FraudReasonCode::DuplicateIdPieceNumber => find_duplicate_id_piece_number_user(
                &users,
                identity.id_piece_number(),
                rejected_user.id,
            ),
            FraudReasonCode::DuplicateUser => {
                match (identity.first_name(), identity.last_name(), identity.birth_date()) {
                    (Some(first_name), Some(last_name), Some(birth_date)) => {
                        find_duplicate_beneficiary(
                            &users,
                            first_name,
                            last_name,
                            identity.married_name(),
                            birth_date,
                            rejected_user.id,
                        )
                    }
                    _ => None,
                }
            }
            FraudReasonCode::DuplicateIne => identity
                .ine_hash()
                .and_then(|ine_hash| find_duplicate_ine_hash_user(&users, ine_hash, rejected_user.id)),
            _ => None,
        };

        match duplicate {
            Some(duplicate) => Ok(Some(anonymize_email(&duplicate.email))),
            None => {
                error!(
                    user_id = %rejected_user.id,
                    reason_code = ?duplicate_reason_code,
                    "No duplicate beneficiary found"
                );
                Ok(None)
            }
        }
    }

    pub(crate) fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub(crate) fn notifier(&self) -> &Arc<N> {
        &self.notifier
    }
}
