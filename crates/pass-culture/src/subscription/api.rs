use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::info;

use super::models::UserSubscriptionState;
use super::status::{get_first_registration_date, get_user_subscription_state};
use crate::dates::age_at_date;
use crate::finance::deposit::{create_deposit, DepositError};
use crate::fraud::api::{FraudError, FraudService};
use crate::fraud::domain::{
    BeneficiaryFraudCheck, FraudCheckStatus, FraudCheckType, FraudReasonCode,
    ProfileCompletionContent,
};
use crate::ids::{DepositId, FraudCheckId, Sequence, UserId};
use crate::notifications::{Notification, Notifier, NotifierError};
use crate::store::{RepositoryError, Store};
use crate::users::eligibility::{
    decide_eligibility, is_eligible_for_beneficiary_upgrade, ELIGIBILITY_AGE_18,
    ELIGIBILITY_UNDERAGE_RANGE,
};
use crate::users::{update_user_information_from_external_source, EligibilityType, User};

pub const DEPRECATED_UBBLE_PREFIX: &str = "deprecated-";
pub const PROFILE_COMPLETION_ORIGIN: &str = "Completed in application step";
pub const HONOR_STATEMENT_ORIGIN: &str = "statement from /subscription/honor_statement endpoint";

const ELIGIBILITY_CHANGED_REASON: &str = "Eligibility type changed by the identity provider";

/// Error raised while moving a user through the subscription steps.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Notifier(#[from] NotifierError),
    #[error(transparent)]
    Fraud(#[from] FraudError),
    #[error(transparent)]
    Deposit(#[from] DepositError),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("age at registration {0:?} is incompatible with the eligibility")]
    InvalidAge(Option<u32>),
    #[error("user cannot be upgraded to {}", .0.label())]
    CannotUpgradeBeneficiaryRole(EligibilityType),
}

/// Answers of the profile completion step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfileForm {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub address: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub activity: String,
    #[serde(default)]
    pub school_type: Option<String>,
}

/// Overseas postal codes keep three digits.
pub fn department_code(postal_code: &str) -> String {
    let postal_code = postal_code.trim();
    let length = if postal_code.starts_with("97") || postal_code.starts_with("98") {
        3
    } else {
        2
    };
    postal_code.chars().take(length).collect()
}

pub struct SubscriptionService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    fraud: FraudService<S, N>,
    support_email: String,
}

impl<S, N> SubscriptionService<S, N>
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, support_email: impl Into<String>) -> Self {
        let fraud = FraudService::new(store.clone(), notifier.clone());
        Self {
            store,
            notifier,
            fraud,
            support_email: support_email.into(),
        }
    }

    pub fn fraud(&self) -> &FraudService<S, N> {
        &self.fraud
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn support_email(&self) -> &str {
        &self.support_email
    }

    pub fn fetch_user(&self, user_id: UserId) -> Result<User, SubscriptionError> {
        self.store
            .fetch_user(user_id)?
            .ok_or(SubscriptionError::UserNotFound(user_id))
    }

    pub fn get_user_subscription_state(
        &self,
        user: &User,
        now: NaiveDateTime,
    ) -> Result<UserSubscriptionState, SubscriptionError> {
        let checks = self.store.user_fraud_checks(user.id)?;
        let reviews = self.store.user_fraud_reviews(user.id)?;
        Ok(get_user_subscription_state(
            user,
            &checks,
            &reviews,
            now,
            &self.support_email,
        ))
    }

    fn age_at_first_registration(
        user: &User,
        checks: &[BeneficiaryFraudCheck],
        eligibility: EligibilityType,
        now: NaiveDateTime,
    ) -> Option<u32> {
        let birth_date = user.birth_date()?;
        let Some(registered) = get_first_registration_date(checks, Some(birth_date), eligibility)
        else {
            return user.age_at(now.date());
        };

        let age = age_at_date(birth_date, registered.date());
        if eligibility == EligibilityType::Underage && !ELIGIBILITY_UNDERAGE_RANGE.contains(&age) {
            return None;
        }
        Some(age)
    }

    /// Grant the role and the deposit matching `eligibility`, then persist the user.
    pub fn activate_beneficiary_for_eligibility(
        &self,
        user: &mut User,
        checks: &[BeneficiaryFraudCheck],
        source: &str,
        eligibility: EligibilityType,
        now: NaiveDateTime,
    ) -> Result<(), SubscriptionError> {
        if !is_eligible_for_beneficiary_upgrade(user, Some(eligibility)) {
            return Err(SubscriptionError::CannotUpgradeBeneficiaryRole(eligibility));
        }

        let age_at_registration = match eligibility {
            EligibilityType::Underage => {
                let age = Self::age_at_first_registration(user, checks, eligibility, now);
                match age {
                    Some(age) if ELIGIBILITY_UNDERAGE_RANGE.contains(&age) => age,
                    other => return Err(SubscriptionError::InvalidAge(other)),
                }
            }
            EligibilityType::Age18 => ELIGIBILITY_AGE_18,
        };

        let deposit_id = DepositId(self.store.next_id(Sequence::Deposit)?);
        let deposit = create_deposit(
            user,
            deposit_id,
            source,
            eligibility,
            Some(age_at_registration),
            now,
        )?;

        match eligibility {
            EligibilityType::Underage => user.add_underage_beneficiary_role(),
            EligibilityType::Age18 => user.add_beneficiary_role(),
        }
        info!(
            user_id = %user.id,
            source = %deposit.source,
            "Activated beneficiary and created deposit"
        );
        user.deposits.push(deposit);
        self.store.update_user(user.clone())?;

        self.notifier.send(Notification::AcceptedAsBeneficiary {
            user_id: user.id,
            email: user.email.clone(),
            eligibility,
        })?;
        Ok(())
    }

    /// Activate the user when every subscription step is complete.
    pub fn activate_beneficiary_if_no_missing_step(
        &self,
        user: &mut User,
        now: NaiveDateTime,
    ) -> Result<bool, SubscriptionError> {
        let state = self.get_user_subscription_state(user, now)?;
        if !state.is_activable {
            return Ok(false);
        }
        let Some(mut check) = state.identity_fraud_check else {
            return Ok(false);
        };
        if check.result_content.is_none() {
            return Ok(false);
        }
        let Some(eligibility) = user.eligibility(now) else {
            return Ok(false);
        };

        if let Some(duplicate) = self.fraud.get_duplicate_beneficiary(&check)? {
            self.fraud
                .invalidate_fraud_check_for_duplicate_user(&mut check, duplicate.id, now)?;
            return Ok(false);
        }

        if let Some(identity) = check.identity() {
            update_user_information_from_external_source(user, identity, identity.id_piece_number());
        }

        let checks = self.store.user_fraud_checks(user.id)?;
        match self.activate_beneficiary_for_eligibility(
            user,
            &checks,
            &check.detailed_source(),
            eligibility,
            now,
        ) {
            Ok(()) => Ok(true),
            Err(SubscriptionError::Deposit(
                DepositError::DepositTypeAlreadyGranted(_) | DepositError::UserHasAlreadyActiveDeposit,
            )) => {
                info!(user_id = %user.id, "A deposit already exists for user");
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    /// Cancel `check` and store a copy carrying `eligibility`.
    fn update_fraud_check_eligibility_with_history(
        &self,
        mut check: BeneficiaryFraudCheck,
        eligibility: EligibilityType,
        now: NaiveDateTime,
    ) -> Result<BeneficiaryFraudCheck, SubscriptionError> {
        let id = FraudCheckId(self.store.next_id(Sequence::FraudCheck)?);
        let mut replacement = check.clone();
        replacement.id = id;
        replacement.eligibility_type = Some(eligibility);
        replacement.date_created = now;
        replacement.updated_at = now;
        replacement.id_pictures_stored = None;

        check.status = FraudCheckStatus::Canceled;
        check.append_reason(ELIGIBILITY_CHANGED_REASON);
        check.reason_codes.push(FraudReasonCode::EligibilityChanged);
        check.third_party_id = format!("{DEPRECATED_UBBLE_PREFIX}{}", check.third_party_id);
        check.updated_at = now;

        self.store.update_fraud_check(check)?;
        Ok(self.store.insert_fraud_check(replacement)?)
    }

    /// Move the user's checks to the eligibility certified by the identity provider.
    pub fn handle_eligibility_difference_between_declaration_and_identity_provider(
        &self,
        user: &User,
        check: BeneficiaryFraudCheck,
        now: NaiveDateTime,
    ) -> Result<BeneficiaryFraudCheck, SubscriptionError> {
        let Some(identity) = check.identity() else {
            return Ok(check);
        };
        let declared = check.eligibility_type;
        let detected = decide_eligibility(
            identity.birth_date(),
            identity.registration_datetime(),
            now,
        );
        let Some(detected) = detected.filter(|detected| Some(*detected) != declared) else {
            return Ok(check);
        };

        let updated = self.update_fraud_check_eligibility_with_history(check, detected, now)?;

        let checks = self.store.user_fraud_checks(user.id)?;
        for check_type in [FraudCheckType::ProfileCompletion, FraudCheckType::HonorStatement] {
            let related = checks
                .iter()
                .find(|other| other.check_type == check_type && other.eligibility_type == declared)
                .cloned();
            if let Some(related) = related {
                self.update_fraud_check_eligibility_with_history(related, detected, now)?;
            }
        }
        Ok(updated)
    }

    pub fn update_user_birth_date_if_not_beneficiary(
        &self,
        user: &mut User,
        birth_date: Option<NaiveDate>,
        now: NaiveDateTime,
    ) -> Result<(), SubscriptionError> {
        let Some(birth_date) = birth_date else {
            return Ok(());
        };
        if user.validated_birth_date == Some(birth_date) {
            return Ok(());
        }
        if is_eligible_for_beneficiary_upgrade(user, user.eligibility(now))
            || user.validated_birth_date.is_none()
        {
            user.validated_birth_date = Some(birth_date);
            self.store.update_user(user.clone())?;
        }
        Ok(())
    }

    pub fn complete_profile(
        &self,
        user: &mut User,
        profile: ProfileForm,
        now: NaiveDateTime,
    ) -> Result<(), SubscriptionError> {
        user.address = profile.address.clone();
        user.city = Some(profile.city.clone());
        user.postal_code = Some(profile.postal_code.clone());
        user.department_code = Some(department_code(&profile.postal_code));
        if user.first_name.is_none() {
            user.first_name = Some(profile.first_name.clone());
        }
        if user.last_name.is_none() {
            user.last_name = Some(profile.last_name.clone());
        }
        self.store.update_user(user.clone())?;

        let content = ProfileCompletionContent {
            first_name: profile.first_name,
            last_name: profile.last_name,
            address: profile.address,
            city: profile.city,
            postal_code: profile.postal_code,
            activity: profile.activity,
            school_type: profile.school_type,
            origin: PROFILE_COMPLETION_ORIGIN.to_string(),
        };
        self.fraud
            .create_profile_completion_fraud_check(user, user.eligibility(now), content, now)?;
        info!(user_id = %user.id, "User completed profile step");
        Ok(())
    }

    /// Record the honor statement and activate the user when nothing else is missing.
    pub fn submit_honor_statement(
        &self,
        user: &mut User,
        now: NaiveDateTime,
    ) -> Result<bool, SubscriptionError> {
        self.fraud
            .create_honor_statement_fraud_check(user, HONOR_STATEMENT_ORIGIN, None, now)?;
        self.activate_beneficiary_if_no_missing_step(user, now)
    }
}
