//! Ordered subscription steps computed from a user and their fraud history.

use chrono::{NaiveDate, NaiveDateTime};

use super::messages::{generic_ko_message, ubble_subscription_message};
use super::models::{
    MessageDraft, SubscriptionItemStatus, SubscriptionStatus, SubscriptionStep,
    UserSubscriptionState, YoungStatus,
};
use crate::dates::age_at_date;
use crate::fraud::api::{
    completed_profile_check, has_admin_ko_review, has_failed_phone_validation,
    has_performed_honor_statement,
};
use crate::fraud::domain::{
    BeneficiaryFraudCheck, BeneficiaryFraudReview, FraudCheckContent, FraudCheckStatus,
    FraudCheckType, FraudReasonCode,
};
use crate::users::eligibility::{
    eligibility_at_date, is_eligible_for_beneficiary_upgrade,
    is_user_age_compatible_with_eligibility,
};
use crate::users::{EligibilityType, User};

pub const MAX_UBBLE_RETRIES: usize = 3;

pub const RESTARTABLE_FRAUD_CHECK_REASON_CODES: [FraudReasonCode; 6] = [
    FraudReasonCode::IdCheckBlocked,
    FraudReasonCode::IdCheckExpired,
    FraudReasonCode::IdCheckNotAuthentic,
    FraudReasonCode::IdCheckNotSupported,
    FraudReasonCode::IdCheckUnprocessable,
    FraudReasonCode::IdCheckDataMatch,
];

const RELEVANT_STATUS_ORDER: [FraudCheckStatus; 5] = [
    FraudCheckStatus::Ok,
    FraudCheckStatus::Pending,
    FraudCheckStatus::Started,
    FraudCheckStatus::Suspicious,
    FraudCheckStatus::Ko,
];

pub fn is_eligibility_activable(
    user: &User,
    eligibility: Option<EligibilityType>,
    now: NaiveDateTime,
) -> bool {
    eligibility.is_some()
        && user.eligibility(now) == eligibility
        && is_eligible_for_beneficiary_upgrade(user, eligibility)
        && is_user_age_compatible_with_eligibility(user.age_at(now.date()), eligibility)
}

/// Identity check that best describes where the user stands for `eligibility`.
pub fn get_relevant_identity_fraud_check(
    checks: &[BeneficiaryFraudCheck],
    eligibility: Option<EligibilityType>,
) -> Option<&BeneficiaryFraudCheck> {
    let mut identity_checks: Vec<&BeneficiaryFraudCheck> = checks
        .iter()
        .filter(|check| check.check_type.is_identity_check() && check.eligibility_type == eligibility)
        .collect();
    identity_checks.sort_by_key(|check| std::cmp::Reverse((check.date_created, check.id)));

    RELEVANT_STATUS_ORDER.iter().find_map(|status| {
        identity_checks
            .iter()
            .find(|check| check.status == *status)
            .copied()
    })
}

pub fn get_identity_check_fraud_status(
    user: &User,
    eligibility: Option<EligibilityType>,
    check: Option<&BeneficiaryFraudCheck>,
    now: NaiveDateTime,
) -> SubscriptionItemStatus {
    if eligibility.is_none() {
        return SubscriptionItemStatus::Void;
    }
    let Some(check) = check else {
        return if is_eligibility_activable(user, eligibility, now) {
            SubscriptionItemStatus::Todo
        } else {
            SubscriptionItemStatus::Void
        };
    };

    match check.status {
        FraudCheckStatus::Ok => SubscriptionItemStatus::Ok,
        FraudCheckStatus::Ko => SubscriptionItemStatus::Ko,
        FraudCheckStatus::Suspicious => SubscriptionItemStatus::Suspicious,
        FraudCheckStatus::Pending => SubscriptionItemStatus::Pending,
        FraudCheckStatus::Started if check.check_type == FraudCheckType::Dms => {
            SubscriptionItemStatus::Pending
        }
        FraudCheckStatus::Started => SubscriptionItemStatus::Todo,
        FraudCheckStatus::Canceled | FraudCheckStatus::Error => SubscriptionItemStatus::Void,
    }
}

/// `checks` holds every check of the user owning `check`.
pub fn can_retry_identity_fraud_check(
    check: &BeneficiaryFraudCheck,
    checks: &[BeneficiaryFraudCheck],
) -> bool {
    match check.check_type {
        FraudCheckType::Educonnect => true,
        FraudCheckType::Ubble => {
            if check.reason_codes.is_empty()
                || !check
                    .reason_codes
                    .iter()
                    .all(|code| RESTARTABLE_FRAUD_CHECK_REASON_CODES.contains(code))
            {
                return false;
            }
            let attempts = checks
                .iter()
                .filter(|attempt| {
                    attempt.check_type == FraudCheckType::Ubble
                        && attempt.eligibility_type == check.eligibility_type
                        && !matches!(
                            attempt.status,
                            FraudCheckStatus::Canceled | FraudCheckStatus::Started
                        )
                })
                .count();
            attempts < MAX_UBBLE_RETRIES
        }
        _ => false,
    }
}

pub fn should_retry_identity_check(
    state: &UserSubscriptionState,
    checks: &[BeneficiaryFraudCheck],
) -> bool {
    match &state.identity_fraud_check {
        Some(check) => {
            state.next_step == Some(SubscriptionStep::IdentityCheck)
                && state.young_status
                    == YoungStatus::Eligible(SubscriptionStatus::HasSubscriptionIssues)
                && can_retry_identity_fraud_check(check, checks)
        }
        None => false,
    }
}

/// Earliest date at which the user registered while their age matched `eligibility`.
pub fn get_first_registration_date(
    checks: &[BeneficiaryFraudCheck],
    birth_date: Option<NaiveDate>,
    eligibility: EligibilityType,
) -> Option<NaiveDateTime> {
    let birth_date = birth_date?;
    checks
        .iter()
        .filter(|check| check.eligibility_type == Some(eligibility))
        .map(BeneficiaryFraudCheck::min_date_between_creation_and_registration)
        .filter(|registered| {
            is_user_age_compatible_with_eligibility(
                Some(age_at_date(birth_date, registered.date())),
                Some(eligibility),
            )
        })
        .min()
}

/// A file-based check accepted although its registration date gave no eligibility.
pub fn requires_manual_review_before_activation(
    user: &User,
    check: &BeneficiaryFraudCheck,
) -> bool {
    check.check_type == FraudCheckType::Dms
        && check.status == FraudCheckStatus::Ok
        && eligibility_at_date(
            user.birth_date(),
            check.min_date_between_creation_and_registration(),
        )
        .is_none()
}

/// A pending file-based procedure already carries the profile answers.
fn filled_dms_fraud_check(
    checks: &[BeneficiaryFraudCheck],
    eligibility: Option<EligibilityType>,
) -> Option<&BeneficiaryFraudCheck> {
    checks.iter().find(|check| {
        check.check_type == FraudCheckType::Dms
            && check.eligibility_type == eligibility
            && matches!(check.status, FraudCheckStatus::Pending | FraudCheckStatus::Started)
            && matches!(
                &check.result_content,
                Some(FraudCheckContent::Identity(content)) if content.city.is_some()
            )
    })
}

pub fn has_completed_profile_for_given_eligibility(
    checks: &[BeneficiaryFraudCheck],
    eligibility: Option<EligibilityType>,
) -> bool {
    completed_profile_check(checks, eligibility).is_some()
        || filled_dms_fraud_check(checks, eligibility).is_some()
}

fn phone_validation_status(
    user: &User,
    eligibility: Option<EligibilityType>,
    checks: &[BeneficiaryFraudCheck],
    now: NaiveDateTime,
) -> Option<SubscriptionItemStatus> {
    if eligibility != Some(EligibilityType::Age18) {
        return None;
    }
    let status = if user.is_phone_validated {
        SubscriptionItemStatus::Ok
    } else if has_failed_phone_validation(checks) {
        SubscriptionItemStatus::Ko
    } else if is_eligibility_activable(user, eligibility, now) {
        SubscriptionItemStatus::Todo
    } else {
        SubscriptionItemStatus::Void
    };
    Some(status)
}

fn identity_check_message(
    user: &User,
    check: Option<&BeneficiaryFraudCheck>,
    checks: &[BeneficiaryFraudCheck],
    support_email: &str,
) -> Option<MessageDraft> {
    let check = check?;
    match check.check_type {
        FraudCheckType::Ubble => ubble_subscription_message(
            check,
            can_retry_identity_fraud_check(check, checks),
            support_email,
        ),
        FraudCheckType::Dms | FraudCheckType::Educonnect => match check.status {
            FraudCheckStatus::Ko | FraudCheckStatus::Suspicious => {
                Some(generic_ko_message(user.id, support_email))
            }
            _ => None,
        },
        _ => Some(generic_ko_message(user.id, support_email)),
    }
}

fn eligible(status: SubscriptionStatus) -> YoungStatus {
    YoungStatus::Eligible(status)
}

pub fn get_user_subscription_state(
    user: &User,
    checks: &[BeneficiaryFraudCheck],
    reviews: &[BeneficiaryFraudReview],
    now: NaiveDateTime,
    support_email: &str,
) -> UserSubscriptionState {
    if !user.is_email_validated {
        return UserSubscriptionState::new(
            SubscriptionItemStatus::Todo,
            Some(SubscriptionStep::EmailValidation),
            eligible(SubscriptionStatus::HasToCompleteSubscription),
        );
    }

    let eligibility = user.eligibility(now);

    if user.is_beneficiary() && !is_eligible_for_beneficiary_upgrade(user, eligibility) {
        let young_status = if user.has_active_deposit(now) {
            YoungStatus::Beneficiary
        } else {
            YoungStatus::ExBeneficiary
        };
        return UserSubscriptionState::new(SubscriptionItemStatus::Ok, None, young_status);
    }

    if has_admin_ko_review(reviews) {
        let mut state =
            UserSubscriptionState::new(SubscriptionItemStatus::Ko, None, YoungStatus::NonEligible);
        state.subscription_message = Some(generic_ko_message(user.id, support_email));
        return state;
    }

    if eligibility.is_none() {
        return UserSubscriptionState::new(
            SubscriptionItemStatus::Void,
            None,
            YoungStatus::NonEligible,
        );
    }

    match phone_validation_status(user, eligibility, checks, now) {
        Some(SubscriptionItemStatus::Ko) => {
            return UserSubscriptionState::new(
                SubscriptionItemStatus::Ko,
                Some(SubscriptionStep::PhoneValidation),
                eligible(SubscriptionStatus::HasSubscriptionIssues),
            )
        }
        Some(SubscriptionItemStatus::Todo) => {
            return UserSubscriptionState::new(
                SubscriptionItemStatus::Todo,
                Some(SubscriptionStep::PhoneValidation),
                eligible(SubscriptionStatus::HasToCompleteSubscription),
            )
        }
        _ => {}
    }

    if !has_completed_profile_for_given_eligibility(checks, eligibility) {
        return UserSubscriptionState::new(
            SubscriptionItemStatus::Todo,
            Some(SubscriptionStep::ProfileCompletion),
            eligible(SubscriptionStatus::HasToCompleteSubscription),
        );
    }

    let identity_check = get_relevant_identity_fraud_check(checks, eligibility);
    let mut fraud_status = get_identity_check_fraud_status(user, eligibility, identity_check, now);
    let message = identity_check_message(user, identity_check, checks, support_email);

    let with_check = |fraud_status, next_step, young_status, message| {
        let mut state = UserSubscriptionState::new(fraud_status, next_step, young_status);
        state.identity_fraud_check = identity_check.cloned();
        state.subscription_message = message;
        state
    };

    match fraud_status {
        SubscriptionItemStatus::Ko | SubscriptionItemStatus::Suspicious => {
            let mut next_step = Some(SubscriptionStep::IdentityCheck);
            match identity_check {
                Some(check) if can_retry_identity_fraud_check(check, checks) => {
                    fraud_status = SubscriptionItemStatus::Todo;
                }
                _ => next_step = None,
            }
            return with_check(
                fraud_status,
                next_step,
                eligible(SubscriptionStatus::HasSubscriptionIssues),
                message,
            );
        }
        SubscriptionItemStatus::Todo => {
            return with_check(
                fraud_status,
                Some(SubscriptionStep::IdentityCheck),
                eligible(SubscriptionStatus::HasToCompleteSubscription),
                message,
            );
        }
        SubscriptionItemStatus::Ok | SubscriptionItemStatus::Pending => {}
        SubscriptionItemStatus::Void => {
            return with_check(
                fraud_status,
                None,
                eligible(SubscriptionStatus::HasSubscriptionIssues),
                Some(generic_ko_message(user.id, support_email)),
            );
        }
    }

    if !has_performed_honor_statement(checks, eligibility) {
        return with_check(
            fraud_status,
            Some(SubscriptionStep::HonorStatement),
            eligible(SubscriptionStatus::HasToCompleteSubscription),
            None,
        );
    }

    if fraud_status == SubscriptionItemStatus::Ok {
        let mut state = with_check(
            fraud_status,
            None,
            eligible(SubscriptionStatus::HasSubscriptionPending),
            None,
        );
        state.is_activable = identity_check
            .map(|check| !requires_manual_review_before_activation(user, check))
            .unwrap_or(false);
        return state;
    }

    with_check(
        fraud_status,
        None,
        eligible(SubscriptionStatus::HasSubscriptionPending),
        message,
    )
}
