//! Manual review of a beneficiary by a back-office agent.

use chrono::NaiveDateTime;
use tracing::info;

use super::api::{last_filled_identity_fraud_check, FraudError};
use super::checks::{find_duplicate_id_piece_number_user, find_duplicate_ine_hash_user};
use super::domain::{BeneficiaryFraudReview, FraudReasonCode, FraudReviewStatus};
use crate::finance::deposit::DepositError;
use crate::ids::{FraudReviewId, Sequence, UserId};
use crate::notifications::{Notification, Notifier};
use crate::store::Store;
use crate::subscription::api::{SubscriptionError, SubscriptionService};
use crate::users::eligibility::decide_eligibility;
use crate::users::{update_user_information_from_external_source, EligibilityType, User};

pub const DMS_REDIRECTION_REASON: &str = "Redirigé vers DMS";

fn activation_error(error: SubscriptionError, eligibility: EligibilityType) -> FraudError {
    match error {
        SubscriptionError::InvalidAge(None) => FraudError::Eligibility(
            "L'âge de l'utilisateur à l'inscription n'a pas pu être déterminé".to_string(),
        ),
        SubscriptionError::InvalidAge(Some(age)) => FraudError::Eligibility(format!(
            "L'âge de l'utilisateur à l'inscription ({age} ans) est incompatible avec l'éligibilité choisie"
        )),
        SubscriptionError::CannotUpgradeBeneficiaryRole(_) => FraudError::Eligibility(format!(
            "L'utilisateur ne peut pas être promu au rôle {}",
            eligibility.label()
        )),
        SubscriptionError::Deposit(DepositError::UserHasAlreadyActiveDeposit) => {
            FraudError::Eligibility(format!(
                "L'utilisateur bénéficie déjà d'un crédit non expiré du type '{}'",
                eligibility.label()
            ))
        }
        SubscriptionError::Deposit(DepositError::DepositTypeAlreadyGranted(_)) => {
            FraudError::Eligibility(
                "Un crédit identique a déjà été accordé à l'utilisateur".to_string(),
            )
        }
        SubscriptionError::Deposit(DepositError::UserNotGrantable(message)) => {
            FraudError::Eligibility(message)
        }
        SubscriptionError::Repository(error) => FraudError::Repository(error),
        SubscriptionError::Notifier(error) => FraudError::Notifier(error),
        SubscriptionError::Fraud(error) => error,
        SubscriptionError::UserNotFound(user_id) => FraudError::UserNotFound(user_id),
    }
}

fn handle_ok_manual_review<S, N>(
    subscription: &SubscriptionService<S, N>,
    user: &mut User,
    eligibility: Option<EligibilityType>,
    now: NaiveDateTime,
) -> Result<(), FraudError>
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let store = subscription.store();
    let checks = store.user_fraud_checks(user.id)?;
    let check = last_filled_identity_fraud_check(&checks).ok_or_else(|| {
        FraudError::FraudCheck("Pas de vérification d'identité effectuée".to_string())
    })?;
    let identity = check
        .identity()
        .ok_or(FraudError::NotAnIdentityCheck(check.id))?;

    let id_piece_number = user
        .id_piece_number
        .clone()
        .or_else(|| identity.id_piece_number().map(str::to_string));

    let users = store.list_users()?;
    if let Some(number) = id_piece_number.as_deref().filter(|number| !number.is_empty()) {
        if let Some(duplicate) = find_duplicate_id_piece_number_user(&users, Some(number), user.id) {
            return Err(FraudError::FraudCheck(format!(
                "Le numéro de CNI {number} est déjà utilisé par l'utilisateur {}",
                duplicate.id
            )));
        }
    }
    if let Some(ine_hash) = identity.ine_hash() {
        if let Some(duplicate) = find_duplicate_ine_hash_user(&users, ine_hash, user.id) {
            return Err(FraudError::FraudCheck(format!(
                "Le numéro INE {ine_hash} est déjà utilisé par l'utilisateur {}",
                duplicate.id
            )));
        }
    }

    update_user_information_from_external_source(user, identity, id_piece_number.as_deref());

    let eligibility = eligibility
        .or_else(|| {
            decide_eligibility(
                user.birth_date(),
                Some(check.min_date_between_creation_and_registration()),
                now,
            )
        })
        .ok_or_else(|| {
            FraudError::Eligibility(
                "Aucune éligibilité trouvée. Veuillez renseigner une éligibilité.".to_string(),
            )
        })?;

    subscription
        .activate_beneficiary_for_eligibility(
            user,
            &checks,
            &check.detailed_source(),
            eligibility,
            now,
        )
        .map_err(|error| activation_error(error, eligibility))
}

/// Record an agent's verdict on `user_id` and apply its consequences.
pub fn validate_beneficiary<S, N>(
    subscription: &SubscriptionService<S, N>,
    user_id: UserId,
    reviewer_id: UserId,
    reason: Option<String>,
    review: FraudReviewStatus,
    reviewed_eligibility: Option<EligibilityType>,
    now: NaiveDateTime,
) -> Result<BeneficiaryFraudReview, FraudError>
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    let store = subscription.store();
    let mut user = store
        .fetch_user(user_id)?
        .ok_or(FraudError::UserNotFound(user_id))?;

    let current_eligibility = user.eligibility(now);
    let mut reason = reason;

    match review {
        FraudReviewStatus::Ok => {
            let eligibility = current_eligibility.and(reviewed_eligibility);
            handle_ok_manual_review(subscription, &mut user, eligibility, now)?;
        }
        FraudReviewStatus::RedirectedToDms => {
            reason = Some(match reason {
                Some(reason) => format!("{reason} ; {DMS_REDIRECTION_REASON}"),
                None => DMS_REDIRECTION_REASON.to_string(),
            });
            subscription
                .fraud()
                .notifier()
                .send(Notification::SubscriptionDocumentError {
                    email: user.email.clone(),
                    code: FraudReasonCode::IdCheckUnprocessable,
                })?;
        }
        FraudReviewStatus::Ko => {}
    }

    let id = FraudReviewId(store.next_id(Sequence::FraudReview)?);
    let stored = store.insert_fraud_review(BeneficiaryFraudReview {
        id,
        user_id,
        author_id: reviewer_id,
        review,
        reason,
        eligibility_type: reviewed_eligibility.or(current_eligibility),
        date_reviewed: now,
    })?;
    info!(
        user_id = %user_id,
        reviewer_id = %reviewer_id,
        review = ?review,
        "Beneficiary fraud review recorded"
    );
    Ok(stored)
}
