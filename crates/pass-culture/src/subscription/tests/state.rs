use super::common::*;
use crate::finance::deposit::{DepositType, GRANT_18_AMOUNT_V2};
use crate::fraud::domain::{
    BeneficiaryFraudReview, FraudCheckStatus, FraudReasonCode, FraudReviewStatus,
};
use crate::ids::{FraudReviewId, UserId};
use crate::notifications::Notification;
use crate::store::{FraudCheckRepository, FraudReviewRepository, UserRepository};
use crate::subscription::api::department_code;
use crate::subscription::messages::RETRY_IDENTITY_CHECK_LINK;
use crate::subscription::models::{
    SubscriptionItemStatus, SubscriptionStatus, SubscriptionStep, YoungStatus,
};
use crate::subscription::status::should_retry_identity_check;
use crate::users::EligibilityType;

const AGE18: Option<EligibilityType> = Some(EligibilityType::Age18);

#[test]
fn unvalidated_email_comes_first() {
    let harness = Harness::new();
    let mut user = harness.user(date(2004, 6, 1));
    user.is_email_validated = false;

    let state = harness
        .service
        .get_user_subscription_state(&user, now())
        .expect("state computed");

    assert_eq!(state.fraud_status, SubscriptionItemStatus::Todo);
    assert_eq!(state.next_step, Some(SubscriptionStep::EmailValidation));
    assert_eq!(
        state.young_status,
        YoungStatus::Eligible(SubscriptionStatus::HasToCompleteSubscription)
    );
}

#[test]
fn too_old_user_is_not_eligible() {
    let harness = Harness::new();
    let user = harness.user(date(2000, 1, 1));

    let state = harness
        .service
        .get_user_subscription_state(&user, now())
        .expect("state computed");

    assert_eq!(state.fraud_status, SubscriptionItemStatus::Void);
    assert_eq!(state.next_step, None);
    assert_eq!(state.young_status, YoungStatus::NonEligible);
}

#[test]
fn adult_steps_follow_phone_profile_then_identity() {
    let harness = Harness::new();
    let mut user = harness.user(date(2004, 6, 1));
    user.is_phone_validated = false;
    harness.store.update_user(user.clone()).expect("updated");

    let state = harness
        .service
        .get_user_subscription_state(&user, now())
        .expect("state computed");
    assert_eq!(state.next_step, Some(SubscriptionStep::PhoneValidation));

    user.is_phone_validated = true;
    harness.store.update_user(user.clone()).expect("updated");
    let state = harness
        .service
        .get_user_subscription_state(&user, now())
        .expect("state computed");
    assert_eq!(state.next_step, Some(SubscriptionStep::ProfileCompletion));

    harness.complete_profile(&user);
    let user = harness.refreshed(&user);
    assert_eq!(user.city.as_deref(), Some("Paris"));
    assert_eq!(user.department_code.as_deref(), Some("75"));

    let state = harness
        .service
        .get_user_subscription_state(&user, now())
        .expect("state computed");
    assert_eq!(state.fraud_status, SubscriptionItemStatus::Todo);
    assert_eq!(state.next_step, Some(SubscriptionStep::IdentityCheck));
}

#[test]
fn honor_statement_activates_an_adult_with_a_valid_identity() {
    let harness = Harness::new();
    let user = harness.user(date(2004, 6, 1));
    harness.complete_profile(&user);
    harness.identity_check(&user, FraudCheckStatus::Ok, AGE18, valid_document(date(2004, 6, 1)));

    let state = harness
        .service
        .get_user_subscription_state(&harness.refreshed(&user), now())
        .expect("state computed");
    assert_eq!(state.fraud_status, SubscriptionItemStatus::Ok);
    assert_eq!(state.next_step, Some(SubscriptionStep::HonorStatement));
    assert!(!state.is_activable);

    let mut user = harness.refreshed(&user);
    let activated = harness
        .service
        .submit_honor_statement(&mut user, now())
        .expect("honor statement stored");
    assert!(activated);

    let beneficiary = harness.refreshed(&user);
    assert!(beneficiary.has_beneficiary_role());
    assert_eq!(beneficiary.validated_birth_date, Some(date(2004, 6, 1)));
    assert_eq!(beneficiary.id_piece_number.as_deref(), Some("123456789012"));
    let deposit = beneficiary.deposit().expect("deposit granted");
    assert_eq!(deposit.deposit_type, DepositType::Grant18);
    assert_eq!(deposit.amount, GRANT_18_AMOUNT_V2);
    assert!(harness.notifier.sent().contains(&Notification::AcceptedAsBeneficiary {
        user_id: user.id,
        email: user.email.clone(),
        eligibility: EligibilityType::Age18,
    }));

    let state = harness
        .service
        .get_user_subscription_state(&beneficiary, now())
        .expect("state computed");
    assert_eq!(state.young_status, YoungStatus::Beneficiary);
    assert_eq!(state.next_step, None);
}

#[test]
fn underage_credit_depends_on_age_at_registration() {
    let harness = Harness::new();
    let user = harness.user(date(2006, 6, 1));
    harness.complete_profile(&user);
    harness.identity_check(
        &user,
        FraudCheckStatus::Ok,
        Some(EligibilityType::Underage),
        valid_document(date(2006, 6, 1)),
    );

    let mut user = harness.refreshed(&user);
    assert!(harness
        .service
        .submit_honor_statement(&mut user, now())
        .expect("honor statement stored"));

    let beneficiary = harness.refreshed(&user);
    assert!(beneficiary.has_underage_beneficiary_role());
    let deposit = beneficiary.deposit().expect("deposit granted");
    assert_eq!(deposit.deposit_type, DepositType::Grant15_17);
    assert_eq!(deposit.amount, 30_00);
    assert_eq!(
        deposit.expiration_date,
        date(2024, 6, 1).and_hms_opt(0, 0, 0).expect("valid time")
    );
}

#[test]
fn admin_rejection_closes_the_subscription() {
    let harness = Harness::new();
    let user = harness.user(date(2004, 6, 1));
    harness
        .store
        .insert_fraud_review(BeneficiaryFraudReview {
            id: FraudReviewId(1),
            user_id: user.id,
            author_id: UserId(999),
            review: FraudReviewStatus::Ko,
            reason: Some("document falsifié".to_string()),
            eligibility_type: AGE18,
            date_reviewed: now(),
        })
        .expect("review stored");

    let state = harness
        .service
        .get_user_subscription_state(&user, now())
        .expect("state computed");

    assert_eq!(state.fraud_status, SubscriptionItemStatus::Ko);
    assert_eq!(state.young_status, YoungStatus::NonEligible);
    let message = state.subscription_message.expect("generic message");
    assert!(message.user_message.starts_with("Ton dossier a été rejeté"));
}

#[test]
fn retryable_rejection_invites_a_new_attempt() {
    let harness = Harness::new();
    let user = harness.user(date(2004, 6, 1));
    harness.complete_profile(&user);
    let mut check = harness.identity_check(
        &user,
        FraudCheckStatus::Ko,
        AGE18,
        valid_document(date(2004, 6, 1)),
    );
    check.reason_codes = vec![FraudReasonCode::IdCheckExpired];
    harness.store.update_fraud_check(check).expect("updated");

    let state = harness
        .service
        .get_user_subscription_state(&user, now())
        .expect("state computed");

    assert_eq!(state.fraud_status, SubscriptionItemStatus::Todo);
    assert_eq!(state.next_step, Some(SubscriptionStep::IdentityCheck));
    assert_eq!(
        state.young_status,
        YoungStatus::Eligible(SubscriptionStatus::HasSubscriptionIssues)
    );
    let call_to_action = state
        .subscription_message
        .as_ref()
        .and_then(|message| message.call_to_action.clone())
        .expect("retry call to action");
    assert_eq!(call_to_action.link, RETRY_IDENTITY_CHECK_LINK);

    let checks = harness.store.user_fraud_checks(user.id).expect("checks");
    assert!(should_retry_identity_check(&state, &checks));
}

#[test]
fn duplicate_rejection_is_final() {
    let harness = Harness::new();
    let user = harness.user(date(2004, 6, 1));
    harness.complete_profile(&user);
    let mut check = harness.identity_check(
        &user,
        FraudCheckStatus::Suspicious,
        AGE18,
        valid_document(date(2004, 6, 1)),
    );
    check.reason_codes = vec![FraudReasonCode::DuplicateUser];
    harness.store.update_fraud_check(check).expect("updated");

    let state = harness
        .service
        .get_user_subscription_state(&user, now())
        .expect("state computed");

    assert_eq!(state.fraud_status, SubscriptionItemStatus::Suspicious);
    assert_eq!(state.next_step, None);
    let message = state.subscription_message.expect("blocked message");
    assert_eq!(
        message.user_message,
        "Ton dossier a été bloqué : Il y a déjà un compte à ton nom sur le pass Culture. Tu peux contacter le support pour plus d'informations."
    );
}

#[test]
fn overseas_postal_codes_keep_three_digits() {
    assert_eq!(department_code("97411"), "974");
    assert_eq!(department_code(" 75002"), "75");
    assert_eq!(department_code("2A004"), "2A");
}
