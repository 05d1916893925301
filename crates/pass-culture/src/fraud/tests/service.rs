use super::common::*;
use crate::finance::deposit::DepositType;
use crate::fraud::domain::{
    FraudCheckContent, FraudCheckStatus, FraudCheckType, FraudReasonCode,
    ProfileCompletionContent,
};
use crate::fraud::FraudError;
use crate::notifications::Notification;
use crate::store::{FraudCheckRepository, UserRepository};
use crate::users::{EligibilityType, SuspensionReason};

#[test]
fn valid_identity_check_is_marked_ok() {
    let harness = Harness::new();
    let user = harness.user("lea@example.com", date(2004, 6, 1));
    let mut check = harness.check(
        &user,
        FraudCheckType::Ubble,
        FraudCheckStatus::Pending,
        Some(EligibilityType::Age18),
        Some(FraudCheckContent::Ubble(ubble_content(
            "Léa",
            "Martin",
            date(2004, 6, 1),
        ))),
    );

    let items = harness
        .fraud()
        .on_identity_fraud_check_result(&user, &mut check, now())
        .expect("fraud items computed");

    assert!(!items.is_empty());
    assert_eq!(check.status, FraudCheckStatus::Ok);
    let stored = harness
        .store
        .fetch_fraud_check(check.id)
        .expect("fetch")
        .expect("check exists");
    assert_eq!(stored.status, FraudCheckStatus::Ok);
    assert!(stored.reason_codes.is_empty());
}

#[test]
fn unvalidated_email_and_missing_eligibility_are_refused() {
    let harness = Harness::new();
    let mut user = harness.user("lea@example.com", date(2004, 6, 1));
    user.is_email_validated = false;
    harness.store.update_user(user.clone()).expect("updated");
    let mut check = harness.check(
        &user,
        FraudCheckType::Ubble,
        FraudCheckStatus::Pending,
        None,
        Some(FraudCheckContent::Ubble(ubble_content(
            "Léa",
            "Martin",
            date(2004, 6, 1),
        ))),
    );

    harness
        .fraud()
        .on_identity_fraud_check_result(&user, &mut check, now())
        .expect("fraud items computed");

    assert_eq!(check.status, FraudCheckStatus::Ko);
    assert_eq!(
        check.reason_codes,
        vec![FraudReasonCode::EmailNotValidated, FraudReasonCode::NotEligible]
    );
}

#[test]
fn incomplete_identity_is_suspicious() {
    let harness = Harness::new();
    let user = harness.user("lea@example.com", date(2004, 6, 1));
    let mut content = dms_content("Léa", "Martin", date(2004, 6, 1));
    content.birth_date = None;
    let mut check = harness.check(
        &user,
        FraudCheckType::Dms,
        FraudCheckStatus::Started,
        Some(EligibilityType::Age18),
        Some(FraudCheckContent::Identity(content)),
    );

    harness
        .fraud()
        .on_identity_fraud_check_result(&user, &mut check, now())
        .expect("fraud items computed");

    assert_eq!(check.status, FraudCheckStatus::Suspicious);
    assert_eq!(check.reason_codes, vec![FraudReasonCode::MissingRequiredData]);
}

#[test]
fn non_identity_check_is_rejected() {
    let harness = Harness::new();
    let user = harness.user("lea@example.com", date(2004, 6, 1));
    let mut check = harness.check(
        &user,
        FraudCheckType::HonorStatement,
        FraudCheckStatus::Ok,
        Some(EligibilityType::Age18),
        None,
    );

    match harness
        .fraud()
        .on_identity_fraud_check_result(&user, &mut check, now())
    {
        Err(FraudError::NotAnIdentityCheck(id)) => assert_eq!(id, check.id),
        other => panic!("expected NotAnIdentityCheck, got {other:?}"),
    }
}

#[test]
fn underage_duplicate_suspends_both_accounts() {
    let harness = Harness::new();
    let original = harness.beneficiary(
        "first@example.com",
        "Jeanne",
        "Doe",
        date(2006, 5, 1),
        DepositType::Grant15_17,
    );
    let second = harness.beneficiary(
        "second@example.com",
        "Janet",
        "Other",
        date(2006, 5, 1),
        DepositType::Grant15_17,
    );
    let mut check = harness.check(
        &second,
        FraudCheckType::Ubble,
        FraudCheckStatus::Pending,
        Some(EligibilityType::Underage),
        Some(FraudCheckContent::Ubble(ubble_content(
            "Jeanne",
            "Doe",
            date(2006, 5, 1),
        ))),
    );

    harness
        .fraud()
        .on_identity_fraud_check_result(&second, &mut check, now())
        .expect("fraud items computed");

    assert_eq!(check.status, FraudCheckStatus::Suspicious);
    assert!(check.reason_codes.contains(&FraudReasonCode::DuplicateUser));

    for id in [original.id, second.id] {
        let account = harness.store.fetch_user(id).expect("fetch").expect("exists");
        assert!(!account.is_active);
        assert_eq!(
            account.suspension.map(|suspension| suspension.reason),
            Some(SuspensionReason::FraudSuspicion)
        );
    }
    assert_eq!(
        harness.notifier.sent(),
        vec![Notification::DuplicateFraudDetection {
            user_id: second.id,
            duplicate_id: original.id,
        }]
    );
}

#[test]
fn adult_duplicate_is_flagged_without_suspension() {
    let harness = Harness::new();
    harness.beneficiary(
        "first@example.com",
        "Jeanne",
        "Doe",
        date(2004, 6, 1),
        DepositType::Grant18,
    );
    let user = harness.user("second@example.com", date(2004, 6, 1));
    let mut check = harness.check(
        &user,
        FraudCheckType::Ubble,
        FraudCheckStatus::Pending,
        Some(EligibilityType::Age18),
        Some(FraudCheckContent::Ubble(ubble_content(
            "Jeanne",
            "Doe",
            date(2004, 6, 1),
        ))),
    );

    harness
        .fraud()
        .on_identity_fraud_check_result(&user, &mut check, now())
        .expect("fraud items computed");

    assert_eq!(check.status, FraudCheckStatus::Suspicious);
    let refreshed = harness.store.fetch_user(user.id).expect("fetch").expect("exists");
    assert!(refreshed.is_active);
    assert!(harness.notifier.sent().is_empty());
}

#[test]
fn phone_already_used_records_failed_validation() {
    let harness = Harness::new();
    let mut owner = harness.user("owner@example.com", date(2004, 6, 1));
    owner.phone_number = Some("+33612345678".to_string());
    owner.is_phone_validated = true;
    harness.store.update_user(owner.clone()).expect("updated");
    let user = harness.user("lea@example.com", date(2004, 6, 1));

    let check = harness
        .fraud()
        .handle_phone_already_exists(&user, "+33612345678", now())
        .expect("check created");

    assert_eq!(check.check_type, FraudCheckType::PhoneValidation);
    assert_eq!(check.status, FraudCheckStatus::Ko);
    assert_eq!(check.reason_codes, vec![FraudReasonCode::PhoneAlreadyExists]);
    assert_eq!(
        check.reason,
        Some(format!("Le numéro est déjà utilisé par l'utilisateur {}", owner.id))
    );
    assert_eq!(check.eligibility_type, Some(EligibilityType::Age18));
}

#[test]
fn phone_already_used_requires_an_owner() {
    let harness = Harness::new();
    let user = harness.user("lea@example.com", date(2004, 6, 1));

    match harness
        .fraud()
        .handle_phone_already_exists(&user, "+33600000000", now())
    {
        Err(FraudError::PhoneOwnerNotFound(phone)) => assert_eq!(phone, "+33600000000"),
        other => panic!("expected PhoneOwnerNotFound, got {other:?}"),
    }
}

#[test]
fn phone_limits_keep_the_attempt_count() {
    let harness = Harness::new();
    let mut user = harness.user("lea@example.com", date(2004, 6, 1));
    user.phone_number = Some("+33611111111".to_string());
    let fraud = harness.fraud();

    let attempts = fraud
        .handle_phone_validation_attempts_limit_reached(&user, 3, now())
        .expect("check created");
    assert_eq!(
        attempts.reason.as_deref(),
        Some("Le nombre maximum de tentatives de validation est atteint: 3")
    );
    assert_eq!(
        attempts.result_content,
        Some(FraudCheckContent::PhoneValidation {
            phone_number: Some("+33611111111".to_string())
        })
    );

    let sms = fraud
        .handle_sms_sending_limit_reached(&user, now())
        .expect("check created");
    assert_eq!(sms.reason_codes, vec![FraudReasonCode::SmsSendingLimitReached]);

    let blacklisted = fraud
        .handle_blacklisted_sms_recipient(&user, "+33699999999", now())
        .expect("check created");
    assert_eq!(blacklisted.reason_codes, vec![FraudReasonCode::BlacklistedPhoneNumber]);

    let country = fraud
        .handle_invalid_country_code(&user, "+1555", now())
        .expect("check created");
    assert_eq!(country.reason_codes, vec![FraudReasonCode::InvalidPhoneCountryCode]);

    assert_eq!(
        harness.store.user_fraud_checks(user.id).expect("checks").len(),
        4
    );
}

#[test]
fn profile_completion_is_recorded_once_per_eligibility() {
    let harness = Harness::new();
    let user = harness.user("lea@example.com", date(2004, 6, 1));
    let fraud = harness.fraud();
    let content = ProfileCompletionContent {
        first_name: "Léa".to_string(),
        last_name: "Martin".to_string(),
        city: "Paris".to_string(),
        postal_code: "75011".to_string(),
        activity: "Étudiant".to_string(),
        origin: "Completed in application step".to_string(),
        ..ProfileCompletionContent::default()
    };

    let first = fraud
        .create_profile_completion_fraud_check(
            &user,
            Some(EligibilityType::Age18),
            content.clone(),
            now(),
        )
        .expect("created");
    assert!(first.is_some());

    let second = fraud
        .create_profile_completion_fraud_check(&user, Some(EligibilityType::Age18), content, now())
        .expect("skipped");
    assert!(second.is_none());
}

#[test]
fn pending_identity_check_is_scoped_to_current_eligibility() {
    let harness = Harness::new();
    let user = harness.user("lea@example.com", date(2004, 6, 1));
    let fraud = harness.fraud();
    assert!(!fraud
        .has_user_pending_identity_check(&user, now())
        .expect("lookup"));

    harness.check(
        &user,
        FraudCheckType::Ubble,
        FraudCheckStatus::Pending,
        Some(EligibilityType::Underage),
        None,
    );
    assert!(!fraud
        .has_user_pending_identity_check(&user, now())
        .expect("lookup"));

    harness.check(
        &user,
        FraudCheckType::Dms,
        FraudCheckStatus::Pending,
        Some(EligibilityType::Age18),
        None,
    );
    assert!(fraud
        .has_user_pending_identity_check(&user, now())
        .expect("lookup"));
}

#[test]
fn duplicate_email_is_masked_for_the_rejected_user() {
    let harness = Harness::new();
    let mut original = harness.beneficiary(
        "jeanne.doe@example.com",
        "Jeanne",
        "Doe",
        date(2004, 6, 1),
        DepositType::Grant18,
    );
    original.id_piece_number = Some("123456789012".to_string());
    harness.store.update_user(original).expect("updated");
    let rejected = harness.user("other@example.com", date(2004, 6, 1));
    let content = ubble_content("Jeanne", "Doe", date(2004, 6, 1));
    let fraud = harness.fraud();

    for code in [
        FraudReasonCode::DuplicateUser,
        FraudReasonCode::DuplicateIdPieceNumber,
    ] {
        let email = fraud
            .get_duplicate_beneficiary_anonymized_email(&rejected, &content, code)
            .expect("lookup");
        assert_eq!(email.as_deref(), Some("j***@e***.com"));
    }

    let none = fraud
        .get_duplicate_beneficiary_anonymized_email(
            &rejected,
            &content,
            FraudReasonCode::DuplicateIne,
        )
        .expect("lookup");
    assert_eq!(none, None);
}
