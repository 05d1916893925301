//! Fraud items derived from an identity provider (Ubble) result.

use chrono::NaiveDateTime;

use super::checks::{duplicate_id_piece_number_fraud_item, validate_id_piece_number_format_fraud_item};
use super::domain::{FraudItem, FraudReasonCode, UbbleContent, UbbleScore};
use crate::dates::age_at_date;
use crate::users::eligibility::{decide_eligibility, ELIGIBILITY_UNDERAGE_RANGE};
use crate::users::User;

fn is_invalid(score: Option<f64>) -> bool {
    score.and_then(UbbleScore::from_value) == Some(UbbleScore::Invalid)
}

/// Item summarizing the provider verdict and the age it certified.
pub fn ubble_result_fraud_item(content: &UbbleContent, now: NaiveDateTime) -> FraudItem {
    match content.score.and_then(UbbleScore::from_value) {
        Some(UbbleScore::Valid) => {
            let eligibility =
                decide_eligibility(content.birth_date, content.registration_datetime, now);
            match (eligibility, content.birth_date) {
                (None, Some(birth_date)) => {
                    let age = age_at_date(birth_date, now.date());
                    if age < *ELIGIBILITY_UNDERAGE_RANGE.start() {
                        FraudItem::ko(
                            format!("L'utilisateur n'a pas encore l'âge requis ({age} ans)"),
                            FraudReasonCode::AgeTooYoung,
                        )
                    } else {
                        FraudItem::ko(
                            format!("L'utilisateur a dépassé l'âge maximum ({age} ans)"),
                            FraudReasonCode::AgeTooOld,
                        )
                    }
                }
                _ => FraudItem::ok("La vérification d'identité Ubble est valide"),
            }
        }
        Some(UbbleScore::Invalid) => {
            let mut reason_codes = Vec::new();
            if is_invalid(content.reference_data_check_score) {
                reason_codes.push(FraudReasonCode::IdCheckDataMatch);
            }
            if is_invalid(content.expiry_date_score) {
                reason_codes.push(FraudReasonCode::IdCheckExpired);
            }
            if is_invalid(content.supported) {
                reason_codes.push(FraudReasonCode::IdCheckNotSupported);
            }
            if reason_codes.is_empty() {
                reason_codes.push(FraudReasonCode::IdCheckNotAuthentic);
            }
            FraudItem {
                reason_codes,
                ..FraudItem::ko(
                    "La vérification d'identité Ubble a échoué",
                    FraudReasonCode::IdCheckNotAuthentic,
                )
            }
        }
        Some(UbbleScore::Undecidable) | None => FraudItem::suspicious(
            "Ubble n'a pas pu traiter le document d'identité",
            FraudReasonCode::IdCheckUnprocessable,
        ),
    }
}

pub fn ubble_fraud_checks(
    users: &[User],
    user: &User,
    content: &UbbleContent,
    now: NaiveDateTime,
) -> Vec<FraudItem> {
    let mut items = vec![validate_id_piece_number_format_fraud_item(
        content.id_document_number.as_deref(),
    )];
    if let Some(number) = content
        .id_document_number
        .as_deref()
        .filter(|number| !number.trim().is_empty())
    {
        items.push(duplicate_id_piece_number_fraud_item(users, user, number));
    }
    items.push(ubble_result_fraud_item(content, now));
    items
}
