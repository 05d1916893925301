//! Individual fraud items and the verdict computed from them.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use super::domain::{
    BeneficiaryFraudCheck, FraudCheckStatus, FraudItem, FraudReasonCode, FraudStatus,
    FRAUD_RESULT_REASON_SEPARATOR,
};
use crate::dates::age_at_date;
use crate::ids::UserId;
use crate::users::eligibility::ELIGIBILITY_UNDERAGE_RANGE;
use crate::users::{EligibilityType, User};

fn id_piece_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Z0-9]{12}$|^[A-Z0-9]{9}$|^\d{2}[a-zA-Z]{2}\d{5}$")
            .expect("id piece number pattern is valid")
    })
}

/// Uppercase and drop everything that is not a letter or a digit.
pub fn format_id_piece_number(id_piece_number: &str) -> String {
    id_piece_number
        .to_uppercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

pub fn validate_id_piece_number_format_fraud_item(id_piece_number: Option<&str>) -> FraudItem {
    let number = match id_piece_number.map(str::trim).filter(|number| !number.is_empty()) {
        Some(number) => number,
        None => {
            return FraudItem::suspicious(
                "Le numéro de la pièce d'identité est vide",
                FraudReasonCode::EmptyIdPieceNumber,
            )
        }
    };

    if !id_piece_number_pattern().is_match(&format_id_piece_number(number)) {
        return FraudItem::suspicious(
            "Le format du numéro de la pièce d'identité n'est pas valide",
            FraudReasonCode::InvalidIdPieceNumber,
        );
    }
    FraudItem::ok("Le numéro de pièce d'identité est valide")
}

/// Case, accent and surrounding-space insensitive form used to compare names.
pub(crate) fn normalize_name(name: &str) -> String {
    name.trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            // letters with a stroke or a ligature have no canonical decomposition
            'ł' => "l".to_string(),
            'ø' => "o".to_string(),
            'đ' | 'ð' => "d".to_string(),
            'ħ' => "h".to_string(),
            'ı' => "i".to_string(),
            'œ' => "oe".to_string(),
            'æ' => "ae".to_string(),
            'ß' => "ss".to_string(),
            other => other.to_string(),
        })
        .collect()
}

fn names_match(candidate: Option<&str>, expected: &str) -> bool {
    candidate
        .map(|candidate| normalize_name(candidate) == normalize_name(expected))
        .unwrap_or(false)
}

pub fn find_duplicate_beneficiary<'a>(
    users: &'a [User],
    first_name: &str,
    last_name: &str,
    married_name: Option<&str>,
    birth_date: NaiveDate,
    excluded_user_id: UserId,
) -> Option<&'a User> {
    let candidates: Vec<&User> = users
        .iter()
        .filter(|user| {
            user.id != excluded_user_id
                && user.is_beneficiary()
                && user.validated_birth_date == Some(birth_date)
                && names_match(user.first_name.as_deref(), first_name)
        })
        .collect();

    candidates
        .iter()
        .find(|user| names_match(user.last_name.as_deref(), last_name))
        .or_else(|| {
            candidates
                .iter()
                .find(|user| names_match(user.married_name.as_deref(), last_name))
        })
        .or_else(|| {
            married_name.and_then(|married_name| {
                candidates
                    .iter()
                    .find(|user| names_match(user.last_name.as_deref(), married_name))
            })
        })
        .copied()
}

pub fn duplicate_user_fraud_item(
    users: &[User],
    first_name: &str,
    last_name: &str,
    married_name: Option<&str>,
    birth_date: NaiveDate,
    excluded_user_id: UserId,
) -> FraudItem {
    match find_duplicate_beneficiary(
        users,
        first_name,
        last_name,
        married_name,
        birth_date,
        excluded_user_id,
    ) {
        Some(duplicate) => FraudItem::suspicious(
            format!("Duplicat de l'utilisateur {}", duplicate.id),
            FraudReasonCode::DuplicateUser,
        )
        .with_duplicate(duplicate.id),
        None => FraudItem::ok("Utilisateur non dupliqué"),
    }
}

pub fn missing_data_fraud_item() -> FraudItem {
    FraudItem::suspicious(
        "Des informations obligatoires (prénom, nom ou date de naissance) sont absentes du dossier",
        FraudReasonCode::MissingRequiredData,
    )
}

pub fn find_duplicate_id_piece_number_user<'a>(
    users: &'a [User],
    id_piece_number: Option<&str>,
    excluded_user_id: UserId,
) -> Option<&'a User> {
    let number = format_id_piece_number(id_piece_number?);
    if number.is_empty() {
        return None;
    }
    users.iter().find(|user| {
        user.id != excluded_user_id && user.id_piece_number.as_deref() == Some(number.as_str())
    })
}

pub fn duplicate_id_piece_number_fraud_item(
    users: &[User],
    user: &User,
    id_piece_number: &str,
) -> FraudItem {
    match find_duplicate_id_piece_number_user(users, Some(id_piece_number), user.id) {
        Some(duplicate) => FraudItem::suspicious(
            format!(
                "La pièce d'identité n°{id_piece_number} est déjà prise par l'utilisateur {}",
                duplicate.id
            ),
            FraudReasonCode::DuplicateIdPieceNumber,
        )
        .with_duplicate(duplicate.id),
        None => FraudItem::ok("La pièce d'identité n'est pas déjà utilisée"),
    }
}

pub fn find_duplicate_ine_hash_user<'a>(
    users: &'a [User],
    ine_hash: &str,
    excluded_user_id: UserId,
) -> Option<&'a User> {
    users
        .iter()
        .find(|user| user.id != excluded_user_id && user.ine_hash.as_deref() == Some(ine_hash))
}

pub fn duplicate_ine_hash_fraud_item(
    users: &[User],
    ine_hash: &str,
    excluded_user_id: UserId,
) -> FraudItem {
    match find_duplicate_ine_hash_user(users, ine_hash, excluded_user_id) {
        Some(duplicate) => FraudItem::suspicious(
            format!("L'INE {ine_hash} est déjà pris par l'utilisateur {}", duplicate.id),
            FraudReasonCode::DuplicateIne,
        )
        .with_duplicate(duplicate.id),
        None => FraudItem::ok("L'INE n'est pas déjà pris"),
    }
}

pub fn check_user_eligibility(eligibility: Option<EligibilityType>) -> FraudItem {
    match eligibility {
        Some(_) => FraudItem::ok("L'utilisateur est éligible à un nouveau statut bénéficiaire"),
        None => FraudItem::ko(
            "L'âge indiqué dans le dossier indique que l'utilisateur n'est pas éligible",
            FraudReasonCode::NotEligible,
        ),
    }
}

/// Letters, spaces, apostrophes, dots and hyphens only.
pub fn is_subscription_name_valid(name: Option<&str>) -> bool {
    let name = match name.map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => return false,
    };
    name.chars()
        .all(|c| c.is_alphabetic() || matches!(c, ' ' | '\'' | '’' | '.' | '-'))
}

pub fn check_user_names_valid(first_name: Option<&str>, last_name: Option<&str>) -> FraudItem {
    let incorrect_fields = match (
        is_subscription_name_valid(first_name),
        is_subscription_name_valid(last_name),
    ) {
        (false, false) => Some("un prénom et un nom de famille"),
        (false, true) => Some("un prénom"),
        (true, false) => Some("un nom de famille"),
        (true, true) => None,
    };

    match incorrect_fields {
        Some(fields) => FraudItem::ko(
            format!("L'utilisateur a {fields} avec des caractères invalides"),
            FraudReasonCode::NameIncorrect,
        ),
        None => FraudItem::ok("L'utilisateur a un nom et prénom avec des caractères valides"),
    }
}

pub fn check_user_email_is_validated(user: &User) -> FraudItem {
    if user.is_email_validated {
        FraudItem::ok("L'email est validé")
    } else {
        FraudItem::ko(
            "L'email de l'utilisateur n'est pas validé",
            FraudReasonCode::EmailNotValidated,
        )
    }
}

pub fn underage_user_fraud_item(birth_date: NaiveDate, today: NaiveDate) -> FraudItem {
    let age = age_at_date(birth_date, today);
    if ELIGIBILITY_UNDERAGE_RANGE.contains(&age) {
        FraudItem::ok(format!("L'âge de l'utilisateur est valide ({age} ans)."))
    } else {
        FraudItem::ko(
            format!(
                "L'âge de l'utilisateur est invalide ({age} ans). Il devrait être parmi {:?}",
                ELIGIBILITY_UNDERAGE_RANGE
            ),
            FraudReasonCode::AgeNotValid,
        )
    }
}

/// Apply the combined verdict of `items` to `check`.
///
/// All OK gives OK, any KO gives KO, anything else is SUSPICIOUS.
pub fn validate_frauds(items: &[FraudItem], check: &mut BeneficiaryFraudCheck) {
    let status = if items.iter().all(|item| item.status == FraudStatus::Ok) {
        FraudCheckStatus::Ok
    } else if items.iter().any(|item| item.status == FraudStatus::Ko) {
        FraudCheckStatus::Ko
    } else {
        FraudCheckStatus::Suspicious
    };

    let failed: Vec<&FraudItem> = items
        .iter()
        .filter(|item| item.status != FraudStatus::Ok)
        .collect();
    let reason = failed
        .iter()
        .map(|item| item.detail.as_str())
        .collect::<Vec<_>>()
        .join(&format!(" {FRAUD_RESULT_REASON_SEPARATOR} "));
    let reason_codes: BTreeSet<FraudReasonCode> = failed
        .iter()
        .flat_map(|item| item.reason_codes.iter().copied())
        .collect();

    check.status = status;
    check.reason = Some(reason);
    check.reason_codes = reason_codes.into_iter().collect();
}

/// Duplicate reported by the first item flagged as a duplicate user or id piece.
pub fn duplicate_beneficiary_id(items: &[FraudItem]) -> Option<UserId> {
    items
        .iter()
        .filter(|item| {
            item.reason_codes.contains(&FraudReasonCode::DuplicateUser)
                || item.reason_codes.contains(&FraudReasonCode::DuplicateIdPieceNumber)
        })
        .find_map(|item| item.duplicate_id)
}

/// `jeanne.doe@example.com` becomes `j***@e***.com`.
pub fn anonymize_email(email: &str) -> String {
    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => return "***".to_string(),
    };
    let (domain_name, extension) = domain.rsplit_once('.').unwrap_or((domain, ""));
    let first = |part: &str| part.chars().next().map(String::from).unwrap_or_default();

    let mut anonymized = format!("{}***@{}***", first(local), first(domain_name));
    if !extension.is_empty() {
        anonymized.push('.');
        anonymized.push_str(extension);
    }
    anonymized
}
