//! In-app messages explaining where the subscription stands.

use super::models::{CallToAction, CallToActionIcon, MessageDraft, PopOverIcon};
use crate::fraud::domain::{BeneficiaryFraudCheck, FraudCheckStatus, FraudReasonCode};
use crate::ids::UserId;

pub const RETRY_IDENTITY_CHECK_LINK: &str = "passculture://verification-identite";

const SUPPORT_CONTACT_SUFFIX: &str = "Tu peux contacter le support pour plus d'informations.";

pub fn support_call_to_action(user_id: UserId, support_email: &str) -> CallToAction {
    CallToAction {
        title: "Contacter le support".to_string(),
        link: format!(
            "mailto:{support_email}?subject=%23{user_id}+-+Mon+inscription+sur+le+pass+Culture+est+bloqu%C3%A9e"
        ),
        icon: CallToActionIcon::Email,
    }
}

pub fn retry_call_to_action() -> CallToAction {
    CallToAction {
        title: "Réessayer la vérification de mon identité".to_string(),
        link: RETRY_IDENTITY_CHECK_LINK.to_string(),
        icon: CallToActionIcon::Retry,
    }
}

pub fn processing_message() -> MessageDraft {
    MessageDraft {
        user_message: "Ton document d'identité est en cours de vérification.".to_string(),
        pop_over_icon: Some(PopOverIcon::Clock),
        call_to_action: None,
    }
}

pub fn generic_ko_message(user_id: UserId, support_email: &str) -> MessageDraft {
    MessageDraft {
        user_message:
            "Ton dossier a été rejeté. Tu n'es malheureusement pas éligible au pass culture."
                .to_string(),
        pop_over_icon: Some(PopOverIcon::Error),
        call_to_action: Some(support_call_to_action(user_id, support_email)),
    }
}

/// Most specific reason found on the check, in display priority order.
fn primary_reason_code(codes: &[FraudReasonCode]) -> Option<FraudReasonCode> {
    const PRIORITY: [FraudReasonCode; 10] = [
        FraudReasonCode::DuplicateUser,
        FraudReasonCode::DuplicateIdPieceNumber,
        FraudReasonCode::AgeTooOld,
        FraudReasonCode::AgeTooYoung,
        FraudReasonCode::NotEligible,
        FraudReasonCode::IdCheckDataMatch,
        FraudReasonCode::IdCheckExpired,
        FraudReasonCode::IdCheckNotSupported,
        FraudReasonCode::IdCheckNotAuthentic,
        FraudReasonCode::IdCheckUnprocessable,
    ];
    PRIORITY.into_iter().find(|code| codes.contains(code))
}

fn blocked_reason(code: Option<FraudReasonCode>) -> &'static str {
    match code {
        Some(FraudReasonCode::DuplicateUser | FraudReasonCode::DuplicateIdPieceNumber) => {
            "Il y a déjà un compte à ton nom sur le pass Culture."
        }
        Some(FraudReasonCode::AgeTooOld | FraudReasonCode::NotEligible) => {
            "Tu ne peux pas bénéficier du pass Culture car tu as dépassé l'âge maximum."
        }
        Some(FraudReasonCode::AgeTooYoung) => {
            "Tu n'as pas encore l'âge requis pour bénéficier du pass Culture."
        }
        Some(FraudReasonCode::IdCheckDataMatch) => {
            "Les informations que tu as renseignées ne correspondent pas à celles de ta pièce d'identité."
        }
        Some(FraudReasonCode::IdCheckExpired) => "Ta pièce d'identité est expirée.",
        Some(FraudReasonCode::IdCheckNotSupported) => {
            "Le document que tu as transmis n'est pas accepté."
        }
        Some(FraudReasonCode::IdCheckNotAuthentic) => {
            "Le document que tu as transmis n'est pas authentique."
        }
        Some(FraudReasonCode::IdCheckUnprocessable) => {
            "Ta pièce d'identité n'a pas pu être lue."
        }
        _ => "Ta vérification d'identité n'a pas abouti.",
    }
}

fn retry_reason(code: Option<FraudReasonCode>) -> &'static str {
    match code {
        Some(FraudReasonCode::IdCheckDataMatch) => {
            "Ton dossier a été refusé : le prénom et le nom que tu as renseignés ne correspondent pas à ta pièce d'identité. Tu peux réessayer."
        }
        Some(FraudReasonCode::IdCheckExpired) => {
            "Ton dossier a été refusé : ta pièce d'identité est expirée. Tu peux réessayer avec un autre document."
        }
        Some(FraudReasonCode::IdCheckNotSupported) => {
            "Ton dossier a été refusé : le document que tu as transmis n'est pas accepté. Tu peux réessayer avec une carte d'identité ou un passeport."
        }
        Some(FraudReasonCode::IdCheckNotAuthentic) => {
            "Ton dossier a été refusé : le document transmis n'est pas un original. Tu peux réessayer avec le document original."
        }
        _ => "Nous n'avons pas réussi à lire ton document. Tu peux réessayer.",
    }
}

/// Message stored when the provider rejected the document.
pub fn ubble_ko_message(check: &BeneficiaryFraudCheck, support_email: &str) -> MessageDraft {
    let reason = blocked_reason(primary_reason_code(&check.reason_codes));
    MessageDraft {
        user_message: format!("Ton dossier a été bloqué : {reason} {SUPPORT_CONTACT_SUFFIX}"),
        pop_over_icon: None,
        call_to_action: Some(support_call_to_action(check.user_id, support_email)),
    }
}

pub fn ubble_retry_message(check: &BeneficiaryFraudCheck) -> MessageDraft {
    MessageDraft {
        user_message: retry_reason(primary_reason_code(&check.reason_codes)).to_string(),
        pop_over_icon: None,
        call_to_action: Some(retry_call_to_action()),
    }
}

pub fn ubble_subscription_message(
    check: &BeneficiaryFraudCheck,
    can_retry: bool,
    support_email: &str,
) -> Option<MessageDraft> {
    match check.status {
        FraudCheckStatus::Pending => Some(processing_message()),
        FraudCheckStatus::Ko | FraudCheckStatus::Suspicious if can_retry => {
            Some(ubble_retry_message(check))
        }
        FraudCheckStatus::Ko | FraudCheckStatus::Suspicious => {
            Some(ubble_ko_message(check, support_email))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fraud::domain::FraudCheckType;
    use crate::ids::FraudCheckId;
    use chrono::NaiveDate;

    fn check(codes: Vec<FraudReasonCode>) -> BeneficiaryFraudCheck {
        let now = NaiveDate::from_ymd_opt(2022, 11, 2)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .expect("valid datetime");
        let mut check = BeneficiaryFraudCheck::new(
            FraudCheckId(1),
            UserId(42),
            FraudCheckType::Ubble,
            FraudCheckStatus::Ko,
            "ubble-id",
            None,
            now,
        );
        check.reason_codes = codes;
        check
    }

    #[test]
    fn data_mismatch_blocked_message_points_to_support() {
        let message = ubble_ko_message(
            &check(vec![FraudReasonCode::IdCheckDataMatch]),
            "support@example.com",
        );
        assert_eq!(
            message.user_message,
            "Ton dossier a été bloqué : Les informations que tu as renseignées ne correspondent pas à celles de ta pièce d'identité. Tu peux contacter le support pour plus d'informations."
        );
        let call_to_action = message.call_to_action.expect("support link");
        assert_eq!(call_to_action.icon, CallToActionIcon::Email);
        assert_eq!(call_to_action.title, "Contacter le support");
        assert_eq!(
            call_to_action.link,
            "mailto:support@example.com?subject=%2342+-+Mon+inscription+sur+le+pass+Culture+est+bloqu%C3%A9e"
        );
    }

    #[test]
    fn duplicate_takes_precedence_over_document_issues() {
        let message = ubble_ko_message(
            &check(vec![FraudReasonCode::IdCheckExpired, FraudReasonCode::DuplicateUser]),
            "support@example.com",
        );
        assert_eq!(
            message.user_message,
            "Ton dossier a été bloqué : Il y a déjà un compte à ton nom sur le pass Culture. Tu peux contacter le support pour plus d'informations."
        );
    }

    #[test]
    fn retryable_rejection_offers_a_new_attempt() {
        let message = ubble_subscription_message(
            &check(vec![FraudReasonCode::IdCheckExpired]),
            true,
            "support@example.com",
        )
        .expect("message");
        assert_eq!(
            message.call_to_action.map(|cta| cta.link),
            Some(RETRY_IDENTITY_CHECK_LINK.to_string())
        );
    }
}
