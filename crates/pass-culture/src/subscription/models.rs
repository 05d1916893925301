use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::fraud::domain::BeneficiaryFraudCheck;
use crate::ids::{MessageId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionItemStatus {
    Void,
    Todo,
    Ok,
    Ko,
    Suspicious,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriptionStep {
    EmailValidation,
    PhoneValidation,
    ProfileCompletion,
    IdentityCheck,
    HonorStatement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    HasToCompleteSubscription,
    HasSubscriptionPending,
    HasSubscriptionIssues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "subscription_status", rename_all = "snake_case")]
pub enum YoungStatus {
    Eligible(SubscriptionStatus),
    NonEligible,
    Beneficiary,
    ExBeneficiary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PopOverIcon {
    Clock,
    Error,
    Warning,
    Information,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallToActionIcon {
    Email,
    Retry,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallToAction {
    pub title: String,
    pub link: String,
    pub icon: CallToActionIcon,
}

/// In-app message shown on the subscription screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    pub id: MessageId,
    pub user_id: UserId,
    pub user_message: String,
    pub pop_over_icon: Option<PopOverIcon>,
    pub call_to_action: Option<CallToAction>,
    pub date_created: NaiveDateTime,
}

/// Message content before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageDraft {
    pub user_message: String,
    pub pop_over_icon: Option<PopOverIcon>,
    pub call_to_action: Option<CallToAction>,
}

impl MessageDraft {
    pub fn into_message(self, id: MessageId, user_id: UserId, now: NaiveDateTime) -> SubscriptionMessage {
        SubscriptionMessage {
            id,
            user_id,
            user_message: self.user_message,
            pop_over_icon: self.pop_over_icon,
            call_to_action: self.call_to_action,
            date_created: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSubscriptionState {
    pub fraud_status: SubscriptionItemStatus,
    pub next_step: Option<SubscriptionStep>,
    pub young_status: YoungStatus,
    pub identity_fraud_check: Option<BeneficiaryFraudCheck>,
    pub subscription_message: Option<MessageDraft>,
    pub is_activable: bool,
}

impl UserSubscriptionState {
    pub(crate) fn new(
        fraud_status: SubscriptionItemStatus,
        next_step: Option<SubscriptionStep>,
        young_status: YoungStatus,
    ) -> Self {
        Self {
            fraud_status,
            next_step,
            young_status,
            identity_fraud_check: None,
            subscription_message: None,
            is_activable: false,
        }
    }
}
