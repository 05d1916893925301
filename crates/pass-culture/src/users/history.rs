use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::ids::{ActionId, OffererId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    UserSuspended,
    UserUnsuspended,
    UserAnonymized,
    UserExtractData,
    FraudReview,
    Comment,
}

/// Audit trail entry shown to support agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionHistory {
    pub id: ActionId,
    pub action_type: ActionType,
    pub user_id: Option<UserId>,
    pub author_id: Option<UserId>,
    /// Set when the action concerns a pro structure; kept through anonymization.
    pub offerer_id: Option<OffererId>,
    pub comment: Option<String>,
    pub date: NaiveDateTime,
}

impl ActionHistory {
    pub fn for_user(
        id: ActionId,
        action_type: ActionType,
        user_id: UserId,
        author_id: Option<UserId>,
        comment: Option<String>,
        date: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            action_type,
            user_id: Some(user_id),
            author_id,
            offerer_id: None,
            comment,
            date,
        }
    }
}
