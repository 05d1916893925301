use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::ids::{ExtractId, UserId};

/// Back-office request for a personal data archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GdprUserDataExtract {
    pub id: ExtractId,
    pub user_id: UserId,
    pub author_id: UserId,
    pub date_created: NaiveDateTime,
    pub date_processed: Option<NaiveDateTime>,
    pub expiration_date: NaiveDateTime,
}

impl GdprUserDataExtract {
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expiration_date < now
    }

    pub fn is_processed(&self) -> bool {
        self.date_processed.is_some()
    }

    pub fn file_name(&self) -> String {
        format!("{}.zip", self.id)
    }
}

/// Tag put on a young user who asked to be anonymized once they turn 21.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GdprUserAnonymization {
    pub user_id: UserId,
    pub date_created: NaiveDateTime,
}
