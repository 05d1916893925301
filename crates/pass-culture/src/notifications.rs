//! Outbound transactional messages (mail, SMS, push) behind a single trait.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::fraud::domain::FraudReasonCode;
use crate::ids::{BookingId, UserId};
use crate::users::EligibilityType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum Notification {
    AcceptedAsBeneficiary {
        user_id: UserId,
        email: String,
        eligibility: EligibilityType,
    },
    DuplicateFraudDetection {
        user_id: UserId,
        duplicate_id: UserId,
    },
    SubscriptionDocumentError {
        email: String,
        code: FraudReasonCode,
    },
    BookingConfirmation {
        booking_id: BookingId,
        email: String,
    },
    BookingCancellationByBeneficiary {
        booking_id: BookingId,
        email: String,
    },
    BookingCancelledByOfferer {
        booking_id: BookingId,
        email: String,
    },
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

pub trait Notifier: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), NotifierError>;
}

/// Keeps every notification so tests and the local server can inspect them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for InMemoryNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotifierError> {
        tracing::info!(notification = ?notification, "notification queued");
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}
