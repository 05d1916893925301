use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::ids::{BookingId, DepositId, StockId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    Used,
    Cancelled,
    Reimbursed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingCancellationReason {
    Beneficiary,
    Offerer,
    Expired,
    Fraud,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub token: String,
    pub user_id: UserId,
    pub stock_id: StockId,
    pub deposit_id: Option<DepositId>,
    pub quantity: u32,
    /// Unit price in cents at booking time.
    pub amount: i64,
    pub status: BookingStatus,
    pub cancellation_reason: Option<BookingCancellationReason>,
    pub date_created: NaiveDateTime,
    pub date_used: Option<NaiveDateTime>,
    pub cancellation_date: Option<NaiveDateTime>,
    pub cancellation_limit_date: Option<NaiveDateTime>,
}

impl Booking {
    pub fn total_amount(&self) -> i64 {
        self.amount * i64::from(self.quantity)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == BookingStatus::Cancelled
    }

    pub fn is_used(&self) -> bool {
        matches!(self.status, BookingStatus::Used | BookingStatus::Reimbursed)
    }

    pub fn cancel(&mut self, reason: BookingCancellationReason, now: NaiveDateTime) {
        self.status = BookingStatus::Cancelled;
        self.cancellation_reason = Some(reason);
        self.cancellation_date = Some(now);
    }
}
