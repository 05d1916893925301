use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(
    /// Account identifier shared by young beneficiaries, pros and back-office agents.
    UserId
);
entity_id!(FraudCheckId);
entity_id!(FraudReviewId);
entity_id!(DepositId);
entity_id!(OffererId);
entity_id!(VenueId);
entity_id!(OfferId);
entity_id!(StockId);
entity_id!(BookingId);
entity_id!(ReimbursementRuleId);
entity_id!(ExtractId);
entity_id!(ActionId);
entity_id!(MessageId);

/// Named sequences handed out by the store when a new row is inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sequence {
    User,
    FraudCheck,
    FraudReview,
    Deposit,
    Offerer,
    Venue,
    Offer,
    Stock,
    Booking,
    ReimbursementRule,
    Extract,
    Action,
    Message,
}

impl Sequence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sequence::User => "user",
            Sequence::FraudCheck => "fraud_check",
            Sequence::FraudReview => "fraud_review",
            Sequence::Deposit => "deposit",
            Sequence::Offerer => "offerer",
            Sequence::Venue => "venue",
            Sequence::Offer => "offer",
            Sequence::Stock => "stock",
            Sequence::Booking => "booking",
            Sequence::ReimbursementRule => "reimbursement_rule",
            Sequence::Extract => "extract",
            Sequence::Action => "action",
            Sequence::Message => "message",
        }
    }
}
