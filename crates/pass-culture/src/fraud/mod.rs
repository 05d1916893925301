//! Fraud items, identity check verdicts, phone validation failures and manual reviews.

pub mod api;
pub mod checks;
pub mod domain;
pub mod review;
pub mod ubble;

#[cfg(test)]
mod tests;

pub use api::{FraudError, FraudService};
pub use domain::{
    BeneficiaryFraudCheck, BeneficiaryFraudReview, FraudCheckContent, FraudCheckStatus,
    FraudCheckType, FraudItem, FraudReasonCode, FraudReviewStatus, FraudStatus,
    IdentityCheckContent, IdentityDetails, ProfileCompletionContent, UbbleContent,
};
pub use review::validate_beneficiary;
