//! Ordered subscription steps leading a young user to the beneficiary role.

pub mod api;
pub mod messages;
pub mod models;
pub mod router;
pub mod status;
pub mod ubble;

#[cfg(test)]
mod tests;

pub use api::{ProfileForm, SubscriptionError, SubscriptionService};
pub use models::{
    SubscriptionItemStatus, SubscriptionMessage, SubscriptionStep, UserSubscriptionState,
    YoungStatus,
};
pub use router::subscription_router;
