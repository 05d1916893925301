mod account;
mod domain;
pub mod eligibility;
pub mod history;

pub use account::{suspend_account, update_user_information_from_external_source};
pub use domain::{Civility, EligibilityType, Suspension, SuspensionReason, User, UserRole};
