//! Custom reimbursement rules overriding the standard rates for an offer, venue or offerer.

pub mod import;
pub mod router;
mod rule;
pub mod service;

pub use import::{ImportIssue, ImportReport};
pub use router::reimbursement_router;
pub use rule::{
    edit_reimbursement_rule, validate_reimbursement_rule, CustomReimbursementRule,
    NewReimbursementRule, Rate, ReimbursementRuleError, RuleTarget, RuleValue, Timespan,
};
pub use service::{ImportMode, ReimbursementRuleService, ReimbursementServiceError};
