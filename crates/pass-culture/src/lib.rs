//! Beneficiary subscription, identity fraud checks, offers, bookings, reimbursement rules and
//! GDPR jobs for the cultural pass platform.

pub mod api_errors;
pub mod bookings;
pub mod config;
pub mod dates;
pub mod error;
pub mod finance;
pub mod fraud;
pub mod gdpr;
pub mod ids;
pub mod notifications;
pub mod offers;
pub mod storage;
pub mod store;
pub mod subscription;
pub mod telemetry;
pub mod users;
