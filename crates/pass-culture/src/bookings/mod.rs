//! Beneficiary bookings: creation, cancellation and validation by the venue.

pub mod domain;
pub mod router;
pub mod service;
pub mod validation;

pub use domain::{Booking, BookingCancellationReason, BookingStatus};
pub use router::booking_router;
pub use service::{generate_booking_token, BookingError, BookingService};
