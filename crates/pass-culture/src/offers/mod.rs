//! Offerers, venues, offers and their stocks, with the pro-side validation rules.

pub mod domain;
pub mod router;
pub mod service;
pub mod subcategories;
pub mod validation;

pub use domain::{Offer, OfferValidationStatus, Offerer, Stock, Venue};
pub use router::offer_router;
pub use service::{
    OfferError, OfferForm, OfferService, OffererForm, StockEdition, StockForm, VenueForm,
};
