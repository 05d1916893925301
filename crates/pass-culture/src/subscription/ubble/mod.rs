//! Identity verification through the remote document provider.

pub mod client;
pub mod models;
pub mod pictures;
pub mod router;
pub mod workflow;

pub use client::{ExternalApiError, IdentityProvider, PictureDownload, UbbleClient};
pub use router::ubble_router;
pub use workflow::{
    get_ubble_subscription_item_status, is_user_allowed_to_perform_ubble_check, UbbleError,
    UbbleWorkflow, ID_PICTURES_STORAGE_FOLDER,
};
