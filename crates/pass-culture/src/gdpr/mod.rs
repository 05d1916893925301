//! Personal data: GDPR extract archives, account anonymization and extract cleanup.

mod anonymization;
mod cleanup;
pub mod domain;
mod extract;
pub mod router;

use std::sync::Arc;

pub use anonymization::{is_beneficiary_anonymizable, ANONYMIZED, PRE_ANONYMIZATION_COMMENT};
pub use domain::{GdprUserAnonymization, GdprUserDataExtract};
pub use extract::{
    build_archive, has_unprocessed_extract, GdprAction, GdprBooking, GdprDataContainer,
    GdprDeposit, GdprMarketing, GdprValidation,
};
pub use router::gdpr_router;

use crate::config::GdprConfig;
use crate::ids::{ExtractId, UserId};
use crate::storage::{ObjectStorage, StorageError};
use crate::store::{RepositoryError, Store};

/// Object-storage folder holding the `{extract_id}.zip` archives.
pub const GDPR_EXTRACT_FOLDER: &str = "extracts";

#[derive(Debug, thiserror::Error)]
pub enum GdprError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("could not serialize personal data: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("could not build the archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("could not write the archive: {0}")]
    Io(#[from] std::io::Error),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("extract {0} not found")]
    ExtractNotFound(ExtractId),
    #[error("user {0} already has an extract being processed")]
    UnprocessedExtract(UserId),
    #[error("user {0} already has a pending anonymization")]
    UserAlreadyHasPendingAnonymization(UserId),
}

/// GDPR jobs over the store and the archive storage.
pub struct GdprService<S, O> {
    store: Arc<S>,
    storage: Arc<O>,
    config: GdprConfig,
}

impl<S, O> GdprService<S, O>
where
    S: Store + 'static,
    O: ObjectStorage + 'static,
{
    pub fn new(store: Arc<S>, storage: Arc<O>, config: GdprConfig) -> Self {
        Self {
            store,
            storage,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn storage(&self) -> &O {
        &self.storage
    }

    pub fn config(&self) -> GdprConfig {
        self.config
    }

    fn fetch_user(&self, user_id: UserId) -> Result<crate::users::User, GdprError> {
        self.store
            .fetch_user(user_id)?
            .ok_or(GdprError::UserNotFound(user_id))
    }
}

#[cfg(test)]
mod tests;
