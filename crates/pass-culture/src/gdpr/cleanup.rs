use std::collections::BTreeSet;
use std::path::Path;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use super::{GdprError, GdprService, GDPR_EXTRACT_FOLDER};
use crate::ids::ExtractId;
use crate::storage::{ObjectStorage, StorageError};
use crate::store::{RepositoryError, Store};

fn extract_id_of(file_name: &str) -> Option<ExtractId> {
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.parse::<u64>().ok())
        .map(ExtractId)
}

impl<S, O> GdprService<S, O>
where
    S: Store + 'static,
    O: ObjectStorage + 'static,
{
    /// A missing archive counts as deleted.
    pub(super) fn delete_extract_archive(&self, extract_id: ExtractId) -> Result<(), StorageError> {
        let file_name = format!("{extract_id}.zip");
        match self.storage.delete(GDPR_EXTRACT_FOLDER, &file_name) {
            Ok(()) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(failure) => Err(failure),
        }
    }

    /// Drop both the archive and the request row. Either may already be gone.
    pub fn delete_gdpr_extract(&self, extract_id: ExtractId) -> Result<(), GdprError> {
        self.delete_extract_archive(extract_id)?;
        match self.store.delete_extract(extract_id) {
            Ok(()) | Err(RepositoryError::NotFound) => {}
            Err(failure) => return Err(failure.into()),
        }
        Ok(())
    }

    /// Remove orphan archives and expired requests. Returns the number of extracts deleted.
    pub fn clean_gdpr_extracts(&self, now: NaiveDateTime) -> Result<usize, GdprError> {
        let stored: BTreeSet<ExtractId> = self
            .storage
            .list(GDPR_EXTRACT_FOLDER)?
            .iter()
            .filter_map(|name| extract_id_of(name))
            .collect();
        let extracts = self.store.list_extracts()?;
        let known: BTreeSet<ExtractId> = extracts.iter().map(|extract| extract.id).collect();

        let mut deleted = 0;
        for orphan in stored.difference(&known) {
            warn!(extract_id = %orphan, "Deleting GDPR archive without request");
            self.delete_gdpr_extract(*orphan)?;
            deleted += 1;
        }
        for extract in extracts.iter().filter(|extract| extract.is_expired(now)) {
            self.delete_gdpr_extract(extract.id)?;
            deleted += 1;
        }
        info!(deleted, "Cleaned GDPR extracts");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_numeric_stems_are_extracts() {
        assert_eq!(extract_id_of("12.zip"), Some(ExtractId(12)));
        assert_eq!(extract_id_of("12"), Some(ExtractId(12)));
        assert_eq!(extract_id_of("notes.zip"), None);
        assert_eq!(extract_id_of(".zip"), None);
    }
}
