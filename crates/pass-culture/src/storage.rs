//! Object storage for GDPR archives and archived identity pictures.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object name: {0}")]
    InvalidName(String),
    #[error("object {0} not found")]
    NotFound(String),
    #[error("storage i/o failure: {0}")]
    Io(#[from] io::Error),
}

/// Flat folders of named binary objects.
pub trait ObjectStorage: Send + Sync {
    fn store(
        &self,
        folder: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError>;
    fn read(&self, folder: &str, name: &str) -> Result<Vec<u8>, StorageError>;
    /// Object names of `folder`, sorted.
    fn list(&self, folder: &str) -> Result<Vec<String>, StorageError>;
    fn delete(&self, folder: &str, name: &str) -> Result<(), StorageError>;
    fn exists(&self, folder: &str, name: &str) -> Result<bool, StorageError>;
}

/// Storage rooted in a local directory, one sub-directory per folder.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Content type derived from the object's extension.
    pub fn content_type(name: &str) -> String {
        mime_guess::from_path(name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    fn folder_path(&self, folder: &str) -> Result<PathBuf, StorageError> {
        if folder.is_empty() {
            return Ok(self.root.clone());
        }
        validate_component(folder)?;
        Ok(self.root.join(folder))
    }

    fn object_path(&self, folder: &str, name: &str) -> Result<PathBuf, StorageError> {
        validate_component(name)?;
        Ok(self.folder_path(folder)?.join(name))
    }
}

fn validate_component(component: &str) -> Result<(), StorageError> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains(['/', '\\'])
    {
        return Err(StorageError::InvalidName(component.to_string()));
    }
    Ok(())
}

impl ObjectStorage for LocalObjectStorage {
    fn store(
        &self,
        folder: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.object_path(folder, name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        debug!(
            path = %path.display(),
            content_type,
            size = bytes.len(),
            "Object stored"
        );
        Ok(())
    }

    fn read(&self, folder: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(folder, name)?;
        fs::read(&path).map_err(|error| match error.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            _ => StorageError::Io(error),
        })
    }

    fn list(&self, folder: &str) -> Result<Vec<String>, StorageError> {
        let path = self.folder_path(folder)?;
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete(&self, folder: &str, name: &str) -> Result<(), StorageError> {
        let path = self.object_path(folder, name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    fn exists(&self, folder: &str, name: &str) -> Result<bool, StorageError> {
        Ok(self.object_path(folder, name)?.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_objects_are_listed_and_deleted() {
        let dir = tempfile::tempdir().expect("temp dir");
        let storage = LocalObjectStorage::new(dir.path());

        storage
            .store("archives", "2.zip", b"second", "application/zip")
            .expect("stored");
        storage
            .store("archives", "1.zip", b"first", "application/zip")
            .expect("stored");

        assert_eq!(
            storage.list("archives").expect("listed"),
            vec!["1.zip".to_string(), "2.zip".to_string()]
        );
        assert_eq!(storage.read("archives", "1.zip").expect("read"), b"first");
        assert!(storage.exists("archives", "2.zip").expect("exists"));

        storage.delete("archives", "2.zip").expect("deleted");
        assert!(!storage.exists("archives", "2.zip").expect("exists"));
        match storage.delete("archives", "2.zip") {
            Err(StorageError::NotFound(name)) => assert_eq!(name, "2.zip"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn missing_folder_lists_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let storage = LocalObjectStorage::new(dir.path());
        assert!(storage.list("unknown").expect("listed").is_empty());
    }

    #[test]
    fn names_cannot_escape_the_root() {
        let dir = tempfile::tempdir().expect("temp dir");
        let storage = LocalObjectStorage::new(dir.path());
        match storage.store("..", "x.zip", b"", "application/zip") {
            Err(StorageError::InvalidName(name)) => assert_eq!(name, ".."),
            other => panic!("expected InvalidName, got {other:?}"),
        }
        assert!(storage.exists("archives", "../x").is_err());
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(LocalObjectStorage::content_type("12.zip"), "application/zip");
        assert_eq!(LocalObjectStorage::content_type("1-a-front.png"), "image/png");
        assert_eq!(
            LocalObjectStorage::content_type("unknown"),
            "application/octet-stream"
        );
    }
}
