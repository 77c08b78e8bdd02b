use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::StoreError;
use crate::store::{ArtifactId, ArtifactStore};

/// Stores each artifact as a file named after its identifier inside one
/// directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Opens the store, creating `root` if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<FsArtifactStore, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!(root = %root.display(), "artifact store ready");
        Ok(FsArtifactStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(id.as_str())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, id: &ArtifactId, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(id);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StoreError::AlreadyExists(id.to_string()),
                _ => StoreError::Io(e),
            })?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    }

    fn get(&self, id: &ArtifactId) -> Result<Vec<u8>, StoreError> {
        fs::read(self.path_for(id)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(id.to_string()),
            _ => StoreError::Io(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_once_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("gradcam")).unwrap();
        let id = ArtifactId::generate();
        store.put(&id, b"jpeg bytes").unwrap();
        assert_eq!(store.get(&id).unwrap(), b"jpeg bytes");
        assert!(store.root().join(id.as_str()).exists());

        let err = store.put(&id, b"other").unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.get(&id).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        let err = store.get(&ArtifactId::parse("gradcam_missing.jpg").unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
