use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::store::{ArtifactId, ArtifactStore};

/// In-process store, for embedding the pipeline without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: RwLock<HashMap<ArtifactId, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn len(&self) -> usize {
        self.artifacts.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "artifact map lock poisoned"))
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, id: &ArtifactId, bytes: &[u8]) -> Result<(), StoreError> {
        let mut artifacts = self.artifacts.write().map_err(|_| poisoned())?;
        if artifacts.contains_key(id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        artifacts.insert(id.clone(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, id: &ArtifactId) -> Result<Vec<u8>, StoreError> {
        let artifacts = self.artifacts.read().map_err(|_| poisoned())?;
        artifacts
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}
