//! Artifact store: write-once persistence of overlay images keyed by a
//! collision-resistant identifier.

pub mod fs;
pub mod memory;

use std::fmt;

use uuid::Uuid;

use crate::error::StoreError;

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

/// Identifier of a stored overlay, e.g. `gradcam_3f2a…9c.jpg`. Doubles as
/// the file name in filesystem-backed stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Fresh identifier from a random v4 UUID (122 random bits).
    pub fn generate() -> ArtifactId {
        ArtifactId(format!("gradcam_{}.jpg", Uuid::new_v4().simple()))
    }

    /// Accepts a caller-supplied identifier. Only ASCII alphanumerics,
    /// `_`, `-` and `.` are allowed, and never `..`, so an identifier can
    /// not escape the store.
    pub fn parse(raw: &str) -> Result<ArtifactId, StoreError> {
        let valid_chars = raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
        if raw.is_empty() || raw.len() > 128 || !valid_chars || raw.contains("..") {
            return Err(StoreError::InvalidId(raw.to_owned()));
        }
        Ok(ArtifactId(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Write-once store for encoded overlay images.
pub trait ArtifactStore: Send + Sync {
    /// Persists `bytes` under `id`. Fails with `AlreadyExists` rather than
    /// overwriting.
    fn put(&self, id: &ArtifactId, bytes: &[u8]) -> Result<(), StoreError>;

    fn get(&self, id: &ArtifactId) -> Result<Vec<u8>, StoreError>;
}
