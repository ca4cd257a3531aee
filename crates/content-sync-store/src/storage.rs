use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::StoreError;

/// Content-addressed artifact storage on the local filesystem.
///
/// Artifacts live at `<root>/<sha256[..2]>/<sha256[2..]>`. Writes go to a
/// temporary file in the same directory and are renamed into place, so
/// readers never observe a half-written artifact.
#[derive(Debug)]
pub struct ArtifactStorage {
    root: PathBuf,
}

impl ArtifactStorage {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            StoreError::Storage(format!("cannot create {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage path (relative to the root) for an artifact digest.
    pub fn relative_path_for(sha256: &str) -> String {
        let (dir, rest) = sha256.split_at(sha256.len().min(2));
        format!("{dir}/{rest}")
    }

    /// Store `bytes` under their digest. Storing an existing digest is a no-op.
    pub fn put(&self, sha256: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let relative = Self::relative_path_for(sha256);
        let target = self.root.join(&relative);

        if target.is_file() {
            return Ok(relative);
        }

        let parent = target.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent).map_err(|e| {
            StoreError::Storage(format!("cannot create {}: {e}", parent.display()))
        })?;

        let mut partial = NamedTempFile::new_in(parent).map_err(|e| {
            StoreError::Storage(format!("cannot stage in {}: {e}", parent.display()))
        })?;
        partial
            .write_all(bytes)
            .and_then(|()| partial.as_file().sync_all())
            .map_err(|e| StoreError::Storage(format!("cannot write {relative}: {e}")))?;
        partial.persist(&target).map_err(|e| {
            StoreError::Storage(format!(
                "cannot move artifact into {}: {}",
                target.display(),
                e.error
            ))
        })?;

        Ok(relative)
    }

    pub fn read(&self, storage_path: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.root.join(storage_path);
        std::fs::read(&path)
            .map_err(|e| StoreError::Storage(format!("cannot read {}: {e}", path.display())))
    }

    pub fn contains(&self, storage_path: &str) -> bool {
        self.root.join(storage_path).is_file()
    }

    /// Remove a stored artifact. Missing files are not an error.
    pub fn remove(&self, storage_path: &str) -> Result<(), StoreError> {
        let path = self.root.join(storage_path);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Storage(format!(
                "cannot remove {}: {e}",
                path.display()
            ))),
        }
    }
}
