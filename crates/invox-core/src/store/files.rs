//! Storage of encrypted document blobs.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::StoreError;

/// Where ciphertext blobs live. Locations are opaque strings recorded on the
/// [`FileEntry`](crate::models::FileEntry).
pub trait FileStore: Send + Sync {
    /// Store `data` under `name`, returning its location.
    fn write(&self, name: &str, data: &[u8]) -> Result<String, StoreError>;

    fn read(&self, location: &str) -> Result<Vec<u8>, StoreError>;

    /// Remove a blob. Removing a missing blob is not an error.
    fn remove(&self, location: &str) -> Result<(), StoreError>;
}

/// Blobs as plain files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl FileStore for LocalFileStore {
    fn write(&self, name: &str, data: &[u8]) -> Result<String, StoreError> {
        // Only the final component is used so names cannot escape the root
        let name = Path::new(name)
            .file_name()
            .ok_or_else(|| StoreError::Conflict(format!("invalid blob name '{}'", name)))?;

        fs::create_dir_all(&self.root).map_err(io_error(&self.root))?;
        let path = self.root.join(name);
        fs::write(&path, data).map_err(io_error(&path))?;

        debug!("Stored {} bytes at {}", data.len(), path.display());
        Ok(path.to_string_lossy().into_owned())
    }

    fn read(&self, location: &str) -> Result<Vec<u8>, StoreError> {
        let path = Path::new(location);
        fs::read(path).map_err(io_error(path))
    }

    fn remove(&self, location: &str) -> Result<(), StoreError> {
        let path = Path::new(location);
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(path)(e)),
        }
    }
}
