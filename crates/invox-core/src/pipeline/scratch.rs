//! Per-run scratch directory for decrypted and preprocessed artifacts.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// A uniquely named directory owned by a single extraction run.
///
/// Artifact names derive from the run id, never from uploaded filenames, so
/// concurrent runs cannot collide. The directory is removed by [`close`] or,
/// on any other exit path, when the value is dropped. Removal failures are
/// logged and otherwise ignored.
///
/// [`close`]: ScratchSpace::close
pub struct ScratchSpace {
    run_id: Uuid,
    dir: Option<TempDir>,
}

impl ScratchSpace {
    /// Create a scratch directory under `root`, or the system temp dir.
    pub fn create(root: Option<&Path>) -> std::io::Result<Self> {
        let run_id = Uuid::new_v4();
        let mut builder = tempfile::Builder::new();
        builder.prefix("invox-run-");

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!(run = %run_id, "Created scratch space {}", dir.path().display());

        Ok(Self {
            run_id,
            dir: Some(dir),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Directory holding this run's artifacts.
    pub fn path(&self) -> &Path {
        self.dir.as_ref().map(TempDir::path).unwrap_or_else(|| Path::new(""))
    }

    /// Path for a named artifact of this run, e.g. `<run>-page-1.png`.
    pub fn artifact(&self, label: &str, extension: &str) -> PathBuf {
        self.path()
            .join(format!("{}-{}.{}", self.run_id, label, extension))
    }

    /// Remove the directory now.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => debug!(run = %self.run_id, "Removed scratch space"),
            Err(e) => warn!(
                run = %self.run_id,
                "Failed to remove scratch space {}: {}",
                path.display(),
                e
            ),
        }
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_close_removes_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::create(Some(root.path())).unwrap();
        let artifact = scratch.artifact("page-1", "png");
        std::fs::write(&artifact, b"pixels").unwrap();
        assert!(artifact.starts_with(root.path()));
        assert_eq!(entries(root.path()), 1);

        scratch.close();
        assert!(!artifact.exists());
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn test_drop_removes_artifacts_on_early_exit() {
        let root = tempfile::tempdir().unwrap();

        let failing = || -> std::io::Result<()> {
            let scratch = ScratchSpace::create(Some(root.path()))?;
            std::fs::write(scratch.artifact("decrypted", "bin"), b"secret")?;
            Err(std::io::Error::other("stage failed"))
        };
        assert!(failing().is_err());
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn test_runs_get_distinct_names() {
        let root = tempfile::tempdir().unwrap();
        let a = ScratchSpace::create(Some(root.path())).unwrap();
        let b = ScratchSpace::create(Some(root.path())).unwrap();

        assert_ne!(a.run_id(), b.run_id());
        assert_ne!(a.path(), b.path());
        assert_ne!(a.artifact("page-1", "png"), b.artifact("page-1", "png"));
    }

    #[test]
    fn test_creates_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("scratch");
        let scratch = ScratchSpace::create(Some(&nested)).unwrap();
        assert!(scratch.path().starts_with(&nested));
    }
}
