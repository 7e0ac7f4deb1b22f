//! Full-copy snapshots used for rollback.

use crate::error::{PatchbayError, Result};
use crate::fs::{copy_tree, remove_tree};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary full copy of a directory tree.
///
/// The copy lives in a temp directory that is deleted when the snapshot is
/// dropped, whether or not it was restored.
#[derive(Debug)]
pub struct Snapshot {
    dir: TempDir,
}

impl Snapshot {
    /// Copy `root` into a new temp directory.
    pub fn take(root: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("patchbay-snap-")
            .tempdir()
            .map_err(|e| {
                PatchbayError::UserError(format!("failed to create snapshot directory: {}", e))
            })?;
        copy_tree(root, &dir.path().join("repo"), &[])?;
        Ok(Self { dir })
    }

    fn copy_path(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    /// Replace `root` with the snapshot contents.
    pub fn restore(&self, root: &Path) -> Result<()> {
        remove_tree(root)?;
        copy_tree(&self.copy_path(), root, &[])?;
        Ok(())
    }
}

/// Run `op` and roll `root` back if it fails.
///
/// The snapshot is taken before `op` runs and discarded on every exit path.
/// A failed restore is logged and the original error is returned.
pub fn guarded<T, F>(root: &Path, op: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let snapshot = Snapshot::take(root)?;
    let result = op();
    if result.is_err()
        && let Err(e) = snapshot.restore(root)
    {
        tracing::warn!(root = %root.display(), error = %e, "rollback failed");
    }
    result
}
