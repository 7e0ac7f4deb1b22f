//! Per-task sandboxes and snapshot-based rollback.
//!
//! A sandbox is a private copy of the canonical workspace in which one task
//! attempt generates, applies and tests its diffs. Ignored directories (VCS
//! metadata, virtualenvs, the run root itself) are never copied.

mod snapshot;

pub use snapshot::{Snapshot, guarded};

use crate::error::{PatchbayError, Result};
use crate::fs::{copy_tree, remove_tree};
use std::path::{Path, PathBuf};

/// Create a fresh sandbox for `task_id` under `sandboxes_dir`.
///
/// Any existing sandbox for the same task is discarded first.
pub fn create(
    canonical_root: &Path,
    sandboxes_dir: &Path,
    task_id: &str,
    ignore_dirs: &[String],
) -> Result<PathBuf> {
    let sandbox = sandboxes_dir.join(task_id);
    remove_tree(&sandbox)?;
    std::fs::create_dir_all(&sandbox).map_err(|e| {
        PatchbayError::UserError(format!(
            "failed to create sandbox '{}': {}",
            sandbox.display(),
            e
        ))
    })?;

    let copied = copy_tree(canonical_root, &sandbox, ignore_dirs)?;
    tracing::debug!(task = task_id, files = copied, sandbox = %sandbox.display(), "sandbox created");
    Ok(sandbox)
}

/// Apply a unified diff inside a sandbox.
///
/// Returns the paths written or removed. A diff that does not apply is a
/// `PatchError` and leaves the sandbox untouched.
pub fn apply(sandbox: &Path, diff_text: &str) -> Result<Vec<String>> {
    crate::diff::apply_diff(sandbox, diff_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn ignore() -> Vec<String> {
        vec![".git".to_string(), "runs".to_string()]
    }

    #[test]
    fn test_create_copies_workspace_without_ignored_dirs() {
        let ws = TempDir::new().unwrap();
        fs::create_dir_all(ws.path().join("src")).unwrap();
        fs::create_dir_all(ws.path().join(".git")).unwrap();
        fs::write(ws.path().join("src/app.py"), "print(1)\n").unwrap();
        fs::write(ws.path().join(".git/HEAD"), "ref\n").unwrap();
        let sandboxes = ws.path().join("runs/r1/sandboxes");

        let sandbox = create(ws.path(), &sandboxes, "T1", &ignore()).unwrap();

        assert_eq!(sandbox, sandboxes.join("T1"));
        assert!(sandbox.join("src/app.py").exists());
        assert!(!sandbox.join(".git").exists());
        assert!(!sandbox.join("runs").exists());
    }

    #[test]
    fn test_create_discards_previous_attempt() {
        let ws = TempDir::new().unwrap();
        fs::write(ws.path().join("a.txt"), "a").unwrap();
        let sandboxes = ws.path().join("runs/sandboxes");

        let sandbox = create(ws.path(), &sandboxes, "T1", &ignore()).unwrap();
        fs::write(sandbox.join("leftover.txt"), "junk").unwrap();

        let sandbox = create(ws.path(), &sandboxes, "T1", &ignore()).unwrap();
        assert!(!sandbox.join("leftover.txt").exists());
        assert!(sandbox.join("a.txt").exists());
    }

    #[test]
    fn test_apply_failure_leaves_sandbox_untouched() {
        let sandbox = TempDir::new().unwrap();
        fs::write(sandbox.path().join("f.txt"), "one\n").unwrap();

        let err = apply(
            sandbox.path(),
            "--- a/f.txt\n+++ b/f.txt\n@@ -1 +1 @@\n-two\n+three\n",
        )
        .unwrap_err();

        assert!(matches!(err, PatchbayError::PatchError(_)));
        assert_eq!(fs::read_to_string(sandbox.path().join("f.txt")).unwrap(), "one\n");
    }
}
