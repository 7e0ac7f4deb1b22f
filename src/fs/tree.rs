//! Directory tree copy and removal.

use crate::error::{PatchbayError, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Whether any component of a relative path names an ignored directory.
pub fn is_ignored(rel: &Path, ignore_dirs: &[String]) -> bool {
    rel.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        ignore_dirs.iter().any(|d| d == name.as_ref())
    })
}

/// Repository-relative path with forward slashes, or `None` if `path` is not under `root`.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Copy every regular file under `src` into `dst`, overwriting existing files.
///
/// Paths with an ignored component are skipped, and so is `dst` itself when
/// it lives inside `src`. Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path, ignore_dirs: &[String]) -> Result<usize> {
    fs::create_dir_all(dst).map_err(|e| {
        PatchbayError::UserError(format!(
            "failed to create directory '{}': {}",
            dst.display(),
            e
        ))
    })?;

    let mut copied = 0;
    let walker = WalkDir::new(src).min_depth(1).into_iter().filter_entry(|entry| {
        if entry.path().starts_with(dst) {
            return false;
        }
        entry
            .path()
            .strip_prefix(src)
            .map(|rel| !is_ignored(rel, ignore_dirs))
            .unwrap_or(false)
    });

    for entry in walker {
        let entry = entry.map_err(|e| {
            PatchbayError::UserError(format!("failed to walk '{}': {}", src.display(), e))
        })?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| {
                PatchbayError::UserError(format!(
                    "failed to create directory '{}': {}",
                    target.display(),
                    e
                ))
            })?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    PatchbayError::UserError(format!(
                        "failed to create directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
            fs::copy(entry.path(), &target).map_err(|e| {
                PatchbayError::UserError(format!(
                    "failed to copy '{}' to '{}': {}",
                    entry.path().display(),
                    target.display(),
                    e
                ))
            })?;
            copied += 1;
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping non-regular file");
        }
    }

    Ok(copied)
}

/// Remove a directory tree; a missing directory is not an error.
pub fn remove_tree(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PatchbayError::UserError(format!(
            "failed to remove '{}': {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ignore() -> Vec<String> {
        vec![".git".to_string(), "runs".to_string()]
    }

    #[test]
    fn test_is_ignored_matches_any_component() {
        assert!(is_ignored(Path::new(".git/config"), &ignore()));
        assert!(is_ignored(Path::new("sub/runs/x.txt"), &ignore()));
        assert!(!is_ignored(Path::new("src/running.rs"), &ignore()));
    }

    #[test]
    fn test_relative_path_uses_forward_slashes() {
        let root = Path::new("/repo");
        assert_eq!(
            relative_path(root, Path::new("/repo/src/lib.rs")),
            Some("src/lib.rs".to_string())
        );
        assert_eq!(relative_path(root, Path::new("/repo")), None);
        assert_eq!(relative_path(root, Path::new("/other/x")), None);
    }

    #[test]
    fn test_copy_tree_skips_ignored_dirs() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("src")).unwrap();
        fs::create_dir_all(src.path().join(".git")).unwrap();
        fs::write(src.path().join("src/lib.rs"), "fn a() {}").unwrap();
        fs::write(src.path().join(".git/HEAD"), "ref").unwrap();

        let copied = copy_tree(src.path(), dst.path(), &ignore()).unwrap();

        assert_eq!(copied, 1);
        assert!(dst.path().join("src/lib.rs").exists());
        assert!(!dst.path().join(".git").exists());
    }

    #[test]
    fn test_copy_tree_skips_destination_nested_in_source() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("a.txt"), "a").unwrap();
        let dst = src.path().join("sandboxes").join("t1");

        copy_tree(src.path(), &dst, &[]).unwrap();

        assert!(dst.join("a.txt").exists());
        assert!(!dst.join("sandboxes").exists());
    }

    #[test]
    fn test_copy_tree_overwrites_existing_files() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("a.txt"), "new").unwrap();
        fs::write(dst.path().join("a.txt"), "old").unwrap();
        fs::write(dst.path().join("keep.txt"), "keep").unwrap();

        copy_tree(src.path(), dst.path(), &[]).unwrap();

        assert_eq!(fs::read_to_string(dst.path().join("a.txt")).unwrap(), "new");
        assert!(dst.path().join("keep.txt").exists());
    }

    #[test]
    fn test_remove_tree_missing_is_ok() {
        let temp = TempDir::new().unwrap();
        remove_tree(&temp.path().join("nope")).unwrap();
    }
}
