//! Atomic file writes.
//!
//! All atomic writes follow the same pattern:
//! 1. Write content to a named temporary file in the same directory
//! 2. Sync the file to disk (fsync)
//! 3. Persist it over the target
//!
//! Source and destination must share a filesystem for the rename to be
//! atomic. A temporary file that is never persisted is removed on drop.

use crate::error::{PatchbayError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::{Builder, NamedTempFile};

/// Atomically write bytes to a file, creating parent directories as needed.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| {
            PatchbayError::UserError(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let mut temp = temp_file_for(path, parent)?;
    temp.write_all(content)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| {
            PatchbayError::UserError(format!(
                "failed to write temporary file '{}': {}",
                temp.path().display(),
                e
            ))
        })?;

    temp.persist(path).map_err(|e| {
        PatchbayError::UserError(format!(
            "failed to atomically replace '{}': {}",
            path.display(),
            e.error
        ))
    })?;

    // Persist the directory entry as well.
    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// Atomically write a string to a file.
pub fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Hidden `.{filename}.XXXXXX.tmp` sibling of the target.
fn temp_file_for(target: &Path, dir: &Path) -> Result<NamedTempFile> {
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            PatchbayError::UserError(format!("invalid file path '{}'", target.display()))
        })?;

    Builder::new()
        .prefix(&format!(".{}.", filename))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| {
            PatchbayError::UserError(format!(
                "failed to create temporary file in '{}': {}",
                dir.display(),
                e
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("plan.json");

        atomic_write(&file_path, b"{}").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "{}");
    }

    #[test]
    fn test_atomic_write_replace_existing() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("plan.json");
        fs::write(&file_path, "original content").unwrap();

        atomic_write_file(&file_path, "new content").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "new content");
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir
            .path()
            .join("runs")
            .join("r1")
            .join("artifacts")
            .join("a_code.diff");

        atomic_write_file(&file_path, "diff").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "diff");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.txt");

        atomic_write(&file_path, b"content").unwrap();

        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_temp_file_is_hidden_sibling() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("file.txt");

        let temp = temp_file_for(&target, temp_dir.path()).unwrap();

        assert_eq!(temp.path().parent().unwrap(), temp_dir.path());
        let name = temp.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".file.txt."));
        assert!(name.ends_with(".tmp"));
    }

    #[test]
    fn test_atomic_write_binary_content() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("binary.bin");
        let binary_content: Vec<u8> = (0..256).map(|i| i as u8).collect();

        atomic_write(&file_path, &binary_content).unwrap();

        assert_eq!(fs::read(&file_path).unwrap(), binary_content);
    }
}
