//! Lock acquisition, listing, and clearing operations.

use super::file_lock::LockGuard;
use super::metadata::LockMetadata;
use super::types::LockInfo;
use crate::error::{PatchbayError, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;

/// Try once to create a lock file with create_new semantics.
///
/// Returns `Ok(None)` when the lock is held by someone else, so callers can
/// decide whether to poll. Any other I/O failure is a `LockError`.
pub fn try_acquire(lock_path: &Path, metadata: &LockMetadata) -> Result<Option<LockGuard>> {
    if let Some(parent) = lock_path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            PatchbayError::LockError(format!(
                "failed to create locks directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let mut file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
        Err(e) => {
            return Err(PatchbayError::LockError(format!(
                "failed to acquire lock '{}': {}",
                lock_path.display(),
                e
            )));
        }
    };

    // From here on the file is ours; the guard removes it if writing fails.
    let guard = LockGuard::new(lock_path.to_path_buf());

    metadata.write_to(&mut file)?;
    Ok(Some(guard))
}

/// List all locks in a locks directory, sorted by name.
///
/// A missing directory has no locks. Files that are not valid lock metadata
/// are skipped.
pub fn list_locks(locks_dir: &Path, stale_minutes: u32) -> Result<Vec<LockInfo>> {
    let mut locks = Vec::new();

    if !locks_dir.exists() {
        return Ok(locks);
    }

    let entries = fs::read_dir(locks_dir).map_err(|e| {
        PatchbayError::UserError(format!(
            "failed to read locks directory '{}': {}",
            locks_dir.display(),
            e
        ))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| {
            PatchbayError::UserError(format!("failed to read locks directory entry: {}", e))
        })?;
        let path = entry.path();

        if path.extension().and_then(|e| e.to_str()) != Some("lock") {
            continue;
        }
        let Ok(metadata) = LockMetadata::read(&path) else {
            tracing::debug!(path = %path.display(), "skipping unreadable lock file");
            continue;
        };
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let is_stale = metadata.is_stale(stale_minutes);

        locks.push(LockInfo {
            path,
            name,
            metadata,
            is_stale,
        });
    }

    locks.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(locks)
}

/// Remove a named lock file and return what it held.
///
/// The caller decides whether clearing is appropriate (e.g. `--force`).
pub fn clear_lock(locks_dir: &Path, name: &str, stale_minutes: u32) -> Result<LockInfo> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(PatchbayError::UserError(format!(
            "invalid lock name '{}'",
            name
        )));
    }

    let lock_path = locks_dir.join(format!("{}.lock", name));
    if !lock_path.exists() {
        return Err(PatchbayError::UserError(format!(
            "lock '{}' does not exist at: {}",
            name,
            lock_path.display()
        )));
    }

    let metadata = LockMetadata::read(&lock_path)?;
    let is_stale = metadata.is_stale(stale_minutes);

    fs::remove_file(&lock_path).map_err(|e| {
        PatchbayError::LockError(format!(
            "failed to clear lock '{}': {}",
            lock_path.display(),
            e
        ))
    })?;

    Ok(LockInfo {
        path: lock_path,
        name: name.to_string(),
        metadata,
        is_stale,
    })
}
