//! Blocking named lock with timeout.

use super::metadata::LockMetadata;
use super::operations::try_acquire;
use crate::error::{PatchbayError, Result};
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// A mutual-exclusion lock whose guard releases it on drop.
pub trait Lock: Send + Sync {
    /// Block until the lock is held or `timeout` elapses.
    ///
    /// Fails with `PatchbayError::LockTimeout` when the timeout elapses.
    fn acquire(&self, timeout: Duration) -> Result<LockGuard>;

    /// Name used in diagnostics.
    fn name(&self) -> &str;
}

/// Holds a lock marker; removing it on drop releases the lock.
///
/// A failed removal on drop is logged, never raised.
#[derive(Debug)]
pub struct LockGuard {
    marker: PathBuf,
    released: bool,
}

impl LockGuard {
    pub(super) fn new(marker: PathBuf) -> Self {
        Self {
            marker,
            released: false,
        }
    }

    /// Release now, reporting a marker that could not be removed.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        fs::remove_file(&self.marker).map_err(|e| {
            PatchbayError::LockError(format!(
                "failed to release lock '{}': {}",
                self.marker.display(),
                e
            ))
        })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = fs::remove_file(&self.marker)
        {
            tracing::warn!(lock = %self.marker.display(), error = %e, "failed to release lock");
        }
    }
}

/// Lock backed by an exclusively created marker file.
#[derive(Debug, Clone)]
pub struct FileLock {
    marker: PathBuf,
    name: String,
    poll: Duration,
    action: String,
}

impl FileLock {
    /// Lock at `marker`, retried every `poll` while held.
    pub fn new(marker: impl Into<PathBuf>, poll: Duration) -> Self {
        let marker = marker.into();
        let name = marker
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "lock".to_string());
        Self {
            marker,
            name,
            poll,
            action: "lock".to_string(),
        }
    }

    /// Action recorded in the lock metadata.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }
}

impl Lock for FileLock {
    fn acquire(&self, timeout: Duration) -> Result<LockGuard> {
        let metadata = LockMetadata::new(&self.action);
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(guard) = try_acquire(&self.marker, &metadata)? {
                tracing::debug!(lock = %self.name, "lock acquired");
                return Ok(guard);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(PatchbayError::LockTimeout {
                    name: self.name.clone(),
                    timeout,
                });
            }
            thread::sleep(self.poll.min(deadline - now));
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
