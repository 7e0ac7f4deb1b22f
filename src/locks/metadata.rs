//! What a lock marker says about its holder.

use crate::error::{PatchbayError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::path::Path;

/// JSON body of a lock marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockMetadata {
    /// `user@host` of the holder.
    pub owner: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    pub created_at: DateTime<Utc>,

    /// What the holder is doing, e.g. `merge`.
    pub action: String,
}

/// Time since a lock was taken, shown as `3d 4h`, `2h 5m` or `7m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockAge(chrono::Duration);

impl LockAge {
    pub fn minutes(&self) -> i64 {
        self.0.num_minutes()
    }
}

impl fmt::Display for LockAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (days, hours, minutes) = (self.0.num_days(), self.0.num_hours(), self.minutes());
        if days > 0 {
            write!(f, "{}d {}h", days, hours % 24)
        } else if hours > 0 {
            write!(f, "{}h {}m", hours, minutes % 60)
        } else {
            write!(f, "{}m", minutes.max(0))
        }
    }
}

impl LockMetadata {
    /// Metadata for this process, stamped now.
    pub fn new(action: &str) -> Self {
        Self {
            owner: holder(),
            pid: Some(std::process::id()),
            created_at: Utc::now(),
            action: action.to_string(),
        }
    }

    /// Parse the marker at `path`.
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PatchbayError::LockError(format!("failed to read lock file '{}': {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            PatchbayError::LockError(format!("failed to parse lock file '{}': {}", path.display(), e))
        })
    }

    /// Write into a freshly created marker and sync it.
    pub(super) fn write_to(&self, file: &mut File) -> Result<()> {
        serde_json::to_writer_pretty(&mut *file, self).map_err(|e| {
            PatchbayError::LockError(format!("failed to write lock metadata: {}", e))
        })?;
        file.sync_all()
            .map_err(|e| PatchbayError::LockError(format!("failed to sync lock file: {}", e)))
    }

    pub fn age(&self) -> LockAge {
        LockAge(Utc::now().signed_duration_since(self.created_at))
    }

    /// Older than `stale_minutes`.
    pub fn is_stale(&self, stale_minutes: u32) -> bool {
        self.age().minutes() > i64::from(stale_minutes)
    }
}

fn holder() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}@{}", user, host)
}
