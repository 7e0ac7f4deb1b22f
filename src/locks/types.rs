//! Lock information structures.

use super::metadata::LockMetadata;
use std::path::PathBuf;

/// Information about an active lock.
#[derive(Debug, Clone)]
pub struct LockInfo {
    /// The lock file path.
    pub path: PathBuf,

    /// The lock name (the file stem, e.g. "merge").
    pub name: String,

    /// The lock metadata.
    pub metadata: LockMetadata,

    /// Whether the lock is older than the stale threshold.
    pub is_stale: bool,
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (owner: {}, age: {}, action: {}{})",
            self.name,
            self.metadata.owner,
            self.metadata.age(),
            self.metadata.action,
            if self.is_stale { ", STALE" } else { "" }
        )
    }
}
