//! Content-hash change tracking.
//!
//! An inventory maps every regular file below a root (minus ignored
//! directories) to the SHA-256 of its contents. Comparing two inventories of
//! the same tree gives the change set of whatever happened in between.

use crate::error::{PatchbayError, Result};
use crate::fs::{is_ignored, relative_path};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::io::Read;
use std::path::Path;
use walkdir::WalkDir;

/// Relative path (forward slashes) to SHA-256 hex digest.
pub type Inventory = BTreeMap<String, String>;

/// Files created, deleted and modified between two inventories.
///
/// Each set is sorted; the three are disjoint for a change set produced by
/// [`diff`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub created: BTreeSet<String>,
    #[serde(default)]
    pub deleted: BTreeSet<String>,
    #[serde(default)]
    pub modified: BTreeSet<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }

    /// Every path touched, in any category.
    pub fn paths(&self) -> BTreeSet<&str> {
        self.created
            .iter()
            .chain(&self.deleted)
            .chain(&self.modified)
            .map(String::as_str)
            .collect()
    }

    /// Category-wise union.
    pub fn union(&self, other: &ChangeSet) -> ChangeSet {
        ChangeSet {
            created: self.created.union(&other.created).cloned().collect(),
            deleted: self.deleted.union(&other.deleted).cloned().collect(),
            modified: self.modified.union(&other.modified).cloned().collect(),
        }
    }

    /// Fold `other` into `self`.
    pub fn extend(&mut self, other: &ChangeSet) {
        self.created.extend(other.created.iter().cloned());
        self.deleted.extend(other.deleted.iter().cloned());
        self.modified.extend(other.modified.iter().cloned());
    }

    /// Paths touched by both change sets, sorted.
    pub fn overlap(&self, other: &ChangeSet) -> Vec<String> {
        let theirs = other.paths();
        self.paths()
            .into_iter()
            .filter(|p| theirs.contains(p))
            .map(str::to_string)
            .collect()
    }

    /// Read a change set artifact.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PatchbayError::UserError(format!(
                "failed to read change set '{}': {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            PatchbayError::UserError(format!(
                "failed to parse change set '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write a change set artifact atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            PatchbayError::UserError(format!("failed to serialize change set: {}", e))
        })?;
        crate::fs::atomic_write_file(path, &json)
    }
}

/// Hash every regular file below `root`, skipping ignored directories.
///
/// Symlinks are not followed. Unchanged trees give identical inventories.
pub fn inventory(root: &Path, ignore_dirs: &[String]) -> Result<Inventory> {
    let mut out = Inventory::new();
    let walker = WalkDir::new(root).min_depth(1).into_iter().filter_entry(|entry| {
        entry
            .path()
            .strip_prefix(root)
            .map(|rel| !is_ignored(rel, ignore_dirs))
            .unwrap_or(false)
    });

    for entry in walker {
        let entry = entry.map_err(|e| {
            PatchbayError::UserError(format!("failed to walk '{}': {}", root.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(rel) = relative_path(root, entry.path()) else {
            continue;
        };
        let digest = sha256_file_hex(entry.path()).map_err(|e| {
            PatchbayError::UserError(format!(
                "failed to hash '{}': {}",
                entry.path().display(),
                e
            ))
        })?;
        out.insert(rel, digest);
    }
    Ok(out)
}

/// Compare two inventories.
pub fn diff(before: &Inventory, after: &Inventory) -> ChangeSet {
    let mut changes = ChangeSet::default();
    for (path, hash) in after {
        match before.get(path) {
            None => {
                changes.created.insert(path.clone());
            }
            Some(old) if old != hash => {
                changes.modified.insert(path.clone());
            }
            Some(_) => {}
        }
    }
    for path in before.keys() {
        if !after.contains_key(path) {
            changes.deleted.insert(path.clone());
        }
    }
    changes
}

fn sha256_file_hex(path: &Path) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mut hasher = Sha256::new();

    let mut buf = [0u8; 16 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let mut out = String::with_capacity(64);
    for b in hasher.finalize() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    Ok(out)
}
