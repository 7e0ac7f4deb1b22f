//! Single-writer merging into the canonical workspace.
//!
//! Every merge runs under the run's merge lock. Inside the critical section
//! the task's created and modified files are copied from its sandbox, its
//! deleted files are removed, and its change set is folded into the merged
//! change set of the run.

use crate::changes::ChangeSet;
use crate::config::Config;
use crate::context::RunContext;
use crate::error::{PatchbayError, Result};
use crate::locks::{FileLock, Lock};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct MergeCoordinator {
    workspace_root: PathBuf,
    lock: Box<dyn Lock>,
    timeout: Duration,
    merged: ChangeSet,
    /// What each merge put into the workspace, in merge order.
    commits: Vec<ChangeSet>,
}

impl MergeCoordinator {
    /// Coordinator using the run's file lock and the configured timeouts.
    pub fn new(ctx: &RunContext, config: &Config) -> Self {
        let lock = FileLock::new(ctx.merge_lock_path(), config.merge_lock_poll()).with_action("merge");
        Self::with_lock(&ctx.workspace_root, lock, config.merge_lock_timeout())
    }

    pub fn with_lock(workspace_root: &Path, lock: impl Lock + 'static, timeout: Duration) -> Self {
        Self {
            workspace_root: workspace_root.to_path_buf(),
            lock: Box::new(lock),
            timeout,
            merged: ChangeSet::default(),
            commits: Vec::new(),
        }
    }

    /// Union of every change set merged so far.
    pub fn merged(&self) -> &ChangeSet {
        &self.merged
    }

    /// Number of merges so far; a mark for [`Self::merged_since`].
    pub fn merge_count(&self) -> usize {
        self.commits.len()
    }

    /// Union of the change sets merged after the first `count` merges.
    pub fn merged_since(&self, count: usize) -> ChangeSet {
        self.commits
            .iter()
            .skip(count)
            .fold(ChangeSet::default(), |acc, commit| acc.union(commit))
    }

    /// Merge one task's sandbox.
    ///
    /// Fails with `LockTimeout` when the lock stays held, and before writing
    /// anything when a source file is missing from the sandbox. If a write
    /// fails midway, the paths already written are still recorded as merged.
    pub fn merge(&mut self, task_id: &str, sandbox: &Path, changes: &ChangeSet) -> Result<()> {
        check_sources(sandbox, changes)?;
        let guard = self.lock.acquire(self.timeout)?;

        let mut written = ChangeSet::default();
        let result = merge_changes(sandbox, &self.workspace_root, changes, &mut written);
        match &result {
            Ok(()) => self.record(changes.clone()),
            Err(e) => {
                tracing::warn!(task = task_id, paths = ?written.paths(), error = %e, "merge stopped partway");
                if !written.is_empty() {
                    self.record(written);
                }
            }
        }

        if let Err(e) = guard.release() {
            tracing::warn!(lock = self.lock.name(), error = %e, "failed to release lock");
        }
        result?;
        tracing::info!(task = task_id, files = changes.paths().len(), "merged into workspace");
        Ok(())
    }

    fn record(&mut self, commit: ChangeSet) {
        self.merged.extend(&commit);
        self.commits.push(commit);
    }
}

/// Every created or modified path must be a readable file in the sandbox.
fn check_sources(sandbox: &Path, changes: &ChangeSet) -> Result<()> {
    for rel in changes.created.iter().chain(&changes.modified) {
        let src = sandbox.join(rel);
        let meta = fs::File::open(&src)
            .and_then(|file| file.metadata())
            .map_err(|e| merge_error(&src, e))?;
        if !meta.is_file() {
            return Err(PatchbayError::UserError(format!(
                "failed to merge '{}': not a regular file",
                src.display()
            )));
        }
    }
    Ok(())
}

/// Copy created and modified files from `sandbox` to `workspace`, remove
/// deleted ones. Each path lands in `written` once it is in place.
fn merge_changes(
    sandbox: &Path,
    workspace: &Path,
    changes: &ChangeSet,
    written: &mut ChangeSet,
) -> Result<()> {
    for (rel, created) in changes
        .created
        .iter()
        .map(|p| (p, true))
        .chain(changes.modified.iter().map(|p| (p, false)))
    {
        let dst = workspace.join(rel);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|e| merge_error(&dst, e))?;
        }
        fs::copy(sandbox.join(rel), &dst).map_err(|e| merge_error(&dst, e))?;
        let into = if created {
            &mut written.created
        } else {
            &mut written.modified
        };
        into.insert(rel.clone());
    }
    for rel in &changes.deleted {
        let dst = workspace.join(rel);
        match fs::remove_file(&dst) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(merge_error(&dst, e)),
        }
        written.deleted.insert(rel.clone());
    }
    Ok(())
}

fn merge_error(path: &Path, e: std::io::Error) -> PatchbayError {
    PatchbayError::UserError(format!("failed to merge '{}': {}", path.display(), e))
}
