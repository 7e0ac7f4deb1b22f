//! Workspace and run context resolution for patchbay.
//!
//! A run operates on a canonical workspace (the shared checkout every task
//! merges into) and keeps all of its own state under
//! `<workspace>/<run_root>/<run_id>/`. This module resolves those paths once
//! so the rest of the crate never joins path fragments by hand.
//!
//! All paths held by [`RunContext`] are absolute.

use crate::error::{PatchbayError, Result};
use crate::events::EventLog;
use chrono::Utc;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config file name, relative to the workspace root.
pub const CONFIG_FILE: &str = "patchbay.yaml";

/// Default plan file name, relative to the workspace root.
pub const PLAN_FILE: &str = "plan.json";

/// Default capability catalogue file name, relative to the workspace root.
pub const CAPABILITIES_FILE: &str = "capabilities.yaml";

/// Name of the merge lock (the marker file is `<name>.lock`).
pub const MERGE_LOCK_NAME: &str = "merge";

/// Resolved paths for one patchbay run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Absolute path to the canonical workspace.
    pub workspace_root: PathBuf,

    /// Identifier of this run (a directory name under the run root).
    pub run_id: String,

    /// `<workspace>/<run_root>/<run_id>/`
    pub run_dir: PathBuf,

    /// Per-task sandboxes.
    pub sandboxes_dir: PathBuf,

    /// Per-task diff and change-set artifacts.
    pub artifacts_dir: PathBuf,

    /// JSONL event logs.
    pub logs_dir: PathBuf,

    /// Lock marker files.
    pub locks_dir: PathBuf,
}

impl RunContext {
    /// Build the context for `run_id` in `workspace_root`.
    ///
    /// The workspace must exist; it is canonicalized so sandbox paths never
    /// depend on the caller's working directory.
    pub fn new(workspace_root: &Path, run_root: &str, run_id: &str) -> Result<Self> {
        validate_run_id(run_id)?;

        let workspace_root = workspace_root.canonicalize().map_err(|e| {
            PatchbayError::UserError(format!(
                "failed to resolve workspace '{}': {}",
                workspace_root.display(),
                e
            ))
        })?;
        if !workspace_root.is_dir() {
            return Err(PatchbayError::UserError(format!(
                "workspace '{}' is not a directory",
                workspace_root.display()
            )));
        }

        let run_dir = workspace_root.join(run_root).join(run_id);
        Ok(Self {
            sandboxes_dir: run_dir.join("sandboxes"),
            artifacts_dir: run_dir.join("artifacts"),
            logs_dir: run_dir.join("logs"),
            locks_dir: run_dir.join("locks"),
            run_dir,
            workspace_root,
            run_id: run_id.to_string(),
        })
    }

    /// Resolve the workspace from an explicit directory or the current working directory.
    pub fn resolve(workspace: Option<&Path>, run_root: &str, run_id: &str) -> Result<Self> {
        match workspace {
            Some(dir) => Self::new(dir, run_root, run_id),
            None => Self::new(&current_dir()?, run_root, run_id),
        }
    }

    /// Create every run directory that does not exist yet.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.sandboxes_dir,
            &self.artifacts_dir,
            &self.logs_dir,
            &self.locks_dir,
        ] {
            fs::create_dir_all(dir).map_err(|e| {
                PatchbayError::UserError(format!(
                    "failed to create run directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Sandbox directory for a task.
    pub fn sandbox_path(&self, task_id: &str) -> PathBuf {
        self.sandboxes_dir.join(task_id)
    }

    /// Path of the merge lock marker file.
    pub fn merge_lock_path(&self) -> PathBuf {
        self.lock_path(MERGE_LOCK_NAME)
    }

    /// Path of a named lock marker file.
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.locks_dir.join(format!("{}.lock", name))
    }

    /// `{task_id}_tests.diff`
    pub fn tests_diff_path(&self, task_id: &str) -> PathBuf {
        self.artifacts_dir.join(format!("{}_tests.diff", task_id))
    }

    /// `{task_id}_code.diff`
    pub fn code_diff_path(&self, task_id: &str) -> PathBuf {
        self.artifacts_dir.join(format!("{}_code.diff", task_id))
    }

    /// `changes_{task_id}.json`
    pub fn changes_path(&self, task_id: &str) -> PathBuf {
        self.artifacts_dir.join(format!("changes_{}.json", task_id))
    }

    /// Event log writer for this run.
    pub fn event_log(&self) -> EventLog {
        EventLog::new(&self.logs_dir)
    }
}

/// Run id derived from the current UTC time, e.g. `20261019-142530`.
pub fn generate_run_id() -> String {
    Utc::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Resolve a possibly relative path against the workspace root.
pub fn resolve_in(workspace_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace_root.join(path)
    }
}

pub(crate) fn current_dir() -> Result<PathBuf> {
    env::current_dir().map_err(|e| {
        PatchbayError::UserError(format!("failed to get current working directory: {}", e))
    })
}

fn validate_run_id(run_id: &str) -> Result<()> {
    let valid = !run_id.is_empty()
        && run_id != "."
        && run_id != ".."
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(PatchbayError::UserError(format!(
            "invalid run id '{}': use letters, digits, '-', '_' or '.'",
            run_id
        )))
    }
}
