//! File I/O for plan documents.

use super::Plan;
use crate::error::{PatchbayError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

/// Task ids name sandbox directories and artifact files.
static TASK_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("task id regex is valid")
});

/// Whether `id` is usable as a task id.
pub fn is_valid_task_id(id: &str) -> bool {
    TASK_ID_REGEX.is_match(id)
}

impl Plan {
    /// Load and validate a plan document.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PatchbayError::UserError(format!(
                "failed to read plan '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content).map_err(|e| match e {
            PatchbayError::UserError(msg) => {
                PatchbayError::UserError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse and validate a plan from JSON text.
    pub fn parse(content: &str) -> Result<Self> {
        let plan: Plan = serde_json::from_str(content)
            .map_err(|e| PatchbayError::UserError(format!("invalid plan JSON: {}", e)))?;
        plan.validate_ids()?;
        Ok(plan)
    }

    /// Check every task id against the id pattern.
    ///
    /// Duplicate ids are reported by the task graph, not here.
    pub fn validate_ids(&self) -> Result<()> {
        for task in self.tasks() {
            if !is_valid_task_id(&task.id) {
                return Err(PatchbayError::UserError(format!(
                    "invalid task id '{}': must start with a letter or digit and contain only letters, digits, '.', '_' or '-'",
                    task.id
                )));
            }
        }
        Ok(())
    }

    /// Serialize the plan as pretty JSON with a trailing newline.
    pub fn to_json_string(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(self)
            .map_err(|e| PatchbayError::UserError(format!("failed to serialize plan: {}", e)))?;
        out.push('\n');
        Ok(out)
    }

    /// Atomically write the plan to disk.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_json_string()?;
        crate::fs::atomic_write_file(path, &content)
    }

    /// Ids that occur more than once, in first-repeat order.
    pub fn duplicate_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut dups = Vec::new();
        for task in self.tasks() {
            if !seen.insert(task.id.as_str()) && !dups.contains(&task.id) {
                dups.push(task.id.clone());
            }
        }
        dups
    }
}
