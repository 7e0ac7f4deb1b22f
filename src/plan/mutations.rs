//! Status and assignment updates.

use super::{Plan, TaskStatus};
use crate::error::{PatchbayError, Result};
use std::collections::HashMap;

impl Plan {
    /// Set a task's status, returning the previous one.
    pub fn set_status(&mut self, id: &str, status: TaskStatus) -> Result<TaskStatus> {
        let task = self
            .task_mut(id)
            .ok_or_else(|| PatchbayError::UserError(format!("task '{}' not found in plan", id)))?;
        let previous = task.status;
        task.status = status;
        Ok(previous)
    }

    /// Status of every task by id.
    pub fn statuses(&self) -> HashMap<String, TaskStatus> {
        self.tasks().map(|t| (t.id.clone(), t.status)).collect()
    }

    /// Ids of tasks in `todo` whose dependencies are all `done`, in document order.
    pub fn ready_ids(&self) -> Vec<String> {
        let statuses = self.statuses();
        self.tasks()
            .filter(|t| t.status == TaskStatus::Todo)
            .filter(|t| {
                t.depends_on
                    .iter()
                    .all(|d| statuses.get(d) == Some(&TaskStatus::Done))
            })
            .map(|t| t.id.clone())
            .collect()
    }

    /// Reset statuses a previous run left mid-flight back to `todo`.
    ///
    /// `in_progress` means the attempt never finished. `ready_to_merge` tasks
    /// have sandboxes from an older run id, so they are regenerated too.
    pub fn reset_interrupted(&mut self) -> Vec<String> {
        let mut reset = Vec::new();
        for task in self.tasks_mut() {
            if matches!(task.status, TaskStatus::InProgress | TaskStatus::ReadyToMerge) {
                task.status = TaskStatus::Todo;
                reset.push(task.id.clone());
            }
        }
        reset
    }
}
