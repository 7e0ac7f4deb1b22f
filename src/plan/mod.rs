//! Plan document model for patchbay.
//!
//! The plan is a JSON document of milestones, features and tasks:
//!
//! ```text
//! { "milestones": [ { "id": "M1", "features": [ { "id": "F1", "tasks": [ ... ] } ] } ] }
//! ```
//!
//! Only the fields the dispatcher reads or writes are typed. Every other field
//! at any level is kept in an `extra` map and written back unchanged, so a
//! round trip through patchbay never loses data added by other tools.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod io;
mod mutations;
#[cfg(test)]
mod tests;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    ReadyToMerge,
    Done,
    Failed,
    Skipped,
    Blocked,
}

impl TaskStatus {
    /// Statuses a task never leaves within a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Blocked
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::ReadyToMerge => "ready_to_merge",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Identifier, unique across the whole plan.
    pub id: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub expected_output: String,

    /// Definition-of-done checklist.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dod: Vec<String>,

    /// Role the task is written for (e.g. "docs", "qa").
    #[serde(default)]
    pub owner: String,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Coarse path areas the task is expected to touch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub touch_hints: Vec<String>,

    /// Capability assigned by the router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,

    /// Any fields not explicitly defined above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    /// A `todo` task with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub tasks: Vec<Task>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub features: Vec<Feature>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The whole plan document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub milestones: Vec<Milestone>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Plan {
    /// All tasks in document order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.milestones
            .iter()
            .flat_map(|m| m.features.iter())
            .flat_map(|f| f.tasks.iter())
    }

    /// All tasks in document order, mutably.
    pub fn tasks_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.milestones
            .iter_mut()
            .flat_map(|m| m.features.iter_mut())
            .flat_map(|f| f.tasks.iter_mut())
    }

    /// Owned copies of all tasks in document order.
    pub fn flatten(&self) -> Vec<Task> {
        self.tasks().cloned().collect()
    }

    /// Find a task by id.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks_mut().find(|t| t.id == id)
    }
}
