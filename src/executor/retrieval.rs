//! Context snippets handed to the generator.

use crate::plan::Task;
use serde::{Deserialize, Serialize};

/// A retrieved document excerpt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub snippet: String,
}

/// Source of context for a task, e.g. a knowledge index.
pub trait ContextSource: Send + Sync {
    fn snippets(&self, task: &Task) -> Vec<Snippet>;
}

/// Supplies nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

impl ContextSource for NoContext {
    fn snippets(&self, _task: &Task) -> Vec<Snippet> {
        Vec::new()
    }
}
