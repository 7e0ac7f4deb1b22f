//! Dependency graph over plan tasks.
//!
//! [`TaskGraph::build`] rejects plans that reference unknown tasks or repeat
//! an id; [`TaskGraph::order`] yields a topological order that is identical
//! for identical input, or fails on a cycle. A partial order is never
//! returned.

use crate::error::{PatchbayError, Result};
use crate::plan::{Plan, Task};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;

/// Validated dependency graph.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// Dependencies of each task (deduplicated).
    deps: BTreeMap<String, BTreeSet<String>>,
    /// Reverse edges: tasks that depend on each task.
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl TaskGraph {
    /// Build and validate the graph.
    ///
    /// Fails with a `GraphError` naming the task and the missing dependency,
    /// or the first duplicated id.
    pub fn build(tasks: &[Task]) -> Result<Self> {
        let mut seen = HashSet::new();
        for task in tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(PatchbayError::GraphError(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
        }

        let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut dependents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for task in tasks {
            dependents.entry(task.id.clone()).or_default();
            let entry = deps.entry(task.id.clone()).or_default();
            for dep in &task.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(PatchbayError::GraphError(format!(
                        "task '{}' depends on missing task '{}'",
                        task.id, dep
                    )));
                }
                entry.insert(dep.clone());
            }
        }
        for (id, task_deps) in &deps {
            for dep in task_deps {
                dependents.entry(dep.clone()).or_default().insert(id.clone());
            }
        }

        Ok(Self { deps, dependents })
    }

    /// Dependencies of a task, sorted.
    pub fn dependencies(&self, id: &str) -> impl Iterator<Item = &str> {
        self.deps.get(id).into_iter().flatten().map(String::as_str)
    }

    /// Topological order (Kahn's algorithm, smallest ready id first).
    ///
    /// Every task appears after all of its dependencies. Fails with a
    /// `GraphError` naming the tasks left on a cycle.
    pub fn order(&self) -> Result<Vec<String>> {
        let mut remaining: BTreeMap<&str, usize> = self
            .deps
            .iter()
            .map(|(id, d)| (id.as_str(), d.len()))
            .collect();
        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut out = Vec::with_capacity(self.deps.len());
        while let Some(id) = ready.pop_first() {
            out.push(id.to_string());
            remaining.remove(id);
            for dependent in self.dependents.get(id).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(dependent.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent.as_str());
                    }
                }
            }
        }

        if out.len() != self.deps.len() {
            let stuck: Vec<&str> = remaining.keys().copied().collect();
            return Err(PatchbayError::GraphError(format!(
                "cycle detected in task dependencies; unordered tasks: {}",
                stuck.join(", ")
            )));
        }
        Ok(out)
    }

    /// Graphviz DOT for `plan`: one cluster per milestone, tasks labelled
    /// with their owner, an edge from each dependency to its dependent.
    pub fn to_dot(&self, plan: &Plan) -> String {
        let mut out = String::from("digraph Plan {\n  rankdir=\"LR\";\n  node [shape=box];\n");
        for milestone in &plan.milestones {
            let _ = writeln!(out, "  subgraph \"cluster_{}\" {{", escape(&milestone.id));
            let _ = writeln!(
                out,
                "    label=\"{}: {}\";",
                escape(&milestone.id),
                escape(milestone.title.as_deref().unwrap_or(""))
            );
            for task in milestone.features.iter().flat_map(|f| &f.tasks) {
                let _ = writeln!(
                    out,
                    "    \"{}\" [label=\"{}\\n{}\"];",
                    escape(&task.id),
                    escape(&task.id),
                    escape(&task.owner)
                );
            }
            out.push_str("  }\n");
        }
        for task in plan.tasks() {
            for dep in self.dependencies(&task.id) {
                let _ = writeln!(out, "  \"{}\" -> \"{}\";", escape(dep), escape(&task.id));
            }
        }
        out.push_str("}\n");
        out
    }
}

/// Quote-safe text for a DOT string.
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
