//! Tag-based routing of tasks to capabilities.

use super::{Capability, Catalogue};
use crate::plan::Task;

/// The capability chosen for a task and its tag score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route<'a> {
    pub capability: &'a Capability,
    /// Zero when the default was used.
    pub score: usize,
}

/// Text routed on: description, expected output and touch hints.
pub fn routing_text(task: &Task) -> String {
    let mut parts = vec![task.description.as_str(), task.expected_output.as_str()];
    parts.extend(task.touch_hints.iter().map(String::as_str));
    parts.join(" ").to_lowercase()
}

/// Number of the capability's tags occurring in `text` (case-insensitive).
pub fn score(capability: &Capability, text: &str) -> usize {
    let text = text.to_lowercase();
    capability
        .tags
        .iter()
        .filter(|tag| !tag.is_empty() && text.contains(&tag.to_lowercase()))
        .count()
}

impl Catalogue {
    /// Pick a capability for a task.
    ///
    /// Highest score wins, earlier declaration wins ties. With no positive
    /// score, `default_name` is used, or the first entry if it is unknown.
    pub fn route(&self, task: &Task, default_name: &str) -> Route<'_> {
        let text = routing_text(task);
        let mut best: Option<Route<'_>> = None;
        for capability in self.iter() {
            let s = score(capability, &text);
            if s > 0 && best.as_ref().is_none_or(|b| s > b.score) {
                best = Some(Route { capability, score: s });
            }
        }

        best.unwrap_or_else(|| Route {
            capability: self.default_capability(default_name),
            score: 0,
        })
    }

    fn default_capability(&self, default_name: &str) -> &Capability {
        // A catalogue is never empty, see `Catalogue::new`.
        self.get(default_name).unwrap_or(&self.entries[0])
    }
}

/// Assign a capability to every task.
///
/// A task that already names a catalogue capability keeps it; anything else
/// is routed.
pub fn assign_capabilities<'a>(
    tasks: impl IntoIterator<Item = &'a mut Task>,
    catalogue: &Catalogue,
    default_name: &str,
) {
    for task in tasks {
        if let Some(existing) = &task.capability
            && catalogue.contains(existing)
        {
            continue;
        }
        let route = catalogue.route(task, default_name);
        tracing::debug!(
            task = %task.id,
            capability = %route.capability.name,
            score = route.score,
            "routed task"
        );
        task.capability = Some(route.capability.name.clone());
    }
}
