//! Conflict-avoiding grouping of ready tasks.
//!
//! Touch hints are a cheap proxy for "which files will this task edit".
//! Tasks whose hints overlap are put in different batches so that batches
//! rarely produce overlapping change sets. A task without hints is assumed
//! not to collide with anything.

use crate::plan::Task;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Greedy first-fit partition by touch hints.
///
/// Each task joins the first batch whose combined hints are disjoint from its
/// own, otherwise it opens a new batch. Input order is kept within and across
/// batches.
pub fn partition(tasks: &[Task]) -> Vec<Vec<Task>> {
    let mut batches: Vec<(HashSet<&str>, Vec<Task>)> = Vec::new();

    for task in tasks {
        let hints: HashSet<&str> = task.touch_hints.iter().map(String::as_str).collect();
        match batches
            .iter()
            .position(|(used, _)| used.is_disjoint(&hints))
        {
            Some(slot) => {
                let (used, members) = &mut batches[slot];
                used.extend(hints);
                members.push(task.clone());
            }
            None => batches.push((hints, vec![task.clone()])),
        }
    }

    batches.into_iter().map(|(_, members)| members).collect()
}

/// Batch ids, for logging.
pub fn batch_ids(batches: &[Vec<Task>]) -> Vec<Vec<String>> {
    batches
        .iter()
        .map(|b| b.iter().map(|t| t.id.clone()).collect())
        .collect()
}

/// Add the touch hints configured for each task's owner role.
///
/// Owner matching is case-insensitive. The resulting hints are deduplicated
/// and sorted; tasks whose owner has no entry are left untouched.
pub fn apply_owner_hints<'a>(
    tasks: impl IntoIterator<Item = &'a mut Task>,
    hints_by_owner: &BTreeMap<String, Vec<String>>,
) {
    for task in tasks {
        let owner = task.owner.trim().to_lowercase();
        let Some(extra) = hints_by_owner
            .iter()
            .find(|(role, _)| role.to_lowercase() == owner)
            .map(|(_, hints)| hints)
        else {
            continue;
        };

        let merged: BTreeSet<String> = task
            .touch_hints
            .drain(..)
            .chain(extra.iter().cloned())
            .collect();
        task.touch_hints = merged.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::default_owner_touch_hints;

    fn task(id: &str, hints: &[&str]) -> Task {
        Task {
            touch_hints: hints.iter().map(|h| h.to_string()).collect(),
            ..Task::new(id)
        }
    }

    fn ids(batches: &[Vec<Task>]) -> Vec<Vec<String>> {
        batch_ids(batches)
    }

    #[test]
    fn test_disjoint_tasks_share_a_batch() {
        let tasks = vec![task("A", &["src/"]), task("B", &["docs/"])];
        assert_eq!(ids(&partition(&tasks)), vec![vec!["A", "B"]]);
    }

    #[test]
    fn test_overlapping_tasks_are_split() {
        let tasks = vec![
            task("A", &["src/"]),
            task("B", &["src/", "tests/"]),
            task("C", &["docs/"]),
            task("D", &["tests/"]),
        ];
        assert_eq!(
            ids(&partition(&tasks)),
            vec![vec!["A", "C", "D"], vec!["B"]]
        );
    }

    #[test]
    fn test_empty_hints_join_first_batch() {
        let tasks = vec![task("A", &["src/"]), task("B", &["src/"]), task("C", &[])];
        assert_eq!(ids(&partition(&tasks)), vec![vec!["A", "C"], vec!["B"]]);
    }

    #[test]
    fn test_batches_have_disjoint_hints() {
        let tasks = vec![
            task("A", &["x"]),
            task("B", &["x", "y"]),
            task("C", &["y"]),
            task("D", &["x"]),
            task("E", &["z", "y"]),
        ];
        for batch in partition(&tasks) {
            let mut seen = HashSet::new();
            for t in &batch {
                for h in &t.touch_hints {
                    assert!(seen.insert(h.clone()), "hint {} repeated in a batch", h);
                }
            }
        }
    }

    #[test]
    fn test_every_task_appears_once() {
        let tasks = vec![task("A", &["x"]), task("B", &["x"]), task("C", &["x"])];
        let batches = partition(&tasks);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 3);
    }

    #[test]
    fn test_empty_input() {
        assert!(partition(&[]).is_empty());
    }

    #[test]
    fn test_apply_owner_hints_merges_and_sorts() {
        let mut tasks = vec![
            Task {
                owner: "Scaffolder".to_string(),
                ..task("A", &["ci/", "src/"])
            },
            Task {
                owner: "backend".to_string(),
                ..task("B", &["src/"])
            },
        ];

        apply_owner_hints(&mut tasks, &default_owner_touch_hints());

        assert_eq!(
            tasks[0].touch_hints,
            vec!["Dockerfile", "Makefile", "ci/", "orchestrator/", "src/"]
        );
        assert_eq!(tasks[1].touch_hints, vec!["src/"]);
    }
}
