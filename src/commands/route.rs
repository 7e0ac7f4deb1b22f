//! Implementation of the `patchbay route` command.

use super::load_config;
use crate::capability::Catalogue;
use crate::cli::RouteArgs;
use crate::context::resolve_in;
use crate::error::Result;
use crate::exit_codes;
use crate::plan::{Plan, Task};
use std::path::Path;

/// Where a task would run and why.
#[derive(Debug, PartialEq, Eq)]
pub struct RouteLine {
    pub task: String,
    pub capability: String,
    /// None when the plan already pins a catalogue capability.
    pub score: Option<usize>,
}

pub fn route_line(task: &Task, catalogue: &Catalogue, default_name: &str) -> RouteLine {
    if let Some(pinned) = &task.capability
        && catalogue.contains(pinned)
    {
        return RouteLine {
            task: task.id.clone(),
            capability: pinned.clone(),
            score: None,
        };
    }
    let route = catalogue.route(task, default_name);
    RouteLine {
        task: task.id.clone(),
        capability: route.capability.name.clone(),
        score: Some(route.score),
    }
}

pub fn cmd_route(workspace: &Path, args: RouteArgs) -> Result<i32> {
    let config = load_config(workspace, &args.config)?;
    let plan = Plan::load(resolve_in(workspace, &args.plan))?;
    let catalogue = Catalogue::load_or_default(
        resolve_in(workspace, &args.capabilities),
        &config.default_capability,
    )?;

    println!("{:<24} {:<24} SCORE", "TASK", "CAPABILITY");
    for task in plan.tasks() {
        let line = route_line(task, &catalogue, &config.default_capability);
        let score = match line.score {
            Some(score) => score.to_string(),
            None => "pinned".to_string(),
        };
        println!("{:<24} {:<24} {}", line.task, line.capability, score);
    }

    Ok(exit_codes::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOGUE: &str = "\
capabilities:
  core:
    tags: [api]
  docs_writer:
    tags: [docs, readme]
";

    fn task(id: &str, description: &str, capability: Option<&str>) -> Task {
        Task {
            description: description.to_string(),
            capability: capability.map(str::to_string),
            ..Task::new(id)
        }
    }

    #[test]
    fn test_route_line_scores_tags() {
        let catalogue = Catalogue::from_yaml(CATALOGUE).unwrap();
        let line = route_line(&task("T1", "update the README docs", None), &catalogue, "core");

        assert_eq!(line.capability, "docs_writer");
        assert!(line.score.unwrap() > 0);
    }

    #[test]
    fn test_pinned_capability_is_kept() {
        let catalogue = Catalogue::from_yaml(CATALOGUE).unwrap();
        let line = route_line(
            &task("T1", "update the README docs", Some("core")),
            &catalogue,
            "core",
        );

        assert_eq!(
            line,
            RouteLine {
                task: "T1".to_string(),
                capability: "core".to_string(),
                score: None,
            }
        );
    }

    #[test]
    fn test_unknown_pin_is_rerouted_to_default() {
        let catalogue = Catalogue::from_yaml(CATALOGUE).unwrap();
        let line = route_line(&task("T1", "misc", Some("gone")), &catalogue, "core");

        assert_eq!(line.capability, "core");
        assert_eq!(line.score, Some(0));
    }
}
