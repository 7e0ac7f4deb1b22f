//! Implementation of the `patchbay order` command.
//!
//! Read-only: the plan document is not rewritten. With `--dot` the
//! dependency graph is also exported for Graphviz.

use super::load_config;
use crate::batch::{apply_owner_hints, batch_ids, partition};
use crate::cli::OrderArgs;
use crate::context::resolve_in;
use crate::fs::atomic_write_file;
use crate::error::Result;
use crate::exit_codes;
use crate::graph::TaskGraph;
use crate::plan::{Plan, Task};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Topological order of the whole plan and the batches of the ready tasks.
pub struct OrderView {
    pub order: Vec<String>,
    pub batches: Vec<Vec<String>>,
}

pub fn build_view(plan: &mut Plan, hints: &BTreeMap<String, Vec<String>>) -> Result<OrderView> {
    let order = TaskGraph::build(&plan.flatten())?.order()?;
    apply_owner_hints(plan.tasks_mut(), hints);

    let rank: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let mut ready: Vec<Task> = plan
        .ready_ids()
        .iter()
        .filter_map(|id| plan.task(id).cloned())
        .collect();
    ready.sort_by_key(|t| rank.get(t.id.as_str()).copied().unwrap_or(usize::MAX));

    let batches = batch_ids(&partition(&ready));
    Ok(OrderView { order, batches })
}

pub fn cmd_order(workspace: &Path, args: OrderArgs) -> Result<i32> {
    let config = load_config(workspace, &args.config)?;
    let mut plan = Plan::load(resolve_in(workspace, &args.plan))?;
    // Exported before ordering so a cycle can still be inspected.
    if let Some(dot) = &args.dot {
        let path = resolve_in(workspace, dot);
        write_dot(&plan, &path)?;
        println!("Wrote dependency graph to {}", path.display());
    }
    let view = build_view(&mut plan, &config.owner_touch_hints)?;

    println!("Order:");
    for (i, id) in view.order.iter().enumerate() {
        let status = plan.task(id).map(|t| t.status.as_str()).unwrap_or("?");
        println!("  {:>3}. {:<24} {}", i + 1, id, status);
    }
    println!();

    println!("Ready batches:");
    if view.batches.is_empty() {
        println!("  (none)");
    }
    for (i, batch) in view.batches.iter().enumerate() {
        println!("  {:>3}: {}", i + 1, batch.join(", "));
    }

    Ok(exit_codes::SUCCESS)
}

/// Write the plan's dependency graph as DOT.
pub fn write_dot(plan: &Plan, path: &Path) -> Result<()> {
    let graph = TaskGraph::build(&plan.flatten())?;
    atomic_write_file(path, &graph.to_dot(plan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::default_owner_touch_hints;
    use crate::error::PatchbayError;
    use serde_json::json;

    fn plan(tasks: serde_json::Value) -> Plan {
        Plan::parse(&crate::test_support::plan_json(tasks)).unwrap()
    }

    #[test]
    fn test_view_orders_dependencies_first() {
        let mut plan = plan(json!([
            {"id": "B", "depends_on": ["A"]},
            {"id": "A"}
        ]));
        let view = build_view(&mut plan, &default_owner_touch_hints()).unwrap();

        assert_eq!(view.order, vec!["A", "B"]);
        assert_eq!(view.batches, vec![vec!["A"]]);
    }

    #[test]
    fn test_owner_hints_split_ready_batches() {
        let mut plan = plan(json!([
            {"id": "D1", "owner": "docs"},
            {"id": "D2", "owner": "Docs"},
            {"id": "Q1", "owner": "qa"}
        ]));
        let view = build_view(&mut plan, &default_owner_touch_hints()).unwrap();

        assert_eq!(view.batches, vec![vec!["D1", "Q1"], vec!["D2"]]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut plan = plan(json!([
            {"id": "A", "depends_on": ["B"]},
            {"id": "B", "depends_on": ["A"]}
        ]));
        let err = build_view(&mut plan, &default_owner_touch_hints())
            .err()
            .unwrap();
        assert!(matches!(err, PatchbayError::GraphError(_)));
    }

    #[test]
    fn test_dot_export_survives_a_cycle() {
        let plan = plan(json!([
            {"id": "A", "owner": "docs", "depends_on": ["B"]},
            {"id": "B", "depends_on": ["A"]}
        ]));
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("graphs/plan.dot");

        write_dot(&plan, &path).unwrap();

        let dot = std::fs::read_to_string(&path).unwrap();
        assert!(dot.contains("subgraph \"cluster_M1\" {"));
        assert!(dot.contains("\"A\" [label=\"A\\ndocs\"];"));
        assert!(dot.contains("  \"B\" -> \"A\";"));
        assert!(dot.contains("  \"A\" -> \"B\";"));
    }

    #[test]
    fn test_cmd_order_writes_dot_file() {
        let plan = crate::test_support::plan_json(json!([
            {"id": "A"},
            {"id": "B", "depends_on": ["A"]}
        ]));
        let ws = crate::test_support::create_workspace(&[("plan.json", plan.as_str())]);
        let args = OrderArgs {
            plan: "plan.json".into(),
            config: "patchbay.yaml".into(),
            dot: Some("plan.dot".into()),
        };

        assert_eq!(cmd_order(ws.path(), args).unwrap(), exit_codes::SUCCESS);

        let dot = std::fs::read_to_string(ws.path().join("plan.dot")).unwrap();
        assert!(dot.starts_with("digraph Plan {"));
        assert!(dot.contains("  \"A\" -> \"B\";"));
    }
}
