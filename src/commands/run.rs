//! Implementation of the `patchbay run` command.

use super::load_config;
use crate::capability::Catalogue;
use crate::cli::RunArgs;
use crate::context::{RunContext, generate_run_id, resolve_in};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::executor::Executor;
use crate::plan::Plan;
use std::path::Path;

/// Execute the plan and print the run summary.
///
/// Returns `TASKS_UNRESOLVED` when any task ends failed, blocked, deferred
/// or unscheduled. Graph and load errors are returned as errors.
pub fn cmd_run(workspace: &Path, args: RunArgs) -> Result<i32> {
    let config = load_config(workspace, &args.config)?;
    let run_id = args.run_id.unwrap_or_else(generate_run_id);
    let ctx = RunContext::new(workspace, &config.run_root, &run_id)?;

    let catalogue = Catalogue::load_or_default(
        resolve_in(&ctx.workspace_root, &args.capabilities),
        &config.default_capability,
    )?;
    let plan_path = resolve_in(&ctx.workspace_root, &args.plan);
    let plan = Plan::load(&plan_path)?;

    if config.generator.is_none() {
        tracing::warn!("no generator configured, every task will be skipped");
    }

    let executor = Executor::new(ctx.clone(), &config);
    let mut dispatcher = Dispatcher::new(ctx, config, catalogue, plan, plan_path, executor);
    let report = dispatcher.run()?;

    print!("{}", report);
    Ok(report.exit_code())
}
