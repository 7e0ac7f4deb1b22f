//! CLI argument parsing for patchbay.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Patchbay: dependency-ordered dispatch and merge coordination for
/// generated code changes.
///
/// Tasks from a plan document run in isolated sandboxes, each producing a
/// tests diff and a code diff behind a test gate. Finished sandboxes are
/// merged back into the workspace one at a time under a file lock.
#[derive(Parser, Debug)]
#[command(name = "patchbay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Workspace root (defaults to the current directory).
    #[arg(long, short = 'w', global = true)]
    pub workspace: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for patchbay.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute the plan.
    ///
    /// Dispatches ready tasks to the worker pool, merges finished sandboxes
    /// and prints a summary. Exits non-zero when tasks are left unresolved.
    Run(RunArgs),

    /// Print the dependency order and the batches of currently ready tasks.
    Order(OrderArgs),

    /// Print the capability each task routes to.
    Route(RouteArgs),

    /// Lock management commands.
    ///
    /// List or clear the locks of a run.
    Lock(LockCommand),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Plan document (relative paths resolve against the workspace).
    #[arg(long, default_value = "plan.json")]
    pub plan: PathBuf,

    /// Capability catalogue.
    #[arg(long, default_value = "capabilities.yaml")]
    pub capabilities: PathBuf,

    /// Configuration file.
    #[arg(long, default_value = "patchbay.yaml")]
    pub config: PathBuf,

    /// Run id (defaults to a timestamp).
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Arguments for the `order` command.
#[derive(Parser, Debug)]
pub struct OrderArgs {
    /// Plan document.
    #[arg(long, default_value = "plan.json")]
    pub plan: PathBuf,

    /// Configuration file (owner touch hints).
    #[arg(long, default_value = "patchbay.yaml")]
    pub config: PathBuf,

    /// Also write the dependency graph as Graphviz DOT to this file.
    #[arg(long, value_name = "FILE")]
    pub dot: Option<PathBuf>,
}

/// Arguments for the `route` command.
#[derive(Parser, Debug)]
pub struct RouteArgs {
    /// Plan document.
    #[arg(long, default_value = "plan.json")]
    pub plan: PathBuf,

    /// Capability catalogue.
    #[arg(long, default_value = "capabilities.yaml")]
    pub capabilities: PathBuf,

    /// Configuration file (default capability).
    #[arg(long, default_value = "patchbay.yaml")]
    pub config: PathBuf,
}

/// Lock subcommands.
#[derive(Parser, Debug)]
pub struct LockCommand {
    /// Run whose locks to inspect.
    #[arg(long, global = true)]
    pub run_id: Option<String>,

    #[command(subcommand)]
    pub action: LockAction,
}

/// Available lock actions.
#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// List all active locks of the run.
    ///
    /// Shows each lock with its age and owner.
    List,

    /// Clear a specific lock.
    ///
    /// Requires --force flag to prevent accidental clearing.
    Clear(LockClearArgs),
}

/// Arguments for the `lock clear` command.
#[derive(Parser, Debug)]
pub struct LockClearArgs {
    /// Lock name, e.g. "merge".
    pub name: String,

    /// Force clearing the lock (required for safety).
    #[arg(long)]
    pub force: bool,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
