//! Command implementations for patchbay.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every handler returns the process exit code on success.

mod lock;
mod order;
mod route;
mod run;

use crate::cli::{Cli, Command, LockAction};
use crate::config::Config;
use crate::context::{current_dir, resolve_in};
use crate::error::{PatchbayError, Result};
use std::path::{Path, PathBuf};

/// Dispatch a command to its implementation.
pub fn dispatch(cli: Cli) -> Result<i32> {
    let workspace = workspace_root(cli.workspace.as_deref())?;
    match cli.command {
        Command::Run(args) => run::cmd_run(&workspace, args),
        Command::Order(args) => order::cmd_order(&workspace, args),
        Command::Route(args) => route::cmd_route(&workspace, args),
        Command::Lock(lock_cmd) => match lock_cmd.action {
            LockAction::List => lock::cmd_lock_list(&workspace, lock_cmd.run_id.as_deref()),
            LockAction::Clear(args) => {
                lock::cmd_lock_clear(&workspace, lock_cmd.run_id.as_deref(), args)
            }
        },
    }
}

/// The workspace directory, canonicalized.
fn workspace_root(explicit: Option<&Path>) -> Result<PathBuf> {
    let dir = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => current_dir()?,
    };
    dir.canonicalize().map_err(|e| {
        PatchbayError::UserError(format!(
            "failed to resolve workspace '{}': {}",
            dir.display(),
            e
        ))
    })
}

/// Config from `path` (relative to the workspace), defaults when absent.
fn load_config(workspace: &Path, path: &Path) -> Result<Config> {
    Config::load_or_default(resolve_in(workspace, path))
}
