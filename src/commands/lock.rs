//! Implementation of the `patchbay lock` commands.

use crate::cli::LockClearArgs;
use crate::config::Config;
use crate::context::{CONFIG_FILE, RunContext};
use crate::error::{PatchbayError, Result};
use crate::exit_codes;
use crate::locks::{self, LockInfo};
use std::fs;
use std::path::Path;

/// Locks of one run, or of every run under the run root.
pub fn collect_locks(
    workspace: &Path,
    config: &Config,
    run_id: Option<&str>,
) -> Result<Vec<(String, LockInfo)>> {
    let runs = match run_id {
        Some(id) => vec![id.to_string()],
        None => run_ids(&workspace.join(&config.run_root))?,
    };

    let mut found = Vec::new();
    for id in runs {
        let ctx = RunContext::new(workspace, &config.run_root, &id)?;
        for info in locks::list_locks(&ctx.locks_dir, config.lock_stale_minutes)? {
            found.push((id.clone(), info));
        }
    }
    Ok(found)
}

fn run_ids(run_root: &Path) -> Result<Vec<String>> {
    if !run_root.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(run_root).map_err(|e| {
        PatchbayError::UserError(format!(
            "failed to read run root '{}': {}",
            run_root.display(),
            e
        ))
    })?;

    let mut ids: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().join("locks").is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    ids.sort();
    Ok(ids)
}

pub fn cmd_lock_list(workspace: &Path, run_id: Option<&str>) -> Result<i32> {
    let config = Config::load_or_default(workspace.join(CONFIG_FILE))?;
    let locks = collect_locks(workspace, &config, run_id)?;

    if locks.is_empty() {
        println!("No active locks.");
        return Ok(exit_codes::SUCCESS);
    }

    println!("Active locks ({}):", locks.len());
    println!();

    for (run, lock) in &locks {
        println!("  {} (run {}):", lock.name, run);
        println!("    Owner:      {}", lock.metadata.owner);
        if let Some(pid) = lock.metadata.pid {
            println!("    PID:        {}", pid);
        }
        println!(
            "    Created:    {}",
            lock.metadata.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("    Age:        {}", lock.metadata.age());
        println!("    Action:     {}", lock.metadata.action);
        if lock.is_stale {
            println!(
                "    Status:     STALE (exceeds {} min threshold)",
                config.lock_stale_minutes
            );
        }
        println!("    Path:       {}", lock.path.display());
        println!();
    }

    let stale_count = locks.iter().filter(|(_, l)| l.is_stale).count();
    if stale_count > 0 {
        println!(
            "Note: {} lock(s) are stale. Use `patchbay lock clear <name> --run-id <run> --force` to clear.",
            stale_count
        );
    }

    Ok(exit_codes::SUCCESS)
}

pub fn cmd_lock_clear(
    workspace: &Path,
    run_id: Option<&str>,
    args: LockClearArgs,
) -> Result<i32> {
    let cleared = clear(workspace, run_id, &args.name, args.force)?;

    println!("Cleared lock: {}", cleared.name);
    println!();
    println!("Lock details:");
    println!("  Owner:      {}", cleared.metadata.owner);
    if let Some(pid) = cleared.metadata.pid {
        println!("  PID:        {}", pid);
    }
    println!(
        "  Created:    {}",
        cleared.metadata.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  Age:        {}", cleared.metadata.age());
    println!("  Action:     {}", cleared.metadata.action);
    if cleared.is_stale {
        println!("  Status:     was STALE");
    }
    println!("  Path:       {}", cleared.path.display());

    Ok(exit_codes::SUCCESS)
}

fn clear(workspace: &Path, run_id: Option<&str>, name: &str, force: bool) -> Result<LockInfo> {
    if !force {
        return Err(PatchbayError::UserError(format!(
            "refusing to clear lock without --force flag.\n\n\
             Clearing locks can cause data corruption if the lock holder is still active.\n\
             Only clear locks if you are certain the lock holder has crashed.\n\n\
             To clear the lock, run:\n  patchbay lock clear {} --run-id <run> --force",
            name
        )));
    }
    let run_id = run_id.ok_or_else(|| {
        PatchbayError::UserError("--run-id is required to clear a lock".to_string())
    })?;

    let config = Config::load_or_default(workspace.join(CONFIG_FILE))?;
    let ctx = RunContext::new(workspace, &config.run_root, run_id)?;
    let cleared = locks::clear_lock(&ctx.locks_dir, name, config.lock_stale_minutes)?;
    tracing::info!(
        lock = %cleared.name,
        run_id,
        owner = %cleared.metadata.owner,
        was_stale = cleared.is_stale,
        "lock cleared"
    );
    Ok(cleared)
}
