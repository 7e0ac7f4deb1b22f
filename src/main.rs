//! Patchbay: dependency-ordered dispatch and merge coordination for
//! generated code changes.
//!
//! This is the main entry point for the `patchbay` CLI. It parses arguments,
//! installs the diagnostics subscriber, dispatches to the appropriate command
//! handler, and handles errors with proper exit codes.

mod admission;
mod batch;
mod capability;
mod changes;
mod cli;
mod commands;
pub mod config;
mod conflict;
pub mod context;
mod diff;
mod dispatch;
pub mod error;
pub mod events;
mod executor;
pub mod exit_codes;
pub mod fs;
mod graph;
pub mod locks;
mod merge;
mod plan;
mod sandbox;

#[cfg(test)]
mod test_support;

use cli::Cli;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

/// Environment variable holding a `tracing` filter directive.
const LOG_ENV: &str = "PATCHBAY_LOG";

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    match commands::dispatch(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

/// Diagnostics go to stderr; stdout carries command output only.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "patchbay=info",
        1 => "patchbay=debug",
        _ => "patchbay=trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| default.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}
