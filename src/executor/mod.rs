//! Executing one task attempt inside its sandbox.
//!
//! The worker side of a run. An attempt goes through two stages, each of
//! which asks the generator for a diff, applies it under a snapshot, and runs
//! the test gate:
//!
//! 1. `tests`: the diff adding tests. How a red gate is treated here depends
//!    on `tests_stage_gate`.
//! 2. `code`: the diff making the tests pass. A red gate fails the attempt.
//!
//! Any failure rolls the sandbox back to the state before that stage and is
//! reported as a [`TaskOutcome`]; nothing in here aborts the run.

mod attempt;
pub mod gate;
pub mod generator;
mod process;
pub mod retrieval;
mod template;


pub use attempt::{Executor, Job, TaskOutcome};
pub use gate::{CommandTestGate, GateReport, StepResult, StepStatus, TestGate};
pub use generator::{BlockedReport, CommandGenerator, Generation, GenerationRequest, Generator};
pub use retrieval::{ContextSource, NoContext, Snippet};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where in an attempt an outcome was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Sandbox creation and inventory, before any generation.
    Setup,
    Tests,
    Code,
    /// Conflict resolution after the attempt reported ready to merge.
    Rebase,
    Merge,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Tests => "tests",
            Stage::Code => "code",
            Stage::Rebase => "rebase",
            Stage::Merge => "merge",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
