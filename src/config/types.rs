//! Configuration types and defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the test gate result after the tests diff is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TestsStageGate {
    /// Run the gate but accept a red result; new tests are expected to fail
    /// until the code diff lands. Patch errors and gate crashes still fail.
    #[default]
    Observe,
    /// A red gate fails the tests stage.
    Enforce,
}

/// External generator invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Command template; see `executor::generator` for placeholders.
    pub command: String,

    /// Seconds before the generator process is killed.
    #[serde(default = "default_command_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra environment for the generator process.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

/// Test gate: ordered command steps, all of which must pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestGateConfig {
    /// Seconds before a single step is killed.
    #[serde(default = "default_command_timeout_secs")]
    pub timeout_secs: u64,

    /// Ordered steps.
    pub steps: Vec<GateStep>,
}

impl Default for TestGateConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_command_timeout_secs(),
            steps: vec![GateStep {
                name: "tests".to_string(),
                command: default_test_command(),
                ..Default::default()
            }],
        }
    }
}

/// A single command step of the test gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GateStep {
    /// Display name for the step (e.g., "unit", "lint").
    pub name: String,

    /// Command to execute (shell-words parsed; no shell).
    pub command: String,

    /// Only run this step if any changed file matches one of these globs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_if_changed_globs: Vec<String>,

    /// Only run this step if any changed file has one of these extensions (no leading dots).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_if_changed_extensions: Vec<String>,
}

/// Touch hints implied by a task's owner role.
pub fn default_owner_touch_hints() -> BTreeMap<String, Vec<String>> {
    let mut hints = BTreeMap::new();
    hints.insert("docs".to_string(), vec!["docs/".to_string()]);
    hints.insert("qa".to_string(), vec!["tests/".to_string()]);
    hints.insert(
        "scaffolder".to_string(),
        vec![
            "orchestrator/".to_string(),
            "ci/".to_string(),
            "Dockerfile".to_string(),
            "Makefile".to_string(),
        ],
    );
    hints
}

pub fn default_ignore_dirs() -> Vec<String> {
    vec![
        ".git".to_string(),
        ".venv".to_string(),
        "__pycache__".to_string(),
        "runs".to_string(),
    ]
}

pub(crate) fn default_run_root() -> String {
    "runs".to_string()
}
pub(crate) fn default_max_workers() -> usize {
    2
}
pub(crate) fn default_merge_lock_timeout_secs() -> u64 {
    60
}
pub(crate) fn default_merge_lock_poll_ms() -> u64 {
    200
}
pub(crate) fn default_lock_stale_minutes() -> u32 {
    120
}
pub(crate) fn default_capability() -> String {
    "core_orchestrator".to_string()
}
pub(crate) fn default_command_timeout_secs() -> u64 {
    600
}
pub(crate) fn default_test_command() -> String {
    "cargo test".to_string()
}
