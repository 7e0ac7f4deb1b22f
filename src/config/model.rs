//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::time::Duration;

/// Configuration for a patchbay run.
///
/// This struct represents the contents of `patchbay.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Layout
    // =========================================================================
    /// Directory (relative to the workspace) holding per-run state.
    #[serde(default = "default_run_root")]
    pub run_root: String,

    /// Directory names never copied into sandboxes or inventoried.
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,

    // =========================================================================
    // Dispatch
    // =========================================================================
    /// Size of the worker pool executing task attempts.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Capability used when no catalogue tag matches a task.
    #[serde(default = "default_capability")]
    pub default_capability: String,

    /// Touch hints added to tasks by owner role.
    #[serde(default = "default_owner_touch_hints")]
    pub owner_touch_hints: BTreeMap<String, Vec<String>>,

    // =========================================================================
    // Merge lock
    // =========================================================================
    /// Seconds to wait for the merge lock before giving up on a merge.
    #[serde(default = "default_merge_lock_timeout_secs")]
    pub merge_lock_timeout_secs: u64,

    /// Delay between merge lock acquisition attempts.
    #[serde(default = "default_merge_lock_poll_ms")]
    pub merge_lock_poll_ms: u64,

    /// Minutes after which a lock is reported as stale.
    #[serde(default = "default_lock_stale_minutes")]
    pub lock_stale_minutes: u32,

    // =========================================================================
    // Execution
    // =========================================================================
    /// External generator; when absent every task is skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<GeneratorConfig>,

    /// Test gate steps.
    #[serde(default)]
    pub test_gate: TestGateConfig,

    /// Interpretation of the gate after the tests diff.
    #[serde(default)]
    pub tests_stage_gate: TestsStageGate,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_root: default_run_root(),
            ignore_dirs: default_ignore_dirs(),
            max_workers: default_max_workers(),
            default_capability: default_capability(),
            owner_touch_hints: default_owner_touch_hints(),
            merge_lock_timeout_secs: default_merge_lock_timeout_secs(),
            merge_lock_poll_ms: default_merge_lock_poll_ms(),
            lock_stale_minutes: default_lock_stale_minutes(),
            generator: None,
            test_gate: TestGateConfig::default(),
            tests_stage_gate: TestsStageGate::default(),
        }
    }
}

impl Config {
    /// Merge lock timeout as a `Duration`.
    pub fn merge_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.merge_lock_timeout_secs)
    }

    /// Merge lock poll interval as a `Duration`.
    pub fn merge_lock_poll(&self) -> Duration {
        Duration::from_millis(self.merge_lock_poll_ms)
    }

    /// `ignore_dirs` plus the top directory of a relative `run_root`.
    ///
    /// Sandboxes, snapshots and inventories skip these, so run state never
    /// ends up inside a sandbox whatever `ignore_dirs` says.
    pub fn sandbox_ignores(&self) -> Vec<String> {
        let mut dirs = self.ignore_dirs.clone();
        if let Some(Component::Normal(top)) = Path::new(&self.run_root).components().next() {
            let top = top.to_string_lossy().into_owned();
            if !dirs.contains(&top) {
                dirs.push(top);
            }
        }
        dirs
    }
}
