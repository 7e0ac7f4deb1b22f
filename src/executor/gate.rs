//! The test gate contract.
//!
//! A gate is an ordered list of command steps run inside a sandbox. A step
//! may be conditioned on the set of changed files; the gate passes when every
//! step that ran exited 0.

use super::process::run_command;
use crate::config::{GateStep, TestGateConfig};
use crate::error::{PatchbayError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pass,
    Fail,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    pub message: Option<String>,
}

impl StepResult {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pass,
            message: None,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Fail,
            message: Some(message.into()),
        }
    }

    pub fn skip(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Skip,
            message: Some(message.into()),
        }
    }
}

/// Per-step results of one gate run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateReport {
    pub steps: Vec<StepResult>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|s| s.status != StepStatus::Fail)
    }

    /// First failing step and its message, for outcome reasons.
    pub fn summary(&self) -> String {
        match self.steps.iter().find(|s| s.status == StepStatus::Fail) {
            Some(step) => format!(
                "step '{}' failed: {}",
                step.name,
                step.message.as_deref().unwrap_or("")
            ),
            None => "all steps passed".to_string(),
        }
    }
}

pub trait TestGate: Send + Sync {
    /// Run the gate in `sandbox`.
    ///
    /// A red gate is `Ok` with failing steps; `Err` means the gate itself
    /// could not run (spawn failure, timeout).
    fn run(&self, sandbox: &Path, changed_files: &[String]) -> Result<GateReport>;
}

/// Gate made of the configured command steps.
#[derive(Debug, Clone)]
pub struct CommandTestGate {
    config: TestGateConfig,
}

impl CommandTestGate {
    pub fn new(config: TestGateConfig) -> Self {
        Self { config }
    }
}

impl TestGate for CommandTestGate {
    fn run(&self, sandbox: &Path, changed_files: &[String]) -> Result<GateReport> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut report = GateReport::default();

        for step in &self.config.steps {
            if !should_run_step(step, changed_files) {
                report.steps.push(StepResult::skip(
                    &step.name,
                    "skipped (no matching changed files)",
                ));
                continue;
            }

            let output = run_command(&step.command, sandbox, &BTreeMap::new(), None, timeout)
                .map_err(|e| {
                    PatchbayError::ExecutionError(format!(
                        "test gate step '{}' could not run: {}",
                        step.name, e
                    ))
                })?;
            if output.timed_out {
                return Err(PatchbayError::ExecutionError(format!(
                    "test gate step '{}' timed out after {}s",
                    step.name, self.config.timeout_secs
                )));
            }

            let result = if output.success() {
                StepResult::pass(&step.name)
            } else {
                let code = output.exit_code.unwrap_or(-1);
                let mut msg = format!("exit code {} ({})", code, step.command);
                let tail = output.tail();
                if !tail.is_empty() {
                    msg.push('\n');
                    msg.push_str(&tail);
                }
                StepResult::fail(&step.name, msg)
            };
            tracing::debug!(step = %step.name, status = ?result.status, "gate step finished");
            report.steps.push(result);
        }

        Ok(report)
    }
}

/// Whether a step applies to the given changed files.
///
/// Unconditional steps always run. A conditional step runs when a changed
/// file matches one of its extensions or globs.
pub fn should_run_step(step: &GateStep, changed_files: &[String]) -> bool {
    let has_globs = !step.run_if_changed_globs.is_empty();
    let has_exts = !step.run_if_changed_extensions.is_empty();
    if !has_globs && !has_exts {
        return true;
    }
    if changed_files.is_empty() {
        return false;
    }

    if has_exts {
        let exts: Vec<String> = step
            .run_if_changed_extensions
            .iter()
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        let ext_match = changed_files.iter().any(|path| {
            file_extension(path).is_some_and(|ext| exts.iter().any(|e| *e == ext.to_lowercase()))
        });
        if ext_match {
            return true;
        }
    }

    if has_globs {
        match build_globset(&step.run_if_changed_globs) {
            Ok(globs) => return changed_files.iter().any(|path| globs.is_match(path)),
            Err(e) => {
                tracing::warn!(step = %step.name, error = %e, "invalid glob; running step");
                return true;
            }
        }
    }

    false
}

fn build_globset(patterns: &[String]) -> std::result::Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let normalized = pattern.trim().replace('\\', "/");
        if !normalized.is_empty() {
            builder.add(Glob::new(&normalized)?);
        }
    }
    builder.build()
}

fn file_extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    let ext = ext.trim();
    if ext.is_empty() { None } else { Some(ext) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn step(name: &str, command: &str) -> GateStep {
        GateStep {
            name: name.to_string(),
            command: command.to_string(),
            ..Default::default()
        }
    }

    fn changed(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_unconditional_step_always_runs() {
        assert!(should_run_step(&step("all", "true"), &[]));
    }

    #[test]
    fn test_extension_condition() {
        let s = GateStep {
            run_if_changed_extensions: vec![".py".to_string()],
            ..step("py", "pytest -q")
        };
        assert!(!should_run_step(&s, &[]));
        assert!(should_run_step(&s, &changed(&["src/app.PY"])));
        assert!(!should_run_step(&s, &changed(&["README.md"])));
        assert!(!should_run_step(&s, &changed(&["v1.2/Makefile"])));
    }

    #[test]
    fn test_glob_condition() {
        let s = GateStep {
            run_if_changed_globs: vec!["Cargo.toml".to_string(), "src/**/*.rs".to_string()],
            ..step("cargo", "cargo test")
        };
        assert!(should_run_step(&s, &changed(&["Cargo.toml"])));
        assert!(should_run_step(&s, &changed(&["src/a/b.rs"])));
        assert!(!should_run_step(&s, &changed(&["package.json"])));
    }

    #[test]
    fn test_report_summary_names_first_failure() {
        let report = GateReport {
            steps: vec![
                StepResult::pass("lint"),
                StepResult::fail("unit", "exit code 1"),
                StepResult::skip("e2e", "skipped"),
            ],
        };
        assert!(!report.passed());
        assert_eq!(report.summary(), "step 'unit' failed: exit code 1");
        assert!(GateReport::default().passed());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_gate_pass_fail_and_skip() {
        let temp = TempDir::new().unwrap();
        let gate = CommandTestGate::new(TestGateConfig {
            timeout_secs: 10,
            steps: vec![
                step("ok", "true"),
                GateStep {
                    run_if_changed_extensions: vec!["rs".to_string()],
                    ..step("rust", "false")
                },
                step("red", "sh -c \"echo boom; exit 1\""),
            ],
        });

        let report = gate.run(temp.path(), &changed(&["app.py"])).unwrap();

        let statuses: Vec<_> = report.steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Pass, StepStatus::Skip, StepStatus::Fail]
        );
        assert!(report.summary().contains("boom"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_gate_crash_is_error() {
        let temp = TempDir::new().unwrap();
        let gate = CommandTestGate::new(TestGateConfig {
            timeout_secs: 10,
            steps: vec![step("missing", "no-such-test-runner-xyz")],
        });
        let err = gate.run(temp.path(), &[]).unwrap_err();
        assert!(err.to_string().contains("could not run"));
    }
}
