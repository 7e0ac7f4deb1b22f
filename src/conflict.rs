//! Optimistic conflict detection and one-shot rebase.
//!
//! Two change sets conflict when they touch a common path. A task whose
//! changes overlap the run's merged changes gets exactly one rebase: its
//! sandbox is rebuilt from the current canonical workspace, its recorded
//! tests and code diffs are reapplied in order, and the gate runs again.
//! Whatever happens then is final for this run.

use crate::changes::{self, ChangeSet};
use crate::context::RunContext;
use crate::error::{PatchbayError, Result};
use crate::events::{Event, EventLog, LogStream};
use crate::executor::{TaskOutcome, TestGate};
use crate::sandbox;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Whether two change sets touch a common path.
///
/// Symmetric, and false whenever either side is empty.
pub fn conflict(a: &ChangeSet, b: &ChangeSet) -> bool {
    let theirs = b.paths();
    a.paths().iter().any(|p| theirs.contains(p))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    RebaseFailed,
    MissingPatches,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::RebaseFailed => "rebase_failed",
            BlockReason::MissingPatches => "missing_patches",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No overlap with merged work.
    Clean,
    /// Rebased onto the current workspace; merge these changes instead.
    Rebased(ChangeSet),
    Blocked {
        reason: BlockReason,
        /// Paths shared with merged work.
        paths: Vec<String>,
        detail: Option<String>,
    },
}

pub struct ConflictResolver<'a> {
    ctx: &'a RunContext,
    ignore_dirs: &'a [String],
    gate: &'a dyn TestGate,
    log: EventLog,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(ctx: &'a RunContext, ignore_dirs: &'a [String], gate: &'a dyn TestGate) -> Self {
        Self {
            ctx,
            ignore_dirs,
            gate,
            log: ctx.event_log(),
        }
    }

    /// Decide how a ready-to-merge outcome can be merged.
    pub fn resolve(&self, outcome: &TaskOutcome, merged: &ChangeSet) -> Resolution {
        if !conflict(&outcome.changes, merged) {
            return Resolution::Clean;
        }
        let id = outcome.task_id.as_str();
        let paths = outcome.changes.overlap(merged);
        tracing::info!(task = id, paths = ?paths, "changes overlap merged work");

        let tests_diff = self.ctx.tests_diff_path(id);
        let code_diff = self.ctx.code_diff_path(id);
        if !tests_diff.is_file() || !code_diff.is_file() {
            return self.block(outcome, BlockReason::MissingPatches, paths, None);
        }

        match self.rebase(id, &tests_diff, &code_diff) {
            Ok(changes) => {
                self.log.record(
                    LogStream::Conflicts,
                    &Event::named("rebase_attempt")
                        .with_task(id)
                        .with_field("result", "ok")
                        .with_field("paths", paths),
                );
                tracing::info!(task = id, "rebase succeeded");
                Resolution::Rebased(changes)
            }
            Err(e) => {
                self.log.record(
                    LogStream::Conflicts,
                    &Event::named("rebase_attempt")
                        .with_task(id)
                        .with_field("result", "fail")
                        .with_field("paths", paths.clone())
                        .with_field("error", e.to_string()),
                );
                self.block(outcome, BlockReason::RebaseFailed, paths, Some(e.to_string()))
            }
        }
    }

    /// Check a deferred merge against the work merged since it was resolved.
    ///
    /// New overlap gets the rebase the task has not had yet. A task that was
    /// already rebased is blocked: the one attempt is spent.
    pub fn recheck(
        &self,
        outcome: &TaskOutcome,
        changes: &ChangeSet,
        rebased: bool,
        merged: &ChangeSet,
        newer: &ChangeSet,
    ) -> Resolution {
        if !conflict(changes, newer) {
            return Resolution::Clean;
        }
        if !rebased {
            return self.resolve(outcome, merged);
        }
        let paths = changes.overlap(newer);
        self.block(
            outcome,
            BlockReason::RebaseFailed,
            paths,
            Some("overlaps work merged while the merge was deferred".to_string()),
        )
    }

    fn block(
        &self,
        outcome: &TaskOutcome,
        reason: BlockReason,
        paths: Vec<String>,
        detail: Option<String>,
    ) -> Resolution {
        tracing::warn!(task = %outcome.task_id, reason = reason.as_str(), "merge blocked by overlap");
        self.log.record(
            LogStream::Conflicts,
            &Event::named("merge_blocked_overlap")
                .with_task(&outcome.task_id)
                .with_field(
                    "changes",
                    serde_json::to_value(&outcome.changes).unwrap_or(Value::Null),
                )
                .with_field("paths", paths.clone())
                .with_field("reason", reason.as_str()),
        );
        Resolution::Blocked {
            reason,
            paths,
            detail,
        }
    }

    /// Rebuild the sandbox from the canonical workspace and replay both diffs.
    ///
    /// Returns the change set against the rebased baseline.
    fn rebase(&self, task_id: &str, tests_diff: &Path, code_diff: &Path) -> Result<ChangeSet> {
        let tests = read_diff(tests_diff)?;
        let code = read_diff(code_diff)?;

        let sandbox = sandbox::create(
            &self.ctx.workspace_root,
            &self.ctx.sandboxes_dir,
            task_id,
            self.ignore_dirs,
        )?;
        let before = changes::inventory(&sandbox, self.ignore_dirs)?;

        let mut touched = sandbox::apply(&sandbox, &tests)?;
        touched.extend(sandbox::apply(&sandbox, &code)?);
        touched.sort();
        touched.dedup();

        let report = self.gate.run(&sandbox, &touched)?;
        if !report.passed() {
            return Err(PatchbayError::ExecutionError(format!(
                "test gate red after rebase: {}",
                report.summary()
            )));
        }

        let after = changes::inventory(&sandbox, self.ignore_dirs)?;
        let changes = changes::diff(&before, &after);
        changes.save(&self.ctx.changes_path(task_id))?;
        Ok(changes)
    }
}

fn read_diff(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        PatchbayError::UserError(format!(
            "failed to read diff artifact '{}': {}",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use crate::executor::{GateReport, Job, StepResult};
    use crate::plan::{Task, TaskStatus};
    use tempfile::TempDir;

    fn set(created: &[&str], deleted: &[&str], modified: &[&str]) -> ChangeSet {
        let s = |v: &[&str]| v.iter().map(|p| p.to_string()).collect();
        ChangeSet {
            created: s(created),
            deleted: s(deleted),
            modified: s(modified),
        }
    }

    struct Gate(bool);

    impl TestGate for Gate {
        fn run(&self, _sandbox: &Path, _changed: &[String]) -> Result<GateReport> {
            let step = if self.0 {
                StepResult::pass("tests")
            } else {
                StepResult::fail("tests", "exit code 1")
            };
            Ok(GateReport { steps: vec![step] })
        }
    }

    struct Fixture {
        _temp: TempDir,
        ctx: RunContext,
        ignore: Vec<String>,
    }

    /// Canonical `x.py` already holds another task's merged edit.
    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("x.py"), "a = 1\nb = 20\n").unwrap();
        let ctx = RunContext::new(temp.path(), "runs", "r1").unwrap();
        ctx.ensure_dirs().unwrap();
        Fixture {
            _temp: temp,
            ctx,
            ignore: vec!["runs".to_string()],
        }
    }

    fn outcome(fx: &Fixture, changes: ChangeSet) -> TaskOutcome {
        let job = Job::new(Task::new("T2"), Capability::new("core"));
        let mut outcome =
            TaskOutcome::failed(&job, fx.ctx.sandbox_path("T2"), None, "placeholder");
        outcome.status = TaskStatus::ReadyToMerge;
        outcome.reason = None;
        outcome.changes = changes;
        outcome
    }

    #[test]
    fn test_conflict_is_symmetric() {
        let a = set(&["x"], &[], &["shared"]);
        let b = set(&[], &["shared"], &[]);
        let c = set(&["y"], &[], &[]);

        assert!(conflict(&a, &b));
        assert!(conflict(&b, &a));
        assert!(!conflict(&a, &c));
        assert!(!conflict(&c, &a));
    }

    #[test]
    fn test_conflict_with_empty_is_false() {
        let a = set(&["x"], &[], &[]);
        let empty = ChangeSet::default();
        assert!(!conflict(&a, &empty));
        assert!(!conflict(&empty, &a));
        assert!(!conflict(&empty, &empty));
    }

    #[test]
    fn test_disjoint_changes_are_clean() {
        let fx = fixture();
        let gate = Gate(true);
        let resolver = ConflictResolver::new(&fx.ctx, &fx.ignore, &gate);

        let resolution = resolver.resolve(
            &outcome(&fx, set(&[], &[], &["y.py"])),
            &set(&[], &[], &["x.py"]),
        );

        assert_eq!(resolution, Resolution::Clean);
        assert!(fx.ctx.event_log().read(LogStream::Conflicts).unwrap().is_empty());
    }

    #[test]
    fn test_missing_patches_block() {
        let fx = fixture();
        let gate = Gate(true);
        let resolver = ConflictResolver::new(&fx.ctx, &fx.ignore, &gate);

        let resolution = resolver.resolve(
            &outcome(&fx, set(&[], &[], &["x.py"])),
            &set(&[], &[], &["x.py"]),
        );

        assert_eq!(
            resolution,
            Resolution::Blocked {
                reason: BlockReason::MissingPatches,
                paths: vec!["x.py".to_string()],
                detail: None,
            }
        );
        let events = fx.ctx.event_log().read(LogStream::Conflicts).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("merge_blocked_overlap"));
        assert_eq!(events[0].fields["reason"], "missing_patches");
        assert_eq!(events[0].fields["changes"]["modified"][0], "x.py");
    }

    #[test]
    fn test_rebase_replays_diffs_on_current_workspace() {
        let fx = fixture();
        // Written against the old baseline `a = 1\nb = 2\n`; line 1 still matches.
        fs::write(fx.ctx.tests_diff_path("T2"), "").unwrap();
        fs::write(
            fx.ctx.code_diff_path("T2"),
            "--- a/x.py\n+++ b/x.py\n@@ -1 +1 @@\n-a = 1\n+a = 10\n",
        )
        .unwrap();
        let gate = Gate(true);
        let resolver = ConflictResolver::new(&fx.ctx, &fx.ignore, &gate);

        let resolution = resolver.resolve(
            &outcome(&fx, set(&[], &[], &["x.py"])),
            &set(&[], &[], &["x.py"]),
        );

        assert_eq!(resolution, Resolution::Rebased(set(&[], &[], &["x.py"])));
        let sandbox = fx.ctx.sandbox_path("T2");
        assert_eq!(
            fs::read_to_string(sandbox.join("x.py")).unwrap(),
            "a = 10\nb = 20\n"
        );
        let events = fx.ctx.event_log().read(LogStream::Conflicts).unwrap();
        assert_eq!(events[0].event.as_deref(), Some("rebase_attempt"));
        assert_eq!(events[0].fields["result"], "ok");
    }

    #[test]
    fn test_rebase_that_no_longer_applies_blocks() {
        let fx = fixture();
        fs::write(fx.ctx.tests_diff_path("T2"), "").unwrap();
        fs::write(
            fx.ctx.code_diff_path("T2"),
            "--- a/x.py\n+++ b/x.py\n@@ -2 +2 @@\n-b = 2\n+b = 3\n",
        )
        .unwrap();
        let gate = Gate(true);
        let resolver = ConflictResolver::new(&fx.ctx, &fx.ignore, &gate);

        let resolution = resolver.resolve(
            &outcome(&fx, set(&[], &[], &["x.py"])),
            &set(&[], &[], &["x.py"]),
        );

        let Resolution::Blocked { reason, detail, .. } = resolution else {
            panic!("expected blocked, got {:?}", resolution);
        };
        assert_eq!(reason, BlockReason::RebaseFailed);
        assert!(detail.unwrap().contains("does not apply"));

        let events = fx.ctx.event_log().read(LogStream::Conflicts).unwrap();
        let kinds: Vec<_> = events.iter().filter_map(|e| e.event.clone()).collect();
        assert_eq!(kinds, vec!["rebase_attempt", "merge_blocked_overlap"]);
        assert_eq!(events[0].fields["result"], "fail");
        assert_eq!(events[1].fields["reason"], "rebase_failed");
    }

    #[test]
    fn test_recheck_without_new_overlap_is_clean() {
        let fx = fixture();
        let gate = Gate(true);
        let resolver = ConflictResolver::new(&fx.ctx, &fx.ignore, &gate);
        let changes = set(&[], &[], &["x.py"]);

        let resolution = resolver.recheck(
            &outcome(&fx, changes.clone()),
            &changes,
            true,
            &set(&[], &[], &["x.py"]),
            &set(&["other.py"], &[], &[]),
        );

        assert_eq!(resolution, Resolution::Clean);
        assert!(fx.ctx.event_log().read(LogStream::Conflicts).unwrap().is_empty());
    }

    #[test]
    fn test_recheck_after_rebase_blocks_on_new_overlap() {
        let fx = fixture();
        let gate = Gate(true);
        let resolver = ConflictResolver::new(&fx.ctx, &fx.ignore, &gate);
        let changes = set(&[], &[], &["x.py"]);

        let resolution = resolver.recheck(
            &outcome(&fx, changes.clone()),
            &changes,
            true,
            &set(&[], &[], &["x.py"]),
            &set(&[], &[], &["x.py"]),
        );

        let Resolution::Blocked { reason, paths, .. } = resolution else {
            panic!("expected blocked, got {:?}", resolution);
        };
        assert_eq!(reason, BlockReason::RebaseFailed);
        assert_eq!(paths, vec!["x.py"]);
        // No second rebase.
        let events = fx.ctx.event_log().read(LogStream::Conflicts).unwrap();
        let kinds: Vec<_> = events.iter().filter_map(|e| e.event.clone()).collect();
        assert_eq!(kinds, vec!["merge_blocked_overlap"]);
    }

    #[test]
    fn test_recheck_rebases_a_task_that_was_clean() {
        let fx = fixture();
        fs::write(fx.ctx.tests_diff_path("T2"), "").unwrap();
        fs::write(
            fx.ctx.code_diff_path("T2"),
            "--- a/x.py\n+++ b/x.py\n@@ -1 +1 @@\n-a = 1\n+a = 10\n",
        )
        .unwrap();
        let gate = Gate(true);
        let resolver = ConflictResolver::new(&fx.ctx, &fx.ignore, &gate);
        let changes = set(&[], &[], &["x.py"]);

        let resolution = resolver.recheck(
            &outcome(&fx, changes.clone()),
            &changes,
            false,
            &set(&[], &[], &["x.py"]),
            &set(&[], &[], &["x.py"]),
        );

        assert_eq!(resolution, Resolution::Rebased(set(&[], &[], &["x.py"])));
    }

    #[test]
    fn test_red_gate_after_rebase_blocks() {
        let fx = fixture();
        fs::write(fx.ctx.tests_diff_path("T2"), "").unwrap();
        fs::write(fx.ctx.code_diff_path("T2"), "").unwrap();
        let gate = Gate(false);
        let resolver = ConflictResolver::new(&fx.ctx, &fx.ignore, &gate);

        let resolution = resolver.resolve(
            &outcome(&fx, set(&["x.py"], &[], &[])),
            &set(&[], &[], &["x.py"]),
        );

        assert!(matches!(
            resolution,
            Resolution::Blocked {
                reason: BlockReason::RebaseFailed,
                ..
            }
        ));
    }
}
