//! The per-attempt protocol run by workers.

use super::gate::TestGate;
use super::generator::{BlockedReport, CommandGenerator, Generation, GenerationRequest, Generator};
use super::retrieval::{ContextSource, NoContext, Snippet};
use super::{CommandTestGate, Stage};
use crate::capability::Capability;
use crate::changes::{self, ChangeSet, Inventory};
use crate::config::{Config, TestsStageGate};
use crate::context::RunContext;
use crate::error::{PatchbayError, Result};
use crate::fs::atomic_write_file;
use crate::plan::{Task, TaskStatus};
use crate::sandbox::{self, guarded};
use std::path::{Path, PathBuf};

/// One attempt of one task, as sent to a worker.
#[derive(Debug, Clone)]
pub struct Job {
    pub task: Task,
    pub capability: Capability,
    /// 1 for the first attempt.
    pub attempt: u32,
    /// Reason the previous attempt failed, passed on to the generator.
    pub previous_failure: Option<String>,
}

impl Job {
    pub fn new(task: Task, capability: Capability) -> Self {
        Self {
            task,
            capability,
            attempt: 1,
            previous_failure: None,
        }
    }

    /// The next attempt after a failure.
    pub fn retry(&self, failure: impl Into<String>) -> Self {
        Self {
            attempt: self.attempt + 1,
            previous_failure: Some(failure.into()),
            ..self.clone()
        }
    }
}

/// Result of one attempt.
///
/// `status` is one of `ready_to_merge`, `failed`, `blocked` or `skipped`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub task_id: String,
    pub capability: String,
    pub attempt: u32,
    pub status: TaskStatus,
    pub stage: Option<Stage>,
    pub reason: Option<String>,
    pub sandbox: PathBuf,
    /// Empty unless ready to merge.
    pub changes: ChangeSet,
    pub blocked: Option<BlockedReport>,
}

impl TaskOutcome {
    fn new(job: &Job, sandbox: PathBuf, status: TaskStatus) -> Self {
        Self {
            task_id: job.task.id.clone(),
            capability: job.capability.name.clone(),
            attempt: job.attempt,
            status,
            stage: None,
            reason: None,
            sandbox,
            changes: ChangeSet::default(),
            blocked: None,
        }
    }

    pub fn failed(
        job: &Job,
        sandbox: PathBuf,
        stage: Option<Stage>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            reason: Some(reason.into()),
            ..Self::new(job, sandbox, TaskStatus::Failed)
        }
    }

    fn skipped(job: &Job, sandbox: PathBuf, reason: &str) -> Self {
        Self {
            reason: Some(reason.to_string()),
            ..Self::new(job, sandbox, TaskStatus::Skipped)
        }
    }

    fn blocked(job: &Job, sandbox: PathBuf, stage: Stage, report: BlockedReport) -> Self {
        Self {
            stage: Some(stage),
            reason: Some(report.reason.clone()),
            blocked: Some(report),
            ..Self::new(job, sandbox, TaskStatus::Blocked)
        }
    }

    fn ready(job: &Job, sandbox: PathBuf, changes: ChangeSet) -> Self {
        Self {
            changes,
            ..Self::new(job, sandbox, TaskStatus::ReadyToMerge)
        }
    }
}

/// Runs attempts. Shared by every worker of a run.
pub struct Executor {
    ctx: RunContext,
    ignore_dirs: Vec<String>,
    tests_stage_gate: TestsStageGate,
    generator: Option<Box<dyn Generator>>,
    gate: Box<dyn TestGate>,
    context: Box<dyn ContextSource>,
}

impl Executor {
    /// Executor using the configured generator and gate commands.
    pub fn new(ctx: RunContext, config: &Config) -> Self {
        Self {
            ctx,
            ignore_dirs: config.sandbox_ignores(),
            tests_stage_gate: config.tests_stage_gate,
            generator: config
                .generator
                .clone()
                .map(|g| Box::new(CommandGenerator::new(g)) as Box<dyn Generator>),
            gate: Box::new(CommandTestGate::new(config.test_gate.clone())),
            context: Box::new(NoContext),
        }
    }

    pub fn with_generator(mut self, generator: impl Generator + 'static) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    pub fn with_gate(mut self, gate: impl TestGate + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    pub fn with_context(mut self, context: impl ContextSource + 'static) -> Self {
        self.context = Box::new(context);
        self
    }

    pub fn gate(&self) -> &dyn TestGate {
        self.gate.as_ref()
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn ignore_dirs(&self) -> &[String] {
        &self.ignore_dirs
    }

    /// Run one attempt to an outcome. Never fails.
    pub fn run(&self, job: &Job) -> TaskOutcome {
        let sandbox = self.ctx.sandbox_path(&job.task.id);
        let Some(generator) = self.generator.as_deref() else {
            tracing::info!(task = %job.task.id, "no generator configured; skipping");
            return TaskOutcome::skipped(job, sandbox, "no generator configured");
        };

        let outcome = match self.prepare(job) {
            Ok((sandbox, before)) => self.execute(generator, job, sandbox, &before),
            Err(e) => TaskOutcome::failed(job, sandbox, Some(Stage::Setup), e.to_string()),
        };
        tracing::info!(
            task = %outcome.task_id,
            attempt = outcome.attempt,
            status = %outcome.status,
            stage = ?outcome.stage,
            "attempt finished"
        );
        outcome
    }

    fn prepare(&self, job: &Job) -> Result<(PathBuf, Inventory)> {
        let sandbox = sandbox::create(
            &self.ctx.workspace_root,
            &self.ctx.sandboxes_dir,
            &job.task.id,
            &self.ignore_dirs,
        )?;
        let before = changes::inventory(&sandbox, &self.ignore_dirs)?;
        Ok((sandbox, before))
    }

    fn execute(
        &self,
        generator: &dyn Generator,
        job: &Job,
        sandbox: PathBuf,
        before: &Inventory,
    ) -> TaskOutcome {
        let id = job.task.id.as_str();
        let snippets = self.context.snippets(&job.task);
        let mut changed = Vec::new();

        let tests_diff = match self.generate(generator, job, Stage::Tests, &sandbox, &snippets) {
            Ok(Generation::Diff(diff)) => diff,
            Ok(Generation::NoChange) => String::new(),
            Ok(Generation::Blocked(report)) => {
                return TaskOutcome::blocked(job, sandbox, Stage::Tests, report);
            }
            Err(e) => return TaskOutcome::failed(job, sandbox, Some(Stage::Tests), e.to_string()),
        };
        let enforce = self.tests_stage_gate == TestsStageGate::Enforce;
        if let Err(e) = self.apply_and_gate(&sandbox, Stage::Tests, &tests_diff, enforce, &mut changed)
        {
            return TaskOutcome::failed(job, sandbox, Some(Stage::Tests), e.to_string());
        }

        let code_diff = match self.generate(generator, job, Stage::Code, &sandbox, &snippets) {
            Ok(Generation::Diff(diff)) => diff,
            Ok(Generation::NoChange) => String::new(),
            Ok(Generation::Blocked(report)) => {
                return TaskOutcome::blocked(job, sandbox, Stage::Code, report);
            }
            Err(e) => return TaskOutcome::failed(job, sandbox, Some(Stage::Code), e.to_string()),
        };
        if let Err(e) = self.write_diffs(id, &tests_diff, &code_diff) {
            return TaskOutcome::failed(job, sandbox, Some(Stage::Code), e.to_string());
        }
        if let Err(e) = self.apply_and_gate(&sandbox, Stage::Code, &code_diff, true, &mut changed) {
            return TaskOutcome::failed(job, sandbox, Some(Stage::Code), e.to_string());
        }

        match self.record_changes(id, &sandbox, before) {
            Ok(changes) => TaskOutcome::ready(job, sandbox, changes),
            Err(e) => TaskOutcome::failed(job, sandbox, Some(Stage::Code), e.to_string()),
        }
    }

    fn generate(
        &self,
        generator: &dyn Generator,
        job: &Job,
        stage: Stage,
        sandbox: &Path,
        snippets: &[Snippet],
    ) -> Result<Generation> {
        let request = GenerationRequest {
            task: &job.task,
            stage,
            attempt: job.attempt,
            previous_failure: job.previous_failure.as_deref(),
            vault_context: snippets,
            capability: &job.capability,
            sandbox,
        };
        generator.generate(&request)
    }

    /// Apply `diff` and run the gate under a snapshot.
    ///
    /// On error the sandbox is back at its state before the call. `changed`
    /// accumulates the paths touched so far, for conditional gate steps.
    fn apply_and_gate(
        &self,
        sandbox: &Path,
        stage: Stage,
        diff: &str,
        require_green: bool,
        changed: &mut Vec<String>,
    ) -> Result<()> {
        let all = guarded(sandbox, || {
            let mut all = changed.clone();
            all.extend(sandbox::apply(sandbox, diff)?);
            all.sort();
            all.dedup();

            let report = self.gate.run(sandbox, &all)?;
            if !report.passed() {
                if require_green {
                    return Err(PatchbayError::ExecutionError(format!(
                        "test gate red after {} diff: {}",
                        stage,
                        report.summary()
                    )));
                }
                tracing::debug!(stage = %stage, summary = %report.summary(), "gate red (observed)");
            }
            Ok(all)
        })?;
        *changed = all;
        Ok(())
    }

    fn write_diffs(&self, task_id: &str, tests_diff: &str, code_diff: &str) -> Result<()> {
        atomic_write_file(self.ctx.tests_diff_path(task_id), tests_diff)?;
        atomic_write_file(self.ctx.code_diff_path(task_id), code_diff)
    }

    fn record_changes(&self, task_id: &str, sandbox: &Path, before: &Inventory) -> Result<ChangeSet> {
        let after = changes::inventory(sandbox, &self.ignore_dirs)?;
        let changes = changes::diff(before, &after);
        changes.save(&self.ctx.changes_path(task_id))?;
        Ok(changes)
    }
}
