//! The coordinating loop of a run.
//!
//! The dispatcher owns every piece of scheduling state: the plan, the
//! admission counters, the in-flight jobs and the merge coordinator. Workers
//! only ever see a [`Job`] and hand back a [`TaskOutcome`]; conflict
//! resolution and merging happen here, one outcome at a time.
//!
//! Each pass of the loop retries deferred merges, schedules whatever is
//! ready, then waits for the next outcome. A ready task is held back while
//! an in-flight task shares one of its touch hints, so the batches produced
//! by [`partition`] never run side by side.

mod pool;
mod report;

pub use pool::WorkerPool;
pub use report::RunReport;

use crate::admission::AdmissionController;
use crate::batch::{apply_owner_hints, batch_ids, partition};
use crate::capability::{Capability, Catalogue, assign_capabilities};
use crate::changes::ChangeSet;
use crate::config::Config;
use crate::conflict::{ConflictResolver, Resolution};
use crate::context::RunContext;
use crate::error::{PatchbayError, Result};
use crate::events::{Event, EventLog, LogStream};
use crate::executor::{Executor, Job, Stage, TaskOutcome};
use crate::graph::TaskGraph;
use crate::merge::MergeCoordinator;
use crate::plan::{Plan, Task, TaskStatus};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

pub struct Dispatcher {
    ctx: RunContext,
    config: Config,
    catalogue: Catalogue,
    plan: Plan,
    plan_path: PathBuf,
    executor: Arc<Executor>,
    admission: AdmissionController,
    merger: MergeCoordinator,
    log: EventLog,
}

/// An outcome that passed conflict resolution but could not take the lock.
struct PendingMerge {
    outcome: TaskOutcome,
    changes: ChangeSet,
    /// Merge count of the coordinator when the changes were last checked.
    checked: usize,
    rebased: bool,
}

struct RunState {
    inflight: HashMap<String, Job>,
    pending: Vec<PendingMerge>,
    last_batches: Vec<Vec<String>>,
    report: RunReport,
}

impl Dispatcher {
    pub fn new(
        ctx: RunContext,
        config: Config,
        catalogue: Catalogue,
        plan: Plan,
        plan_path: impl Into<PathBuf>,
        executor: Executor,
    ) -> Self {
        let admission = AdmissionController::from_catalogue(&catalogue);
        let merger = MergeCoordinator::new(&ctx, &config);
        let log = ctx.event_log();
        Self {
            ctx,
            config,
            catalogue,
            plan,
            plan_path: plan_path.into(),
            executor: Arc::new(executor),
            admission,
            merger,
            log,
        }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Drive the plan until nothing more can be scheduled.
    ///
    /// Only graph errors and failures to persist the plan abort the run;
    /// everything that goes wrong inside a task ends up in the report.
    pub fn run(&mut self) -> Result<RunReport> {
        self.ctx.ensure_dirs()?;
        let order = self.prepare()?;
        let rank: HashMap<String, usize> = order
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();

        let pool = WorkerPool::new(self.config.max_workers, Arc::clone(&self.executor))?;
        let mut state = RunState {
            inflight: HashMap::new(),
            pending: Vec::new(),
            last_batches: Vec::new(),
            report: RunReport::new(&self.ctx.run_id),
        };
        tracing::info!(
            run_id = %self.ctx.run_id,
            tasks = rank.len(),
            workers = self.config.max_workers,
            "run started"
        );

        loop {
            let merged = self.retry_pending_merges(&mut state)?;
            self.dispatch_ready(&pool, &rank, &mut state)?;

            if state.inflight.is_empty() {
                if merged == 0 {
                    break;
                }
                continue;
            }

            let outcome = pool.recv().ok_or_else(|| {
                PatchbayError::ExecutionError("worker pool stopped with tasks in flight".to_string())
            })?;
            self.handle_outcome(outcome, &pool, &mut state)?;
        }

        self.finish(state)
    }

    /// Reset leftovers, validate the graph, add owner hints and route.
    fn prepare(&mut self) -> Result<Vec<String>> {
        let reset = self.plan.reset_interrupted();
        if !reset.is_empty() {
            tracing::info!(tasks = ?reset, "reset tasks left mid-flight by an earlier run");
        }

        let graph = TaskGraph::build(&self.plan.flatten())?;
        let order = graph.order()?;

        apply_owner_hints(self.plan.tasks_mut(), &self.config.owner_touch_hints);
        assign_capabilities(
            self.plan.tasks_mut(),
            &self.catalogue,
            &self.config.default_capability,
        );
        self.save_plan()?;
        Ok(order)
    }

    fn dispatch_ready(
        &mut self,
        pool: &WorkerPool,
        rank: &HashMap<String, usize>,
        state: &mut RunState,
    ) -> Result<()> {
        let mut ready: Vec<Task> = self
            .plan
            .ready_ids()
            .iter()
            .filter_map(|id| self.plan.task(id).cloned())
            .collect();
        if ready.is_empty() {
            return Ok(());
        }
        ready.sort_by_key(|t| rank.get(&t.id).copied().unwrap_or(usize::MAX));

        let batches = partition(&ready);
        let ids = batch_ids(&batches);
        if ids != state.last_batches {
            self.log.record(
                LogStream::Pool,
                &Event::named("batches_scheduled").with_field("batches", ids.clone()),
            );
            tracing::debug!(batches = ?ids, "batches scheduled");
            state.last_batches = ids;
        }

        let mut busy: HashSet<String> = state
            .inflight
            .values()
            .flat_map(|job| job.task.touch_hints.iter().cloned())
            .collect();

        for task in batches.into_iter().flatten() {
            if task.touch_hints.iter().any(|h| busy.contains(h)) {
                tracing::debug!(task = %task.id, "waiting for in-flight work on the same hints");
                continue;
            }
            let name = task
                .capability
                .clone()
                .unwrap_or_else(|| self.config.default_capability.clone());
            if !self.admission.try_admit(&name) {
                tracing::debug!(task = %task.id, capability = %name, "admission deferred");
                continue;
            }

            busy.extend(task.touch_hints.iter().cloned());
            let capability = self
                .catalogue
                .get(&name)
                .cloned()
                .unwrap_or_else(|| Capability::new(&name));
            self.start(pool, Job::new(task, capability), state)?;
        }

        Ok(())
    }

    /// Mark the task in progress and hand it to the pool.
    fn start(&mut self, pool: &WorkerPool, job: Job, state: &mut RunState) -> Result<()> {
        let id = job.task.id.clone();
        self.plan.set_status(&id, TaskStatus::InProgress)?;
        self.save_plan()?;

        self.log.record(
            LogStream::Dispatch,
            &Event::new()
                .with_task(&id)
                .with_field("capability", job.capability.name.as_str())
                .with_field("attempt", job.attempt),
        );
        tracing::info!(
            task = %id,
            capability = %job.capability.name,
            attempt = job.attempt,
            "dispatched"
        );

        pool.submit(job.clone())?;
        state.inflight.insert(id, job);
        Ok(())
    }

    fn handle_outcome(
        &mut self,
        outcome: TaskOutcome,
        pool: &WorkerPool,
        state: &mut RunState,
    ) -> Result<()> {
        let Some(job) = state.inflight.remove(&outcome.task_id) else {
            tracing::warn!(task = %outcome.task_id, "outcome for a task that is not in flight");
            return Ok(());
        };

        match outcome.status {
            TaskStatus::ReadyToMerge => {
                self.plan
                    .set_status(&outcome.task_id, TaskStatus::ReadyToMerge)?;
                self.save_plan()?;
                self.merge_outcome(outcome, state)
            }
            TaskStatus::Failed if self.admission.try_use_fix(&job.capability.name) => {
                let reason = outcome
                    .reason
                    .clone()
                    .unwrap_or_else(|| "attempt failed".to_string());
                tracing::info!(
                    task = %outcome.task_id,
                    attempt = job.attempt + 1,
                    reason = %reason,
                    "retrying with fix budget"
                );
                // The admission slot stays taken across the retry.
                self.start(pool, job.retry(reason), state)
            }
            status => {
                let stage = outcome.stage;
                let reason = outcome.reason.clone();
                self.resolve(&outcome, status, stage, reason, state)
            }
        }
    }

    /// Run conflict resolution, then merge.
    fn merge_outcome(&mut self, outcome: TaskOutcome, state: &mut RunState) -> Result<()> {
        let resolution = ConflictResolver::new(
            &self.ctx,
            self.executor.ignore_dirs(),
            self.executor.gate(),
        )
        .resolve(&outcome, self.merger.merged());

        let changes = outcome.changes.clone();
        self.settle(outcome, resolution, changes, false, state)
            .map(|_| ())
    }

    /// Act on a resolution: block, or try the merge with the right changes.
    ///
    /// `changes` and `rebased` describe the outcome before this resolution.
    fn settle(
        &mut self,
        outcome: TaskOutcome,
        resolution: Resolution,
        changes: ChangeSet,
        rebased: bool,
        state: &mut RunState,
    ) -> Result<bool> {
        let (changes, rebased) = match resolution {
            Resolution::Clean => (changes, rebased),
            Resolution::Rebased(changes) => (changes, true),
            Resolution::Blocked { reason, detail, .. } => {
                let reason = match detail {
                    Some(detail) => format!("{}: {}", reason.as_str(), detail),
                    None => reason.as_str().to_string(),
                };
                self.resolve(
                    &outcome,
                    TaskStatus::Blocked,
                    Some(Stage::Rebase),
                    Some(reason),
                    state,
                )?;
                return Ok(false);
            }
        };

        let checked = self.merger.merge_count();
        self.try_merge(
            PendingMerge {
                outcome,
                changes,
                checked,
                rebased,
            },
            state,
        )
    }

    /// Returns true when the merge went through.
    fn try_merge(&mut self, pending: PendingMerge, state: &mut RunState) -> Result<bool> {
        let id = pending.outcome.task_id.clone();
        match self
            .merger
            .merge(&id, &pending.outcome.sandbox, &pending.changes)
        {
            Ok(()) => {
                self.resolve(&pending.outcome, TaskStatus::Done, None, None, state)?;
                Ok(true)
            }
            Err(e @ PatchbayError::LockTimeout { .. }) => {
                tracing::warn!(task = %id, error = %e, "merge deferred");
                state.pending.push(pending);
                Ok(false)
            }
            Err(e) => {
                self.resolve(
                    &pending.outcome,
                    TaskStatus::Failed,
                    Some(Stage::Merge),
                    Some(e.to_string()),
                    state,
                )?;
                Ok(false)
            }
        }
    }

    fn retry_pending_merges(&mut self, state: &mut RunState) -> Result<usize> {
        let mut merged = 0;
        for pending in std::mem::take(&mut state.pending) {
            // Work merged while this one waited has not been checked yet.
            let newer = self.merger.merged_since(pending.checked);
            let resolution = ConflictResolver::new(
                &self.ctx,
                self.executor.ignore_dirs(),
                self.executor.gate(),
            )
            .recheck(
                &pending.outcome,
                &pending.changes,
                pending.rebased,
                self.merger.merged(),
                &newer,
            );
            let PendingMerge {
                outcome,
                changes,
                rebased,
                ..
            } = pending;
            if self.settle(outcome, resolution, changes, rebased, state)? {
                merged += 1;
            }
        }
        Ok(merged)
    }

    /// Record a final status: persist, log, free the admission slot.
    fn resolve(
        &mut self,
        outcome: &TaskOutcome,
        status: TaskStatus,
        stage: Option<Stage>,
        reason: Option<String>,
        state: &mut RunState,
    ) -> Result<()> {
        debug_assert!(status.is_terminal());
        let id = outcome.task_id.as_str();
        self.plan.set_status(id, status)?;
        self.save_plan()?;
        self.admission.release(&outcome.capability);

        let mut event = Event::named("task_resolved")
            .with_task(id)
            .with_field("status", status.as_str())
            .with_field("attempt", outcome.attempt);
        if let Some(stage) = stage {
            event = event.with_field("stage", stage.as_str());
        }
        if let Some(reason) = &reason {
            event = event.with_field("reason", reason.as_str());
        }
        self.log.record(LogStream::Tasks, &event);

        if status == TaskStatus::Done {
            tracing::info!(task = id, "task done");
        } else {
            tracing::warn!(
                task = id,
                status = %status,
                stage = ?stage,
                reason = reason.as_deref().unwrap_or(""),
                "task resolved"
            );
        }
        state.report.record(id, status);
        Ok(())
    }

    fn finish(&mut self, mut state: RunState) -> Result<RunReport> {
        for pending in state.pending.drain(..) {
            let id = pending.outcome.task_id;
            self.admission.release(&pending.outcome.capability);
            self.log.record(
                LogStream::Tasks,
                &Event::named("merge_deferred").with_task(&id),
            );
            tracing::warn!(task = %id, "merge lock never acquired, left ready_to_merge");
            state.report.deferred.push(id);
        }

        let unscheduled: Vec<String> = self
            .plan
            .tasks()
            .filter(|t| t.status == TaskStatus::Todo)
            .map(|t| t.id.clone())
            .collect();
        if !unscheduled.is_empty() {
            tracing::warn!(tasks = ?unscheduled, "tasks left unscheduled");
            self.log.record(
                LogStream::Tasks,
                &Event::named("unscheduled").with_field("tasks", unscheduled.clone()),
            );
        }
        state.report.unscheduled = unscheduled;

        tracing::info!(run_id = %self.ctx.run_id, clean = state.report.is_clean(), "run finished");
        Ok(state.report)
    }

    fn save_plan(&self) -> Result<()> {
        self.plan.save(&self.plan_path)
    }
}
