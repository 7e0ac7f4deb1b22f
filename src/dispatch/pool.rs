//! Fixed-size worker pool.
//!
//! Jobs go in over one channel, outcomes come back over another. Workers
//! share the job receiver behind a mutex; a panic inside an attempt is caught
//! and reported as a failed outcome, so the worker keeps serving.

use crate::error::{PatchbayError, Result};
use crate::executor::{Executor, Job, TaskOutcome};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

pub struct WorkerPool {
    jobs: Option<Sender<Job>>,
    outcomes: Receiver<TaskOutcome>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `size` workers (at least one).
    pub fn new(size: usize, executor: Arc<Executor>) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (outcome_tx, outcome_rx) = mpsc::channel::<TaskOutcome>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut workers = Vec::with_capacity(size.max(1));
        for index in 0..size.max(1) {
            let jobs = Arc::clone(&job_rx);
            let outcomes = outcome_tx.clone();
            let executor = Arc::clone(&executor);
            let handle = thread::Builder::new()
                .name(format!("patchbay-worker-{}", index))
                .spawn(move || worker_loop(&jobs, &outcomes, &executor))
                .map_err(|e| {
                    PatchbayError::ExecutionError(format!("failed to start worker: {}", e))
                })?;
            workers.push(handle);
        }
        tracing::debug!(workers = workers.len(), "worker pool started");

        Ok(Self {
            jobs: Some(job_tx),
            outcomes: outcome_rx,
            workers,
        })
    }

    pub fn submit(&self, job: Job) -> Result<()> {
        let sender = self
            .jobs
            .as_ref()
            .ok_or_else(|| PatchbayError::ExecutionError("worker pool is shut down".to_string()))?;
        sender.send(job).map_err(|_| {
            PatchbayError::ExecutionError("worker pool stopped accepting jobs".to_string())
        })
    }

    /// Block until an outcome arrives. None once every worker has exited.
    pub fn recv(&self) -> Option<TaskOutcome> {
        self.outcomes.recv().ok()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the job channel ends every worker loop.
        self.jobs.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(jobs: &Mutex<Receiver<Job>>, outcomes: &Sender<TaskOutcome>, executor: &Executor) {
    loop {
        let next = {
            let rx = jobs.lock().unwrap_or_else(|poison| poison.into_inner());
            rx.recv()
        };
        let Ok(job) = next else {
            break;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| executor.run(&job)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!(task = %job.task.id, panic = %message, "worker panicked");
                TaskOutcome::failed(
                    &job,
                    executor.context().sandbox_path(&job.task.id),
                    None,
                    format!("worker panicked: {}", message),
                )
            });

        if outcomes.send(outcome).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
