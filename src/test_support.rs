use crate::error::Result;
use crate::executor::{GateReport, Generation, GenerationRequest, Generator, StepResult, TestGate};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard};
use tempfile::TempDir;

static CWD_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub(crate) struct DirGuard {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl DirGuard {
    pub(crate) fn new(new_dir: &Path) -> Self {
        // Changing the process current working directory is global and not thread-safe.
        // Lock it so tests don't race even if a #[serial] annotation is missed.
        let lock = CWD_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(new_dir).unwrap();
        Self {
            original,
            _lock: lock,
        }
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}

/// Generator backed by a closure.
pub(crate) struct FnGenerator<F>(pub F);

impl<F> Generator for FnGenerator<F>
where
    F: Fn(&GenerationRequest<'_>) -> Result<Generation> + Send + Sync,
{
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<Generation> {
        (self.0)(request)
    }
}

/// Test gate backed by a closure over the sandbox path.
pub(crate) struct FnGate<F>(pub F);

impl<F> TestGate for FnGate<F>
where
    F: Fn(&Path) -> Result<GateReport> + Send + Sync,
{
    fn run(&self, sandbox: &Path, _changed: &[String]) -> Result<GateReport> {
        (self.0)(sandbox)
    }
}

/// One-step report, green or red.
pub(crate) fn gate_report(ok: bool) -> GateReport {
    GateReport {
        steps: vec![if ok {
            StepResult::pass("tests")
        } else {
            StepResult::fail("tests", "exit code 1")
        }],
    }
}

pub(crate) fn green_gate() -> impl TestGate {
    FnGate(|_: &Path| Ok(gate_report(true)))
}

/// A workspace holding the given files (relative path, contents).
pub(crate) fn create_workspace(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for (rel, body) in files {
        let path = temp.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }
    temp
}

/// Plan JSON with one milestone and one feature holding `tasks`.
pub(crate) fn plan_json(tasks: serde_json::Value) -> String {
    serde_json::json!({
        "milestones": [
            {"id": "M1", "features": [{"id": "F1", "tasks": tasks}]}
        ]
    })
    .to_string()
}
