//! End-of-run summary.

use crate::exit_codes;
use crate::plan::TaskStatus;
use serde::Serialize;
use std::fmt;

/// Task ids by how the run left them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub done: Vec<String>,
    pub failed: Vec<String>,
    pub blocked: Vec<String>,
    pub skipped: Vec<String>,
    /// Still `todo`: a dependency never finished or admission never allowed it.
    pub unscheduled: Vec<String>,
    /// Still `ready_to_merge`: the merge lock could not be acquired.
    pub deferred: Vec<String>,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Self::default()
        }
    }

    /// File a task under its final status. Non-final statuses are ignored.
    pub fn record(&mut self, task_id: &str, status: TaskStatus) {
        let bucket = match status {
            TaskStatus::Done => &mut self.done,
            TaskStatus::Failed => &mut self.failed,
            TaskStatus::Blocked => &mut self.blocked,
            TaskStatus::Skipped => &mut self.skipped,
            TaskStatus::Todo | TaskStatus::InProgress | TaskStatus::ReadyToMerge => return,
        };
        bucket.push(task_id.to_string());
    }

    /// Nothing needs attention.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
            && self.blocked.is_empty()
            && self.unscheduled.is_empty()
            && self.deferred.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_clean() {
            exit_codes::SUCCESS
        } else {
            exit_codes::TASKS_UNRESOLVED
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        for (label, ids) in [
            ("done", &self.done),
            ("failed", &self.failed),
            ("blocked", &self.blocked),
            ("skipped", &self.skipped),
            ("unscheduled", &self.unscheduled),
            ("deferred", &self.deferred),
        ] {
            if ids.is_empty() {
                writeln!(f, "  {:<12} 0", label)?;
            } else {
                writeln!(f, "  {:<12} {} ({})", label, ids.len(), ids.join(", "))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_report_exits_zero() {
        let report = RunReport {
            done: vec!["A".to_string()],
            skipped: vec!["B".to_string()],
            ..RunReport::new("r1")
        };
        assert!(report.is_clean());
        assert_eq!(report.exit_code(), exit_codes::SUCCESS);
    }

    #[test]
    fn test_unresolved_tasks_exit_nonzero() {
        for report in [
            RunReport {
                failed: vec!["A".to_string()],
                ..RunReport::new("r1")
            },
            RunReport {
                deferred: vec!["A".to_string()],
                ..RunReport::new("r1")
            },
        ] {
            assert_eq!(report.exit_code(), exit_codes::TASKS_UNRESOLVED);
        }
    }

    #[test]
    fn test_record_files_final_statuses_only() {
        let mut report = RunReport::new("r1");
        report.record("A", TaskStatus::Done);
        report.record("B", TaskStatus::Blocked);
        report.record("C", TaskStatus::InProgress);

        assert_eq!(report.done, vec!["A"]);
        assert_eq!(report.blocked, vec!["B"]);
        assert!(report.failed.is_empty() && report.skipped.is_empty());
    }

    #[test]
    fn test_display_lists_ids() {
        let report = RunReport {
            done: vec!["A".to_string(), "C".to_string()],
            ..RunReport::new("r1")
        };
        let text = report.to_string();
        assert!(text.starts_with("Run r1\n"));
        assert!(text.contains("done         2 (A, C)"));
        assert!(text.contains("failed       0"));
    }
}
