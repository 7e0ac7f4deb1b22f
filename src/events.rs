//! Event logging subsystem for patchbay.
//!
//! Every run keeps an append-only audit trail as JSON Lines files in
//! `<run_root>/<run_id>/logs/`, one file per stream:
//!
//! - `dispatch.jsonl`: `{ts, task, capability}` per dispatched attempt
//! - `conflicts.jsonl`: `{ts, task, event: rebase_attempt|merge_blocked_overlap, ...}`
//! - `pool.jsonl`: `{ts, event: batches_scheduled, batches}`
//! - `tasks.jsonl`: `{ts, task, event: task_resolved, status, ...}` and
//!   `{ts, event: unscheduled, tasks}`
//!
//! Each append is one line with a trailing newline, synced to disk before
//! returning.

use crate::error::{PatchbayError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// The log file an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Dispatch,
    Conflicts,
    Pool,
    Tasks,
}

impl LogStream {
    /// File stem of the stream.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStream::Dispatch => "dispatch",
            LogStream::Conflicts => "conflicts",
            LogStream::Pool => "pool",
            LogStream::Tasks => "tasks",
        }
    }
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event record for the audit log.
///
/// Stream-specific fields are flattened into the top-level object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// Task the event concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    /// Event kind (absent on dispatch records).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    /// Remaining fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Event {
    /// Create an empty event stamped with the current time.
    pub fn new() -> Self {
        Self {
            ts: Utc::now(),
            task: None,
            event: None,
            fields: Map::new(),
        }
    }

    /// Create an event of the given kind.
    pub fn named(event: &str) -> Self {
        Self {
            event: Some(event.to_string()),
            ..Self::new()
        }
    }

    /// Set the task ID for this event.
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task = Some(task_id.into());
        self
    }

    /// Add a field to this event.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_jsonl_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            PatchbayError::UserError(format!("failed to serialize event to JSON: {}", e))
        })
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer for the JSONL streams of one run.
#[derive(Debug, Clone)]
pub struct EventLog {
    logs_dir: PathBuf,
}

impl EventLog {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
        }
    }

    /// Path of a stream's file.
    pub fn path(&self, stream: LogStream) -> PathBuf {
        self.logs_dir.join(format!("{}.jsonl", stream.as_str()))
    }

    /// Append an event to a stream.
    ///
    /// The logs directory and the file are created if needed.
    pub fn append(&self, stream: LogStream, event: &Event) -> Result<()> {
        let json_line = event.to_jsonl_line()?;

        if !self.logs_dir.exists() {
            fs::create_dir_all(&self.logs_dir).map_err(|e| {
                PatchbayError::UserError(format!(
                    "failed to create logs directory '{}': {}",
                    self.logs_dir.display(),
                    e
                ))
            })?;
        }

        let path = self.path(stream);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                PatchbayError::UserError(format!(
                    "failed to open event log '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        writeln!(file, "{}", json_line).map_err(|e| {
            PatchbayError::UserError(format!(
                "failed to write event to '{}': {}",
                path.display(),
                e
            ))
        })?;

        file.sync_all().map_err(|e| {
            PatchbayError::UserError(format!(
                "failed to sync event log '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Append, downgrading a failure to a warning.
    ///
    /// The audit trail must never turn a task outcome into a run failure.
    pub fn record(&self, stream: LogStream, event: &Event) {
        if let Err(e) = self.append(stream, event) {
            tracing::warn!(stream = %stream, error = %e, "failed to append event");
        }
    }

    /// Read back every event of a stream; a missing file yields no events.
    pub fn read(&self, stream: LogStream) -> Result<Vec<Event>> {
        read_events(&self.path(stream))
    }
}

/// Parse a JSONL event file.
pub fn read_events(path: &Path) -> Result<Vec<Event>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(PatchbayError::UserError(format!(
                "failed to read event log '{}': {}",
                path.display(),
                e
            )));
        }
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| {
                PatchbayError::UserError(format!(
                    "failed to parse event in '{}': {}",
                    path.display(),
                    e
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_event_creation() {
        let event = Event::named("batches_scheduled");

        assert_eq!(event.event.as_deref(), Some("batches_scheduled"));
        assert!(event.task.is_none());
        let age = Utc::now().signed_duration_since(event.ts);
        assert!(age.num_minutes() < 1);
    }

    #[test]
    fn test_dispatch_event_shape() {
        let event = Event::new()
            .with_task("T1")
            .with_field("capability", "docs");
        let parsed: Value = serde_json::from_str(&event.to_jsonl_line().unwrap()).unwrap();

        assert_eq!(parsed["task"], "T1");
        assert_eq!(parsed["capability"], "docs");
        assert!(parsed.get("event").is_none());
        assert!(parsed.get("ts").is_some());
    }

    #[test]
    fn test_fields_are_flattened() {
        let event = Event::named("batches_scheduled").with_field("batches", json!([["A", "B"], ["C"]]));
        let line = event.to_jsonl_line().unwrap();

        assert!(!line.contains('\n'));
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event"], "batches_scheduled");
        assert_eq!(parsed["batches"][0][1], "B");
        assert!(parsed.get("fields").is_none());
    }

    #[test]
    fn test_append_creates_dir_and_file() {
        let temp = TempDir::new().unwrap();
        let log = EventLog::new(temp.path().join("logs"));

        log.append(LogStream::Pool, &Event::named("batches_scheduled"))
            .unwrap();

        let path = log.path(LogStream::Pool);
        assert!(path.ends_with("logs/pool.jsonl"));
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_append_multiple_lines_roundtrip() {
        let temp = TempDir::new().unwrap();
        let log = EventLog::new(temp.path());

        log.append(
            LogStream::Conflicts,
            &Event::named("rebase_attempt")
                .with_task("T1")
                .with_field("result", "success"),
        )
        .unwrap();
        log.append(
            LogStream::Conflicts,
            &Event::named("merge_blocked_overlap")
                .with_task("T2")
                .with_field("changes", json!(["src/a.rs"])),
        )
        .unwrap();

        let events = log.read(LogStream::Conflicts).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].fields["result"], "success");
        assert_eq!(events[1].task.as_deref(), Some("T2"));
        assert_eq!(events[1].fields["changes"][0], "src/a.rs");
    }

    #[test]
    fn test_streams_are_separate_files() {
        let temp = TempDir::new().unwrap();
        let log = EventLog::new(temp.path());

        log.append(LogStream::Dispatch, &Event::new().with_task("T1"))
            .unwrap();

        assert_eq!(log.read(LogStream::Dispatch).unwrap().len(), 1);
        assert!(log.read(LogStream::Tasks).unwrap().is_empty());
    }

    #[test]
    fn test_stream_names() {
        assert_eq!(LogStream::Dispatch.to_string(), "dispatch");
        assert_eq!(LogStream::Conflicts.to_string(), "conflicts");
        assert_eq!(LogStream::Pool.to_string(), "pool");
        assert_eq!(LogStream::Tasks.to_string(), "tasks");
    }
}
