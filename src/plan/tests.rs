//! Tests for plan parsing, persistence and mutation.

use super::io::is_valid_task_id;
use super::*;
use serde_json::json;
use tempfile::TempDir;

const SAMPLE: &str = r#"{
  "project": "demo",
  "milestones": [
    {
      "id": "M1",
      "title": "First",
      "features": [
        {
          "id": "F1",
          "tasks": [
            {"id": "A", "description": "write docs", "owner": "docs", "status": "done"},
            {"id": "B", "description": "core", "depends_on": ["A"], "priority": 3}
          ]
        },
        {
          "id": "F2",
          "tasks": [
            {"id": "C", "depends_on": ["B"], "touch_hints": ["src/"]}
          ]
        }
      ]
    }
  ]
}"#;

#[test]
fn test_parse_flattens_in_document_order() {
    let plan = Plan::parse(SAMPLE).unwrap();
    let ids: Vec<&str> = plan.tasks().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
    assert_eq!(plan.task("A").unwrap().status, TaskStatus::Done);
    assert_eq!(plan.task("B").unwrap().status, TaskStatus::Todo);
    assert_eq!(plan.task("C").unwrap().touch_hints, vec!["src/"]);
}

#[test]
fn test_unknown_fields_survive_roundtrip() {
    let plan = Plan::parse(SAMPLE).unwrap();
    let text = plan.to_json_string().unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(value["project"], "demo");
    assert_eq!(value["milestones"][0]["title"], "First");
    assert_eq!(value["milestones"][0]["features"][0]["tasks"][1]["priority"], 3);
}

#[test]
fn test_status_serializes_snake_case() {
    let mut task = Task::new("X");
    task.status = TaskStatus::ReadyToMerge;
    let value = serde_json::to_value(&task).unwrap();
    assert_eq!(value["status"], "ready_to_merge");
    assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
}

#[test]
fn test_terminal_statuses() {
    assert!(TaskStatus::Done.is_terminal());
    assert!(TaskStatus::Blocked.is_terminal());
    assert!(!TaskStatus::ReadyToMerge.is_terminal());
    assert!(!TaskStatus::Todo.is_terminal());
}

#[test]
fn test_invalid_task_id_rejected() {
    let doc = json!({"milestones": [{"id": "M", "features": [{"id": "F", "tasks": [{"id": "../x"}]}]}]});
    let err = Plan::parse(&doc.to_string()).unwrap_err();
    assert!(err.to_string().contains("invalid task id '../x'"));
}

#[test]
fn test_task_id_pattern() {
    assert!(is_valid_task_id("T-1.2_b"));
    assert!(!is_valid_task_id(""));
    assert!(!is_valid_task_id(".hidden"));
    assert!(!is_valid_task_id("a/b"));
}

#[test]
fn test_invalid_json_is_user_error() {
    let err = Plan::parse("{not json").unwrap_err();
    assert!(err.to_string().contains("invalid plan JSON"));
}

#[test]
fn test_set_status_returns_previous() {
    let mut plan = Plan::parse(SAMPLE).unwrap();
    let previous = plan.set_status("B", TaskStatus::InProgress).unwrap();
    assert_eq!(previous, TaskStatus::Todo);
    assert_eq!(plan.task("B").unwrap().status, TaskStatus::InProgress);
    assert!(plan.set_status("missing", TaskStatus::Done).is_err());
}

#[test]
fn test_ready_ids_require_done_dependencies() {
    let mut plan = Plan::parse(SAMPLE).unwrap();
    assert_eq!(plan.ready_ids(), vec!["B"]);

    plan.set_status("B", TaskStatus::Done).unwrap();
    assert_eq!(plan.ready_ids(), vec!["C"]);
}

#[test]
fn test_reset_interrupted() {
    let mut plan = Plan::parse(SAMPLE).unwrap();
    plan.set_status("B", TaskStatus::InProgress).unwrap();
    plan.set_status("C", TaskStatus::ReadyToMerge).unwrap();

    assert_eq!(plan.reset_interrupted(), vec!["B", "C"]);
    assert_eq!(plan.task("A").unwrap().status, TaskStatus::Done);
    assert_eq!(plan.task("C").unwrap().status, TaskStatus::Todo);
}

#[test]
fn test_duplicate_ids() {
    let doc = json!({"milestones": [{"id": "M", "features": [
        {"id": "F1", "tasks": [{"id": "A"}, {"id": "B"}]},
        {"id": "F2", "tasks": [{"id": "A"}, {"id": "A"}]}
    ]}]});
    let plan = Plan::parse(&doc.to_string()).unwrap();
    assert_eq!(plan.duplicate_ids(), vec!["A"]);
}

#[test]
fn test_save_and_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("plan.json");
    let mut plan = Plan::parse(SAMPLE).unwrap();
    plan.set_status("B", TaskStatus::Blocked).unwrap();

    plan.save(&path).unwrap();
    let loaded = Plan::load(&path).unwrap();

    assert_eq!(loaded, plan);
    assert!(std::fs::read_to_string(&path).unwrap().ends_with("}\n"));
}

#[test]
fn test_load_missing_file_names_path() {
    let temp = TempDir::new().unwrap();
    let err = Plan::load(temp.path().join("plan.json")).unwrap_err();
    assert!(err.to_string().contains("plan.json"));
}
