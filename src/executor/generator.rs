//! The code generator contract.
//!
//! A generator receives the task, the stage and any retrieved context, and
//! answers with one of three things: a unified diff, a structured "blocked"
//! report, or anything else, which counts as producing no change.

use super::Stage;
use super::process::run_command;
use super::retrieval::Snippet;
use super::template::render_template;
use crate::capability::Capability;
use crate::config::GeneratorConfig;
use crate::diff::looks_like_diff;
use crate::error::{PatchbayError, Result};
use crate::plan::Task;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// What a generator is asked for. Serialized as the stdin payload.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest<'a> {
    pub task: &'a Task,
    pub stage: Stage,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_failure: Option<&'a str>,
    pub vault_context: &'a [Snippet],
    #[serde(skip)]
    pub capability: &'a Capability,
    #[serde(skip)]
    pub sandbox: &'a Path,
}

/// `{status: "blocked", reason, missing, suggested_tasks}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockedReport {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub missing: Vec<String>,
    #[serde(default)]
    pub suggested_tasks: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    Diff(String),
    Blocked(BlockedReport),
    NoChange,
}

pub trait Generator: Send + Sync {
    /// Errors mean the generator could not produce an answer at all.
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<Generation>;
}

/// Classify raw generator output.
pub fn parse_output(output: &str) -> Generation {
    let trimmed = output.trim();
    if trimmed.starts_with('{')
        && let Ok(value) = serde_json::from_str::<Value>(trimmed)
        && value.get("status").and_then(Value::as_str) == Some("blocked")
    {
        let report = serde_json::from_value(value).unwrap_or_default();
        return Generation::Blocked(report);
    }
    if looks_like_diff(output) {
        return Generation::Diff(output.to_string());
    }
    Generation::NoChange
}

/// Generator reached by running a configured command.
///
/// Placeholders available in the command: `{task_id}`, `{stage}`,
/// `{sandbox}`, `{capability}`, `{docker_image}`, `{attempt}`. The command
/// runs inside the sandbox with the JSON request on stdin and answers on
/// stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    config: GeneratorConfig,
}

impl CommandGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    fn command_line(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let vars: HashMap<&str, String> = HashMap::from([
            ("task_id", request.task.id.clone()),
            ("stage", request.stage.to_string()),
            ("sandbox", request.sandbox.display().to_string()),
            ("capability", request.capability.name.clone()),
            ("docker_image", request.capability.docker_image.clone()),
            ("attempt", request.attempt.to_string()),
        ]);
        render_template(&self.config.command, &vars).map_err(|e| {
            PatchbayError::ExecutionError(format!(
                "generator command template '{}': {}",
                self.config.command, e
            ))
        })
    }
}

impl Generator for CommandGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<Generation> {
        let command_line = self.command_line(request)?;
        let payload = serde_json::to_string(request).map_err(|e| {
            PatchbayError::ExecutionError(format!("failed to serialize generator request: {}", e))
        })?;

        tracing::debug!(
            task = %request.task.id,
            stage = %request.stage,
            command = %command_line,
            "running generator"
        );
        let output = run_command(
            &command_line,
            request.sandbox,
            &self.config.environment,
            Some(&payload),
            Duration::from_secs(self.config.timeout_secs),
        )?;

        if output.timed_out {
            return Err(PatchbayError::ExecutionError(format!(
                "generator timed out after {}s",
                self.config.timeout_secs
            )));
        }
        if !output.success() {
            return Err(PatchbayError::ExecutionError(format!(
                "generator exited with code {}\n{}",
                output
                    .exit_code
                    .map_or_else(|| "none".to_string(), |c| c.to_string()),
                output.tail()
            )));
        }
        Ok(parse_output(&output.stdout))
    }
}
