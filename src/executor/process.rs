//! Running external commands with a timeout.
//!
//! Commands are split with shell-words and executed directly, never through a
//! shell. Output is captured into anonymous temp files rather than pipes, so
//! a chatty child can never block on a full pipe while we poll it.

use crate::error::{PatchbayError, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Maximum number of trailing lines kept in failure messages.
pub const REPORT_MAX_LINES: usize = 50;

/// Maximum characters kept in failure messages.
pub const REPORT_MAX_CHARS: usize = 4096;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// None if the process was killed or ended by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Stdout and stderr combined, trimmed for inclusion in a message.
    pub fn tail(&self) -> String {
        let combined = if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        };
        truncate_output(combined.trim(), REPORT_MAX_LINES, REPORT_MAX_CHARS)
    }
}

/// Run `command_line` in `cwd`, killing it after `timeout`.
///
/// Spawn failures are an `ExecutionError`; a non-zero exit or a timeout is
/// reported in the returned output.
pub fn run_command(
    command_line: &str,
    cwd: &Path,
    env: &BTreeMap<String, String>,
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<CommandOutput> {
    let args = shell_words::split(command_line.trim()).map_err(|e| {
        PatchbayError::ExecutionError(format!(
            "failed to parse command '{}': {}",
            command_line, e
        ))
    })?;
    let Some((program, rest)) = args.split_first() else {
        return Err(PatchbayError::ExecutionError(format!(
            "command is empty after parsing: '{}'",
            command_line
        )));
    };

    let stdout_file = capture_file()?;
    let stderr_file = capture_file()?;
    let stdin = match stdin {
        Some(input) => {
            let mut file = capture_file()?;
            file.write_all(input.as_bytes())
                .and_then(|()| file.seek(SeekFrom::Start(0)).map(|_| ()))
                .map_err(|e| {
                    PatchbayError::ExecutionError(format!("failed to stage stdin: {}", e))
                })?;
            Stdio::from(file)
        }
        None => Stdio::null(),
    };

    let mut command = Command::new(program);
    command
        .args(rest)
        .current_dir(cwd)
        .stdin(stdin)
        .stdout(Stdio::from(clone_handle(&stdout_file)?))
        .stderr(Stdio::from(clone_handle(&stderr_file)?));
    for (key, value) in env {
        command.env(key, value);
    }

    let started = Instant::now();
    let mut child = command.spawn().map_err(|e| {
        PatchbayError::ExecutionError(format!(
            "failed to execute '{}': {} (is it installed and in PATH?)",
            program, e
        ))
    })?;
    let (exit_code, timed_out) = wait_with_timeout(&mut child, timeout)?;

    Ok(CommandOutput {
        exit_code,
        stdout: read_back(stdout_file)?,
        stderr: read_back(stderr_file)?,
        timed_out,
        duration: started.elapsed(),
    })
}

/// Returns (exit_code, timed_out).
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<(Option<i32>, bool)> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok((status.code(), false)),
            Ok(None) => {
                if started.elapsed() >= timeout {
                    // SIGKILL on Unix, TerminateProcess on Windows.
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok((None, true));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                return Err(PatchbayError::ExecutionError(format!(
                    "failed to check process status: {}",
                    e
                )));
            }
        }
    }
}

fn capture_file() -> Result<File> {
    tempfile::tempfile().map_err(|e| {
        PatchbayError::ExecutionError(format!("failed to create capture file: {}", e))
    })
}

fn clone_handle(file: &File) -> Result<File> {
    file.try_clone().map_err(|e| {
        PatchbayError::ExecutionError(format!("failed to duplicate capture file: {}", e))
    })
}

fn read_back(mut file: File) -> Result<String> {
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut bytes))
        .map_err(|e| {
            PatchbayError::ExecutionError(format!("failed to read captured output: {}", e))
        })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Keep the last `max_lines` lines, then the last `max_chars` characters.
pub fn truncate_output(output: &str, max_lines: usize, max_chars: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    let result = lines[start..].join("\n");

    let count = result.chars().count();
    if count <= max_chars {
        return result;
    }
    let tail: String = result.chars().skip(count - max_chars).collect();
    format!("...(truncated)...\n{}", tail)
}
