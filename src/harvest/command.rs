//! Collaborators backed by shell commands.
//!
//! Each call runs `sh -c <script> sh <args...>`, so the script sees its
//! inputs as `$1`, `$2`, `$3`. The child is killed if it outlives the
//! configured timeout.
//!
//! | Collaborator | `$1` | `$2` | `$3` |
//! |---|---|---|---|
//! | [`CommandGenerator`] | category | location | count |
//! | [`CommandEvaluator`] | task | category | location |

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tracing::trace;

use super::collaborators::{GenerateError, UnitEvaluator, WorkGenerator};
use crate::dispatch::UnitFailure;
use crate::types::{Category, ResultRecord};

/// Default time a single command may run.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest stderr excerpt kept in a failure message.
const STDERR_EXCERPT: usize = 200;

#[derive(Debug, Clone)]
struct ShellScript {
    script: String,
    timeout: Duration,
}

impl ShellScript {
    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.script)
            .arg("sh")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Runs the script and returns its stdout.
    async fn run(&self, args: &[&str]) -> Result<String, UnitFailure> {
        trace!(script = %self.script, ?args, "Running command");
        let output = match tokio::time::timeout(self.timeout, self.command(args).output()).await {
            Err(_) => {
                return Err(UnitFailure::timeout(format!(
                    "command did not finish within {}s",
                    self.timeout.as_secs_f64()
                )));
            }
            Ok(Err(e)) => return Err(UnitFailure::other(format!("failed to run command: {e}"))),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT).collect();
            return Err(UnitFailure::other(format!("command {}: {excerpt}", output.status)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Generates tasks by running a shell command.
///
/// Stdout is either a JSON array of strings or one task per line.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    script: ShellScript,
}

impl CommandGenerator {
    pub fn new(script: impl Into<String>, timeout: Duration) -> Self {
        CommandGenerator {
            script: ShellScript {
                script: script.into(),
                timeout,
            },
        }
    }
}

impl WorkGenerator for CommandGenerator {
    async fn generate(
        &self,
        category: &Category,
        location: &str,
        count: usize,
    ) -> Result<Vec<String>, GenerateError> {
        let count = count.to_string();
        let stdout = self
            .script
            .run(&[category.as_str(), location, &count])
            .await
            .map_err(|f| GenerateError(f.to_string()))?;
        parse_task_list(&stdout)
    }
}

fn parse_task_list(stdout: &str) -> Result<Vec<String>, GenerateError> {
    let trimmed = stdout.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| GenerateError(format!("malformed task list: {e}")));
    }
    Ok(trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Evaluates a task by running a shell command.
///
/// Stdout classification:
/// - empty or `null`: no record
/// - a JSON object: the record
/// - any other JSON: invalid response
/// - not JSON: parse error
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    script: ShellScript,
}

impl CommandEvaluator {
    pub fn new(script: impl Into<String>, timeout: Duration) -> Self {
        CommandEvaluator {
            script: ShellScript {
                script: script.into(),
                timeout,
            },
        }
    }
}

impl UnitEvaluator for CommandEvaluator {
    async fn evaluate(
        &self,
        task: &str,
        category: &Category,
        location: &str,
    ) -> Result<Option<ResultRecord>, UnitFailure> {
        let stdout = self.script.run(&[task, category.as_str(), location]).await?;
        classify_evaluation(&stdout)
    }
}

fn classify_evaluation(stdout: &str) -> Result<Option<ResultRecord>, UnitFailure> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| UnitFailure::parse_error(format!("output is not JSON: {e}")))?;
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(ResultRecord(map))),
        other => Err(UnitFailure::invalid_response(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
