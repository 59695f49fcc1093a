//! Bash tool - execute shell commands

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use super::{Tool, ToolResult};
use crate::error::Error;
use crate::Result;

/// Execute shell commands in the workspace
pub struct BashTool {
    workspace: PathBuf,
    timeout: Duration,
}

impl BashTool {
    pub fn new(workspace: PathBuf, timeout: Duration) -> Self {
        Self { workspace, timeout }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str { "bash" }
    fn description(&self) -> &str { "Run a shell command in the workspace and return its output" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Working directory (optional, defaults to workspace)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let command = params.get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Tool("Missing 'command' parameter".to_string()))?;

        let working_dir = params.get("working_dir")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.workspace.clone());

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&working_dir)
            .kill_on_drop(true)
            .output();

        // A timeout is reported as an error outcome, not raised.
        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(output) => output.map_err(|e| Error::Tool(format!("Failed to execute command: {}", e)))?,
            Err(_) => {
                return Ok(ToolResult::failure(format!(
                    "Command timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            let mut result = ToolResult::output(stdout.to_string());
            if !stderr.is_empty() {
                result = result.with_system(format!("stderr: {}", stderr));
            }
            Ok(result)
        } else {
            Ok(ToolResult {
                output: (!stdout.is_empty()).then(|| stdout.to_string()),
                error: Some(format!(
                    "Command failed with exit code {}\nstderr: {}",
                    output.status.code().unwrap_or(-1),
                    stderr
                )),
                ..ToolResult::default()
            })
        }
    }
}
