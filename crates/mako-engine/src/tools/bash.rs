use std::time::Duration;

use async_trait::async_trait;
use mako_core::tools::{Tool, ToolContext, ToolError, ToolResult};
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TIMEOUT_SECS: u64 = 600;

/// Runs a shell command in the session workspace.
pub struct BashTool {
    timeout: Duration,
}

impl BashTool {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self::new()
    }
}

fn format_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    let mut content = String::new();
    if !stdout.is_empty() {
        content.push_str(&stdout);
    }
    if !stderr.is_empty() {
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str("STDERR:\n");
        content.push_str(&stderr);
    }
    if content.is_empty() {
        content.push_str("(no output)");
    }
    content
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace directory"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (max 600)"
                }
            }
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let command = args["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("command is required".into()))?;

        let timeout = args["timeout"]
            .as_u64()
            .map(|secs| Duration::from_secs(secs.clamp(1, MAX_TIMEOUT_SECS)))
            .unwrap_or(self.timeout);

        debug!(command, cwd = %ctx.working_directory.display(), "running shell command");

        let output = tokio::time::timeout(
            timeout,
            tokio::process::Command::new("bash")
                .arg("-c")
                .arg(command)
                .current_dir(&ctx.working_directory)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ToolError::Timeout(timeout))?
        .map_err(|e| ToolError::ExecutionFailed(format!("Failed to execute command: {e}")))?;

        let content = format_output(&output.stdout, &output.stderr);
        if output.status.success() {
            Ok(ToolResult::ok(content))
        } else {
            let exit_code = output.status.code().unwrap_or(-1);
            Ok(ToolResult::failed(format!("Exit code: {exit_code}\n{content}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mako_core::ids::SessionId;

    fn test_ctx() -> ToolContext {
        ToolContext {
            session_id: SessionId::new(),
            working_directory: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn execute_simple_command() {
        let result = BashTool::new()
            .execute(serde_json::json!({"command": "echo hello world"}), &test_ctx())
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.content.contains("hello world"));
    }

    #[tokio::test]
    async fn execute_failing_command() {
        let result = BashTool::new()
            .execute(serde_json::json!({"command": "echo partial; exit 3"}), &test_ctx())
            .await
            .unwrap();
        assert!(!result.success);
        let text = result.text();
        assert!(text.starts_with("Exit code: 3"));
        assert!(text.contains("partial"));
    }

    #[tokio::test]
    async fn execute_with_stderr() {
        let result = BashTool::new()
            .execute(serde_json::json!({"command": "echo oops >&2"}), &test_ctx())
            .await
            .unwrap();
        assert!(result.content.contains("STDERR:\noops"));
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = std::env::temp_dir().join(format!("mako_bash_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("marker.txt"), "x").unwrap();
        let ctx = ToolContext {
            session_id: SessionId::new(),
            working_directory: dir.clone(),
        };

        let result = BashTool::new()
            .execute(serde_json::json!({"command": "ls"}), &ctx)
            .await
            .unwrap();
        assert!(result.content.contains("marker.txt"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn execute_timeout() {
        let err = BashTool::with_timeout(Duration::from_millis(100))
            .execute(serde_json::json!({"command": "sleep 5"}), &test_ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_command() {
        let err = BashTool::new()
            .execute(serde_json::json!({}), &test_ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn empty_output_placeholder() {
        assert_eq!(format_output(b"", b""), "(no output)");
    }
}
