use std::path::PathBuf;

use async_trait::async_trait;
use mako_core::tools::{Tool, ToolContext, ToolError, ToolResult};

use super::resolve_path;

const DEFAULT_LIMIT: usize = 2000;
const MAX_LINE_CHARS: usize = 2000;

/// Reads a file relative to the workspace, with numbered lines.
pub struct ReadFileTool {
    workspace: PathBuf,
}

impl ReadFileTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read file contents. Lines are numbered; use offset and limit for large files"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, absolute or relative to the workspace"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-based)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read"
                }
            }
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let file_path = args["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("path is required".into()))?;

        let path = resolve_path(file_path, &self.workspace);

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ToolError::ExecutionFailed(format!("Failed to read {}: {e}", path.display()))
        })?;

        let offset = args["offset"].as_u64().unwrap_or(1).max(1) as usize;
        let limit = args["limit"].as_u64().map_or(DEFAULT_LIMIT, |l| l as usize);

        let mut output = String::new();
        for (idx, line) in content.lines().enumerate().skip(offset - 1).take(limit) {
            let line: String = line.chars().take(MAX_LINE_CHARS).collect();
            output.push_str(&format!("{:>6}\t{}\n", idx + 1, line));
        }

        if output.is_empty() {
            output = "(empty file)".to_string();
        }

        Ok(ToolResult::ok(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mako_core::ids::SessionId;
    use std::fs;

    fn temp_workspace() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mako_read_{}", uuid::Uuid::now_v7()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_ctx(dir: &std::path::Path) -> ToolContext {
        ToolContext {
            session_id: SessionId::new(),
            working_directory: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn reads_relative_path_with_line_numbers() {
        let dir = temp_workspace();
        fs::write(dir.join("test.txt"), "line 1\nline 2\nline 3\n").unwrap();

        let result = ReadFileTool::new(&dir)
            .execute(serde_json::json!({"path": "test.txt"}), &test_ctx(&dir))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.content.contains("     1\tline 1"));
        assert!(result.content.contains("     3\tline 3"));
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn offset_and_limit() {
        let dir = temp_workspace();
        let body: String = (1..=10).map(|i| format!("row {i}\n")).collect();
        fs::write(dir.join("rows.txt"), body).unwrap();

        let result = ReadFileTool::new(&dir)
            .execute(
                serde_json::json!({"path": "rows.txt", "offset": 4, "limit": 2}),
                &test_ctx(&dir),
            )
            .await
            .unwrap();

        assert_eq!(result.content, "     4\trow 4\n     5\trow 5\n");
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let dir = temp_workspace();
        let err = ReadFileTool::new(&dir)
            .execute(serde_json::json!({"path": "absent.txt"}), &test_ctx(&dir))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn empty_file() {
        let dir = temp_workspace();
        fs::write(dir.join("empty.txt"), "").unwrap();
        let result = ReadFileTool::new(&dir)
            .execute(serde_json::json!({"path": "empty.txt"}), &test_ctx(&dir))
            .await
            .unwrap();
        assert_eq!(result.content, "(empty file)");
        fs::remove_dir_all(&dir).ok();
    }
}
