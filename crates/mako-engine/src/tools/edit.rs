use std::path::PathBuf;

use async_trait::async_trait;
use mako_core::tools::{Tool, ToolContext, ToolError, ToolResult};

use super::resolve_path;

/// Exact, unique string replacement within one file.
pub struct EditFileTool {
    workspace: PathBuf,
}

impl EditFileTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace one exact occurrence of old_str with new_str in a file"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["path", "old_str", "new_str"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, absolute or relative to the workspace"
                },
                "old_str": {
                    "type": "string",
                    "description": "Exact text to replace; must appear exactly once"
                },
                "new_str": {
                    "type": "string",
                    "description": "Replacement text"
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
        let old_str = args["old_str"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("old_str is required".into()))?;
        let new_str = args["new_str"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("new_str is required".into()))?;

        if old_str.is_empty() {
            return Err(ToolError::InvalidArguments("old_str must not be empty".into()));
        }

        let path = resolve_path(file_path, &self.workspace);

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ToolError::ExecutionFailed(format!("Failed to read {}: {e}", path.display()))
        })?;

        match content.matches(old_str).count() {
            0 => {
                return Err(ToolError::ExecutionFailed(format!(
                    "old_str not found in {}",
                    path.display()
                )))
            }
            1 => {}
            n => {
                return Err(ToolError::ExecutionFailed(format!(
                    "old_str is not unique in {} ({n} occurrences); include more context",
                    path.display()
                )))
            }
        }

        let updated = content.replacen(old_str, new_str, 1);
        tokio::fs::write(&path, &updated).await.map_err(|e| {
            ToolError::ExecutionFailed(format!("Failed to write {}: {e}", path.display()))
        })?;

        Ok(ToolResult::ok(format!("Edited {}", path.display())))
    }
}
