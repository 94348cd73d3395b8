use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use mako_core::messages::ToolCall;
use mako_core::tools::{Tool, ToolContext, ToolDefinition, ToolResult};

use crate::truncate;

const MAX_LABEL_ARGS: usize = 3;
const MAX_LABEL_VALUE_CHARS: usize = 48;
const LABEL_VALUE_KEEP_CHARS: usize = 45;

/// Source of a registered tool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolSource {
    BuiltIn,
    /// Bound to one session's workspace directory.
    Workspace,
    /// Provided by the named MCP server.
    Mcp(String),
}

#[derive(Clone)]
struct ToolEntry {
    tool: Arc<dyn Tool>,
    source: ToolSource,
}

/// Registry of available tools. Cloning shares the tool instances.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>, source: ToolSource) {
        let name = tool.name().to_string();
        if let Some(previous) = self.tools.insert(name.clone(), ToolEntry { tool, source }) {
            debug!(tool = %name, replaced = ?previous.source, "tool replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|e| Arc::clone(&e.tool))
    }

    pub fn source(&self, name: &str) -> Option<&ToolSource> {
        self.tools.get(name).map(|e| &e.source)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tool definitions for the model, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|e| e.tool.to_definition())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call. Never fails: unknown tools, tool errors and
    /// panics all come back as a failed [`ToolResult`].
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, "unknown tool requested");
            return ToolResult::failed(format!("Unknown tool: {}", call.name));
        };

        let outcome = AssertUnwindSafe(tool.execute(call.arguments.clone(), ctx))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                debug!(tool = %call.name, error = %e, "tool returned error");
                ToolResult::failed(e.to_string())
            }
            Err(panic) => {
                let msg = panic_message(&panic);
                error!(tool = %call.name, panic = %msg, "tool panicked");
                ToolResult::failed(format!("Tool error: {msg}"))
            }
        };

        let limit = truncate::max_output_for_tool(&call.name);
        ToolResult {
            content: truncate::truncate_output(&result.content, limit),
            error: result
                .error
                .map(|e| truncate::truncate_output(&e, limit)),
            ..result
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}

/// Human-readable title for a tool call: `name(k1=v1, k2=v2, k3=v3)`.
pub fn tool_label(name: &str, arguments: &Value) -> String {
    format!("{name}({})", format_tool_args(arguments))
}

/// Render at most three arguments as `key=value`, each value as compact JSON
/// shortened to 45 characters plus `...` when longer than 48.
pub fn format_tool_args(arguments: &Value) -> String {
    match arguments {
        Value::Null => String::new(),
        Value::Object(map) => map
            .iter()
            .take(MAX_LABEL_ARGS)
            .map(|(key, value)| format!("{key}={}", shorten(&value.to_string())))
            .collect::<Vec<_>>()
            .join(", "),
        other => shorten(&other.to_string()),
    }
}

fn shorten(rendered: &str) -> String {
    if rendered.chars().count() <= MAX_LABEL_VALUE_CHARS {
        return rendered.to_string();
    }
    let kept: String = rendered.chars().take(LABEL_VALUE_KEEP_CHARS).collect();
    format!("{kept}...")
}
