//! External tool providers speaking MCP over a child process's stdio.
//!
//! One [`McpConnection`] per server: the child is spawned, initialized, and
//! its tool list becomes a set of [`McpTool`]s that forward `tools/call`
//! requests. Responses are matched to requests by id through a pending map
//! fed by a background reader task.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use mako_core::tools::{Tool, ToolContext, ToolError, ToolResult};

const PROTOCOL_VERSION: &str = "2025-06-18";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How to launch one stdio MCP server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct McpServerSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("failed to spawn MCP server '{server}': {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MCP server '{server}': {message}")]
    Transport { server: String, message: String },

    #[error("MCP server '{server}' returned error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },

    #[error("MCP server '{server}' did not answer '{method}' within {timeout:?}")]
    Timeout {
        server: String,
        method: String,
        timeout: Duration,
    },

    #[error("MCP server '{server}' closed the connection")]
    Closed { server: String },
}

type Pending = HashMap<u64, oneshot::Sender<Result<Value, McpError>>>;

struct Inner {
    server: String,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    child: AsyncMutex<Option<Child>>,
    pending: Mutex<Pending>,
    next_id: AtomicU64,
    timeout: Duration,
}

/// A live connection to one MCP server.
pub struct McpConnection {
    inner: Arc<Inner>,
    tools: Vec<Arc<McpTool>>,
}

impl McpConnection {
    pub async fn connect(spec: &McpServerSpec) -> Result<Self, McpError> {
        Self::connect_with_timeout(spec, DEFAULT_REQUEST_TIMEOUT).await
    }

    /// Spawn the server, run the handshake and list its tools.
    pub async fn connect_with_timeout(
        spec: &McpServerSpec,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| McpError::Spawn {
            server: spec.name.clone(),
            source,
        })?;

        let transport = |message: &str| McpError::Transport {
            server: spec.name.clone(),
            message: message.to_string(),
        };
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| transport("failed to capture server stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| transport("failed to capture server stdout"))?;

        let inner = Arc::new(Inner {
            server: spec.name.clone(),
            writer: AsyncMutex::new(Some(BufWriter::new(stdin))),
            child: AsyncMutex::new(Some(child)),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            timeout,
        });

        tokio::spawn(Arc::clone(&inner).reader_loop(stdout));

        let mut connection = Self {
            inner,
            tools: Vec::new(),
        };
        if let Err(e) = connection.initialize().await {
            connection.disconnect().await;
            return Err(e);
        }
        info!(server = %spec.name, tools = connection.tools.len(), "MCP server connected");
        Ok(connection)
    }

    async fn initialize(&mut self) -> Result<(), McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": "mako",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {}
        });
        self.inner.request("initialize", params).await?;
        self.inner
            .notify("notifications/initialized", json!({}))
            .await?;

        let listed = self.inner.request("tools/list", json!({})).await?;
        self.tools = listed
            .get("tools")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|t| McpTool::from_listing(Arc::clone(&self.inner), t))
            .map(Arc::new)
            .collect();
        Ok(())
    }

    pub fn server_name(&self) -> &str {
        &self.inner.server
    }

    /// Tools advertised by the server at connect time.
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn Tool>)
            .collect()
    }

    /// Close stdin and kill the child. Pending requests fail with `Closed`.
    pub async fn disconnect(&self) {
        self.inner.writer.lock().await.take();
        if let Some(mut child) = self.inner.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!(server = %self.inner.server, error = %e, "kill failed");
            }
        }
        self.inner.pending.lock().clear();
        debug!(server = %self.inner.server, "MCP server disconnected");
    }
}

impl Inner {
    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let payload = json!({
            "id": id,
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        if let Err(e) = self.write_message(&payload).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::Closed {
                server: self.server.clone(),
            }),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(McpError::Timeout {
                    server: self.server.clone(),
                    method: method.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        self.write_message(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
        .await
    }

    async fn write_message(&self, payload: &Value) -> Result<(), McpError> {
        let mut line = payload.to_string();
        line.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| McpError::Closed {
            server: self.server.clone(),
        })?;
        let io_err = |e: std::io::Error| McpError::Transport {
            server: self.server.clone(),
            message: format!("write failed: {e}"),
        };
        writer.write_all(line.as_bytes()).await.map_err(io_err)?;
        writer.flush().await.map_err(io_err)
    }

    async fn reader_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(raw)) = lines.next_line().await {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => self.handle_inbound(value).await,
                Err(e) => {
                    debug!(server = %self.server, line = trimmed, error = %e, "non-JSON line from MCP server");
                }
            }
        }

        // Dropping the senders wakes every waiter with `Closed`.
        self.pending.lock().clear();
        debug!(server = %self.server, "MCP reader finished");
    }

    async fn handle_inbound(&self, value: Value) {
        let id = value.get("id").cloned();
        let method = value.get("method").and_then(Value::as_str);

        match (id, method) {
            (Some(id), Some(method)) => self.answer_server_request(id, method).await,
            (Some(id), None) => self.resolve(&id, value),
            (None, Some(method)) => debug!(server = %self.server, method, "MCP notification"),
            (None, None) => {}
        }
    }

    fn resolve(&self, id: &Value, value: Value) {
        let Some(id) = id.as_u64() else {
            return;
        };
        let Some(sender) = self.pending.lock().remove(&id) else {
            debug!(server = %self.server, id, "response for unknown request");
            return;
        };

        let outcome = match value.get("error") {
            Some(err) => Err(McpError::Rpc {
                server: self.server.clone(),
                code: err.get("code").and_then(Value::as_i64).unwrap_or(-32000),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }),
            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
        };
        let _ = sender.send(outcome);
    }

    async fn answer_server_request(&self, id: Value, method: &str) {
        let reply = if method == "ping" {
            json!({"jsonrpc": "2.0", "id": id, "result": {}})
        } else {
            warn!(server = %self.server, method, "unsupported request from MCP server");
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("method not found: {method}")},
            })
        };
        if let Err(e) = self.write_message(&reply).await {
            debug!(server = %self.server, error = %e, "failed to answer server request");
        }
    }
}

/// A tool provided by an MCP server.
pub struct McpTool {
    connection: Arc<Inner>,
    name: String,
    description: String,
    input_schema: Value,
}

impl McpTool {
    fn from_listing(connection: Arc<Inner>, listing: &Value) -> Option<Self> {
        let name = listing.get("name")?.as_str()?.to_string();
        Some(Self {
            connection,
            name,
            description: listing
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            input_schema: listing
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
        })
    }

    pub fn server_name(&self) -> &str {
        &self.connection.server
    }
}

/// Join the text parts of a `tools/call` result.
fn call_result_text(result: &Value) -> String {
    result
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.input_schema.clone()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let arguments = match args {
            Value::Null => json!({}),
            other => other,
        };
        let result = self
            .connection
            .request("tools/call", json!({"name": self.name, "arguments": arguments}))
            .await
            .map_err(|e| match e {
                McpError::Timeout { timeout, .. } => ToolError::Timeout(timeout),
                other => ToolError::ExecutionFailed(other.to_string()),
            })?;

        let text = call_result_text(&result);
        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            Ok(ToolResult::failed(text))
        } else {
            Ok(ToolResult::ok(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mako_core::ids::SessionId;

    // Minimal line-oriented MCP server. Outbound requests serialize `id` first.
    const FAKE_SERVER: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/^{"id":\([0-9]*\),.*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2025-06-18","capabilities":{}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo","description":"Echo text","inputSchema":{"type":"object"}},{"name":"broken"}]}}\n' "$id" ;;
    *'"name":"broken"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"it broke"}],"isError":true}}\n' "$id" ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"one"},{"type":"image","data":"x"},{"type":"text","text":"two"}]}}\n' "$id" ;;
  esac
done
"#;

    fn fake_spec() -> McpServerSpec {
        McpServerSpec {
            name: "fake".into(),
            command: "bash".into(),
            args: vec!["-c".into(), FAKE_SERVER.into()],
            env: vec![("MAKO_TEST".into(), "1".into())],
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            session_id: SessionId::new(),
            working_directory: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn handshake_lists_tools() {
        let conn = McpConnection::connect(&fake_spec()).await.unwrap();
        let names: Vec<String> = conn.tools().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["echo", "broken"]);
        assert_eq!(conn.server_name(), "fake");
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn call_joins_text_parts() {
        let conn = McpConnection::connect(&fake_spec()).await.unwrap();
        let echo = conn.tools().into_iter().find(|t| t.name() == "echo").unwrap();
        let result = echo.execute(json!({"text": "hi"}), &ctx()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.content, "one\ntwo");
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn is_error_maps_to_failed_result() {
        let conn = McpConnection::connect(&fake_spec()).await.unwrap();
        let broken = conn.tools().into_iter().find(|t| t.name() == "broken").unwrap();
        assert_eq!(broken.parameters_schema()["type"], "object");
        let result = broken.execute(Value::Null, &ctx()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.text(), "it broke");
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn calls_after_disconnect_fail() {
        let conn = McpConnection::connect(&fake_spec()).await.unwrap();
        let echo = conn.tools().into_iter().find(|t| t.name() == "echo").unwrap();
        conn.disconnect().await;
        let err = echo.execute(json!({}), &ctx()).await.unwrap_err();
        assert!(err.to_string().contains("closed the connection"));
    }

    #[tokio::test]
    async fn spawn_failure() {
        let spec = McpServerSpec {
            name: "ghost".into(),
            command: "/nonexistent/mcp-server".into(),
            args: vec![],
            env: vec![],
        };
        let err = McpConnection::connect(&spec).await.err().unwrap();
        assert!(matches!(err, McpError::Spawn { .. }));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let spec = McpServerSpec {
            name: "mute".into(),
            command: "bash".into(),
            args: vec!["-c".into(), "sleep 30".into()],
            env: vec![],
        };
        let err = McpConnection::connect_with_timeout(&spec, Duration::from_millis(200))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, McpError::Timeout { ref method, .. } if method == "initialize"));
    }

    #[test]
    fn text_parts_only() {
        let result = json!({"content": [{"type": "text", "text": "a"}, {"type": "resource"}]});
        assert_eq!(call_result_text(&result), "a");
        assert_eq!(call_result_text(&json!({})), "");
    }
}
