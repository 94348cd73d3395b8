//! Agent Client Protocol message shapes handled by this agent.

use serde::{Deserialize, Serialize};

use mako_core::events::{ContentBlock, StopReason};
use mako_core::ids::SessionId;
use mako_engine::McpServerSpec;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    #[serde(default)]
    pub protocol_version: Option<u32>,
    #[serde(default)]
    pub client_capabilities: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResponse {
    pub protocol_version: u32,
    pub agent_capabilities: AgentCapabilities,
    pub agent_info: AgentInfo,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    pub load_session: bool,
    pub mcp_capabilities: McpCapabilities,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct McpCapabilities {
    pub http: bool,
    pub sse: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub name: String,
    pub title: String,
    pub version: String,
}

impl Default for AgentInfo {
    fn default() -> Self {
        Self {
            name: "mako".into(),
            title: "Mako Agent".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

impl InitializeResponse {
    pub fn new(agent_info: AgentInfo) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            agent_capabilities: AgentCapabilities::default(),
            agent_info,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionRequest {
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
}

/// An MCP server offered by the client. Only stdio servers (no `type`, or
/// `type: "stdio"`) with a command are launched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpServerConfig {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    pub name: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<EnvVariable>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvVariable {
    pub name: String,
    pub value: String,
}

impl McpServerConfig {
    pub fn to_spec(&self) -> Option<McpServerSpec> {
        if !matches!(self.kind.as_deref(), None | Some("stdio")) {
            return None;
        }
        let command = self.command.as_ref().filter(|c| !c.is_empty())?;
        Some(McpServerSpec {
            name: self.name.clone(),
            command: command.clone(),
            args: self.args.clone(),
            env: self
                .env
                .iter()
                .map(|e| (e.name.clone(), e.value.clone()))
                .collect(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    pub session_id: SessionId,
    #[serde(default)]
    pub prompt: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelNotification {
    pub session_id: SessionId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initialize_response_shape() {
        let value = serde_json::to_value(InitializeResponse::new(AgentInfo::default())).unwrap();
        assert_eq!(value["protocolVersion"], 1);
        assert_eq!(value["agentCapabilities"]["loadSession"], false);
        assert_eq!(value["agentCapabilities"]["mcpCapabilities"]["http"], false);
        assert_eq!(value["agentCapabilities"]["mcpCapabilities"]["sse"], false);
        assert_eq!(value["agentInfo"]["name"], "mako");
    }

    #[test]
    fn new_session_with_stdio_server() {
        let req: NewSessionRequest = serde_json::from_value(json!({
            "cwd": "/work",
            "mcpServers": [{
                "name": "fs",
                "command": "mcp-fs",
                "args": ["--root", "/work"],
                "env": [{"name": "TOKEN", "value": "t"}]
            }]
        }))
        .unwrap();
        let spec = req.mcp_servers[0].to_spec().unwrap();
        assert_eq!(spec.command, "mcp-fs");
        assert_eq!(spec.args, vec!["--root", "/work"]);
        assert_eq!(spec.env, vec![("TOKEN".to_string(), "t".to_string())]);
    }

    #[test]
    fn http_servers_are_skipped() {
        let config: McpServerConfig = serde_json::from_value(json!({
            "type": "http",
            "name": "remote",
            "url": "https://example.test/mcp",
            "headers": []
        }))
        .unwrap();
        assert!(config.to_spec().is_none());
    }

    #[test]
    fn prompt_request_blocks() {
        let req: PromptRequest = serde_json::from_value(json!({
            "sessionId": "sess_1",
            "prompt": [
                {"type": "text", "text": "hello"},
                {"type": "resource_link", "uri": "file:///a", "name": "a"}
            ]
        }))
        .unwrap();
        assert_eq!(req.session_id.as_str(), "sess_1");
        assert_eq!(req.prompt.len(), 2);
        assert_eq!(req.prompt[1], ContentBlock::Unsupported);
    }

    #[test]
    fn prompt_response_shape() {
        let value = serde_json::to_value(PromptResponse {
            stop_reason: StopReason::MaxTurnRequests,
        })
        .unwrap();
        assert_eq!(value, json!({"stopReason": "max_turn_requests"}));
    }
}
