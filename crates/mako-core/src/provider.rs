use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;
use crate::messages::{AssistantMessage, Message, ToolCall};
use crate::tools::ToolDefinition;

/// Why the backend stopped generating.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    #[serde(untagged)]
    Other(String),
}

impl FinishReason {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "stop" => Self::Stop,
            "end_turn" => Self::EndTurn,
            "tool_use" => Self::ToolUse,
            "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One model reply: text, optional thinking, and the tool calls it requested.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelResponse {
    pub content: String,
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            thinking: None,
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            content: String::new(),
            thinking: None,
            tool_calls: calls,
            finish_reason: FinishReason::ToolUse,
        }
    }

    /// The assistant message appended to the conversation for this reply.
    pub fn to_assistant_message(&self) -> AssistantMessage {
        AssistantMessage {
            content: self.content.clone(),
            thinking: self.thinking.clone(),
            tool_calls: self.tool_calls.clone(),
        }
    }
}

/// A language-model backend, live or substituted.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ToolCallId;

    #[test]
    fn finish_reason_from_wire() {
        assert_eq!(FinishReason::from_wire("end_turn"), FinishReason::EndTurn);
        assert_eq!(FinishReason::from_wire("tool_use"), FinishReason::ToolUse);
        assert_eq!(
            FinishReason::from_wire("content_filter"),
            FinishReason::Other("content_filter".into())
        );
    }

    #[test]
    fn finish_reason_serde() {
        assert_eq!(serde_json::to_string(&FinishReason::MaxTokens).unwrap(), r#""max_tokens""#);
        assert_eq!(
            serde_json::to_string(&FinishReason::Other("custom".into())).unwrap(),
            r#""custom""#
        );
    }

    #[test]
    fn assistant_message_mirrors_response() {
        let response = ModelResponse {
            content: "checking".into(),
            thinking: Some("need a file".into()),
            tool_calls: vec![ToolCall {
                id: ToolCallId::from_raw("c1"),
                name: "read_file".into(),
                arguments: serde_json::json!({"path": "a.txt"}),
            }],
            finish_reason: FinishReason::ToolUse,
        };
        let msg = response.to_assistant_message();
        assert_eq!(msg.content, "checking");
        assert_eq!(msg.thinking.as_deref(), Some("need a file"));
        assert_eq!(msg.tool_calls, response.tool_calls);
    }
}
