use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::ids::{SessionId, ToolCallId};

/// Terminal classification of a turn. Exactly one ends every prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    Refusal,
    Cancelled,
    MaxTurnRequests,
}

/// Content block exchanged with the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
    },
    /// Block types the agent does not interpret (resources, audio).
    #[serde(other)]
    Unsupported,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallContent {
    Content { content: ContentBlock },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Execute,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Completed,
    Failed,
}

/// Streaming progress emitted while a turn runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sessionUpdate", rename_all = "snake_case")]
pub enum SessionUpdate {
    AgentThoughtChunk {
        content: ContentBlock,
    },
    AgentMessageChunk {
        content: ContentBlock,
    },
    ToolCall {
        #[serde(rename = "toolCallId")]
        tool_call_id: ToolCallId,
        title: String,
        kind: ToolKind,
        status: ToolCallStatus,
        #[serde(rename = "rawInput")]
        raw_input: serde_json::Value,
    },
    ToolCallUpdate {
        #[serde(rename = "toolCallId")]
        tool_call_id: ToolCallId,
        status: ToolCallStatus,
        content: Vec<ToolCallContent>,
        #[serde(rename = "rawOutput")]
        raw_output: serde_json::Value,
    },
}

impl SessionUpdate {
    pub fn thought(text: impl Into<String>) -> Self {
        Self::AgentThoughtChunk {
            content: ContentBlock::text(text),
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::AgentMessageChunk {
            content: ContentBlock::text(text),
        }
    }

    pub fn tool_call_started(
        tool_call_id: ToolCallId,
        title: impl Into<String>,
        raw_input: serde_json::Value,
    ) -> Self {
        Self::ToolCall {
            tool_call_id,
            title: title.into(),
            kind: ToolKind::Execute,
            status: ToolCallStatus::Pending,
            raw_input,
        }
    }

    pub fn tool_call_finished(tool_call_id: ToolCallId, success: bool, text: &str) -> Self {
        Self::ToolCallUpdate {
            tool_call_id,
            status: if success {
                ToolCallStatus::Completed
            } else {
                ToolCallStatus::Failed
            },
            content: vec![ToolCallContent::Content {
                content: ContentBlock::text(text),
            }],
            raw_output: serde_json::Value::String(text.to_string()),
        }
    }
}

/// A session update addressed to the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionNotification {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    pub update: SessionUpdate,
}

/// Where a running turn delivers its streaming updates.
#[async_trait]
pub trait UpdateSink: Send + Sync {
    async fn session_update(&self, notification: SessionNotification);
}

#[async_trait]
impl UpdateSink for mpsc::UnboundedSender<SessionNotification> {
    async fn session_update(&self, notification: SessionNotification) {
        // A closed receiver only means nobody is listening; the turn goes on.
        let _ = mpsc::UnboundedSender::send(self, notification);
    }
}
