use serde::{Deserialize, Serialize};

use crate::ids::ToolCallId;

/// One entry of a session conversation. Replayed verbatim to the model on every step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System(SystemMessage),
    User(UserMessage),
    Assistant(AssistantMessage),
    Tool(ToolMessage),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: Vec<UserContent>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

/// Result of a tool call, correlated to the assistant call that requested it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    pub tool_call_id: ToolCallId,
    pub name: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserContent {
    Text { text: String },
    Image { mime_type: String, data: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: ToolCallId,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Message::System(SystemMessage {
            content: text.into(),
        })
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Message::User(UserMessage::text(text))
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Message::Assistant(AssistantMessage::text(text))
    }

    pub fn tool_result(
        tool_call_id: ToolCallId,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Message::Tool(ToolMessage {
            tool_call_id,
            name: name.into(),
            content: text.into(),
        })
    }

    pub fn role(&self) -> &'static str {
        match self {
            Message::System(_) => "system",
            Message::User(_) => "user",
            Message::Assistant(_) => "assistant",
            Message::Tool(_) => "tool",
        }
    }
}

impl UserMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![UserContent::Text { text: text.into() }],
        }
    }

    /// Text blocks joined with newlines; non-text blocks are skipped.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                UserContent::Text { text } => Some(text.as_str()),
                UserContent::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl AssistantMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            ..Self::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Whether the backend needs this message as typed segments instead of plain text.
    pub fn needs_segments(&self) -> bool {
        self.thinking.is_some() || self.has_tool_calls()
    }
}

/// Ordered, append-only conversation.
///
/// Tool results are only accepted when an earlier assistant message issued the
/// matching call, so the history replayed to the model never carries orphans.
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("tool result {0} does not match any prior tool call")]
    OrphanToolResult(ToolCallId),
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(prompt)],
        }
    }

    pub fn push_user(&mut self, message: UserMessage) {
        self.messages.push(Message::User(message));
    }

    pub fn push_assistant(&mut self, message: AssistantMessage) {
        self.messages.push(Message::Assistant(message));
    }

    pub fn push_tool_result(&mut self, result: ToolMessage) -> Result<(), ConversationError> {
        if !self.has_tool_call(&result.tool_call_id) {
            return Err(ConversationError::OrphanToolResult(result.tool_call_id));
        }
        self.messages.push(Message::Tool(result));
        Ok(())
    }

    /// Append any message, enforcing the tool-result invariant.
    pub fn push(&mut self, message: Message) -> Result<(), ConversationError> {
        match message {
            Message::Tool(result) => self.push_tool_result(result),
            other => {
                self.messages.push(other);
                Ok(())
            }
        }
    }

    fn has_tool_call(&self, id: &ToolCallId) -> bool {
        self.messages.iter().rev().any(|m| match m {
            Message::Assistant(a) => a.tool_calls.iter().any(|tc| &tc.id == id),
            _ => false,
        })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_assistant(&self) -> Option<&AssistantMessage> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::Assistant(a) => Some(a),
            _ => None,
        })
    }
}
