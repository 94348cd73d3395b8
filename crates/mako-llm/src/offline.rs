//! Deterministic backend substitute used when no live API is available.
//!
//! Responses are keyed on the last user message, so a given conversation
//! prefix always produces the same reply and the whole prompt/tool loop can
//! be exercised offline.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};

use mako_core::errors::GatewayError;
use mako_core::ids::ToolCallId;
use mako_core::messages::{Message, ToolCall, ToolMessage};
use mako_core::provider::{LlmProvider, ModelResponse};
use mako_core::tools::ToolDefinition;

pub struct OfflineProvider {
    model: String,
    call_counter: AtomicU64,
}

impl OfflineProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            call_counter: AtomicU64::new(0),
        }
    }

    fn tool_call(&self, name: &str, arguments: Value) -> ModelResponse {
        let n = self.call_counter.fetch_add(1, Ordering::Relaxed) + 1;
        ModelResponse::tool_calls(vec![ToolCall {
            id: ToolCallId::from_raw(format!("stub-{n}")),
            name: name.to_string(),
            arguments,
        }])
    }

    fn respond(&self, messages: &[Message], tools: &[ToolDefinition]) -> ModelResponse {
        let (user_text, results) = since_last_user(messages);
        let text = user_text.to_lowercase();
        let has_result = |name: &str| results.iter().any(|r| r.name == name);

        if text.contains("say 'hello, mini agent!'") || text.contains("hello, mini agent") {
            return ModelResponse::text("Hello, Mini Agent!");
        }

        if text.contains("calculate 123 + 456") && !tools.is_empty() {
            if let Some(result) = results.iter().find(|r| r.name == "calculator") {
                return ModelResponse::text(format!("The result is {}.", result.content));
            }
            return self.tool_call("calculator", json!({"operation": "add", "a": 123, "b": 456}));
        }

        if text.contains("test.txt") && text.contains("hello from agent") {
            if has_result("write_file") {
                return ModelResponse::text("Created test.txt with the requested content.");
            }
            return self.tool_call(
                "write_file",
                json!({"path": "test.txt", "content": "Hello from Agent!"}),
            );
        }

        if text.contains("list all files") && text.contains("bash") {
            if has_result("bash") {
                return ModelResponse::text("Listed the files in the workspace.");
            }
            return self.tool_call(
                "bash",
                json!({"command": "ls", "timeout": 30, "run_in_background": false}),
            );
        }

        let trimmed = user_text.trim();
        if trimmed.is_empty() {
            ModelResponse::text("Hello!")
        } else {
            ModelResponse::text(format!("Stub response: {trimmed}"))
        }
    }
}

/// Text of the last user message and the tool results that follow it.
fn since_last_user(messages: &[Message]) -> (String, Vec<&ToolMessage>) {
    let last_user = messages
        .iter()
        .rposition(|m| matches!(m, Message::User(_)));

    let Some(idx) = last_user else {
        return (String::new(), Vec::new());
    };

    let text = match &messages[idx] {
        Message::User(u) => u.text_content(),
        _ => String::new(),
    };
    let results = messages[idx + 1..]
        .iter()
        .filter_map(|m| match m {
            Message::Tool(t) => Some(t),
            _ => None,
        })
        .collect();
    (text, results)
}

#[async_trait]
impl LlmProvider for OfflineProvider {
    fn name(&self) -> &str {
        "offline"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, GatewayError> {
        Ok(self.respond(messages, tools))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mako_core::messages::AssistantMessage;

    fn calculator_def() -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "calculator".into(),
            description: "Basic arithmetic".into(),
            parameters_schema: json!({"type": "object"}),
        }]
    }

    #[tokio::test]
    async fn greeting() {
        let provider = OfflineProvider::new("offline");
        let response = provider
            .generate(&[Message::user_text("Say 'Hello, Mini Agent!'")], &[])
            .await
            .unwrap();
        assert_eq!(response.content, "Hello, Mini Agent!");
        assert!(response.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn calculator_call_then_answer() {
        let provider = OfflineProvider::new("offline");
        let tools = calculator_def();
        let mut messages = vec![Message::user_text("Please calculate 123 + 456")];

        let first = provider.generate(&messages, &tools).await.unwrap();
        assert_eq!(first.tool_calls.len(), 1);
        let call = &first.tool_calls[0];
        assert_eq!(call.name, "calculator");
        assert_eq!(call.id.as_str(), "stub-1");
        assert_eq!(call.arguments, json!({"operation": "add", "a": 123, "b": 456}));

        messages.push(Message::Assistant(first.to_assistant_message()));
        messages.push(Message::tool_result(call.id.clone(), "calculator", "579"));
        let second = provider.generate(&messages, &tools).await.unwrap();
        assert!(second.tool_calls.is_empty());
        assert_eq!(second.content, "The result is 579.");
    }

    #[tokio::test]
    async fn calculator_needs_tools() {
        let provider = OfflineProvider::new("offline");
        let response = provider
            .generate(&[Message::user_text("calculate 123 + 456")], &[])
            .await
            .unwrap();
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.content, "Stub response: calculate 123 + 456");
    }

    #[tokio::test]
    async fn earlier_results_do_not_leak_into_new_prompt() {
        let provider = OfflineProvider::new("offline");
        let tools = calculator_def();
        let messages = vec![
            Message::user_text("calculate 123 + 456"),
            Message::Assistant(AssistantMessage {
                content: String::new(),
                thinking: None,
                tool_calls: vec![ToolCall {
                    id: ToolCallId::from_raw("stub-9"),
                    name: "calculator".into(),
                    arguments: json!({}),
                }],
            }),
            Message::tool_result(ToolCallId::from_raw("stub-9"), "calculator", "579"),
            Message::assistant_text("The result is 579."),
            Message::user_text("calculate 123 + 456 again"),
        ];
        let response = provider.generate(&messages, &tools).await.unwrap();
        assert_eq!(response.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn write_file_scenario() {
        let provider = OfflineProvider::new("offline");
        let response = provider
            .generate(
                &[Message::user_text("Create test.txt containing 'Hello from Agent!'")],
                &[],
            )
            .await
            .unwrap();
        assert_eq!(response.tool_calls[0].name, "write_file");
        assert_eq!(response.tool_calls[0].arguments["path"], "test.txt");
    }

    #[tokio::test]
    async fn bash_scenario_finishes_after_result() {
        let provider = OfflineProvider::new("offline");
        let mut messages = vec![Message::user_text("List all files using bash")];
        let first = provider.generate(&messages, &[]).await.unwrap();
        let call = first.tool_calls[0].clone();
        assert_eq!(call.arguments["command"], "ls");

        messages.push(Message::Assistant(first.to_assistant_message()));
        messages.push(Message::tool_result(call.id, "bash", "a.txt"));
        let second = provider.generate(&messages, &[]).await.unwrap();
        assert_eq!(second.content, "Listed the files in the workspace.");
    }

    #[tokio::test]
    async fn fallback_echoes_prompt() {
        let provider = OfflineProvider::new("offline");
        let response = provider
            .generate(&[Message::user_text("  what time is it?  ")], &[])
            .await
            .unwrap();
        assert_eq!(response.content, "Stub response: what time is it?");

        let response = provider.generate(&[Message::system("sys")], &[]).await.unwrap();
        assert_eq!(response.content, "Hello!");
    }
}
