//! Translation between conversation messages and the Anthropic-style
//! messages API used by the backend.

use serde_json::{json, Value};

use mako_core::errors::GatewayError;
use mako_core::ids::ToolCallId;
use mako_core::messages::{AssistantMessage, Message, ToolCall, UserContent, UserMessage};
use mako_core::provider::{FinishReason, ModelResponse};
use mako_core::tools::ToolDefinition;

/// Backend status codes that mean success.
const SUCCESS_CODES: [i64; 2] = [0, 1000];
const CODE_INSUFFICIENT_BALANCE: i64 = 1008;
const CODE_MODEL_NOT_SUPPORTED: i64 = 2013;

/// Build the request body for one `generate` call.
pub fn build_request_body(
    messages: &[Message],
    tools: &[ToolDefinition],
    model: &str,
    max_tokens: u32,
) -> Value {
    let (system, turns) = convert_messages(messages);

    let mut body = json!({
        "model": model,
        "messages": turns,
        "max_tokens": max_tokens,
    });

    if let Some(system) = system {
        body["system"] = json!(system);
    }

    if !tools.is_empty() {
        body["tools"] = json!(tools.iter().map(convert_tool).collect::<Vec<_>>());
    }

    body
}

/// Split out system text and convert the remaining turns.
///
/// Multiple system messages are joined with a blank line.
pub fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut turns = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg {
            Message::System(s) => system_parts.push(&s.content),
            Message::User(u) => turns.push(json!({
                "role": "user",
                "content": convert_user_content(u),
            })),
            Message::Assistant(a) => turns.push(convert_assistant_message(a)),
            Message::Tool(t) => turns.push(json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": t.tool_call_id.as_str(),
                    "content": t.content,
                }],
            })),
        }
    }

    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, turns)
}

fn convert_user_content(msg: &UserMessage) -> Value {
    if let [UserContent::Text { text }] = msg.content.as_slice() {
        return json!(text);
    }
    let blocks: Vec<Value> = msg
        .content
        .iter()
        .map(|c| match c {
            UserContent::Text { text } => json!({"type": "text", "text": text}),
            UserContent::Image { mime_type, data } => json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": mime_type,
                    "data": data,
                },
            }),
        })
        .collect();
    json!(blocks)
}

/// Segments go thinking, then text, then one `tool_use` per call.
fn convert_assistant_message(msg: &AssistantMessage) -> Value {
    if !msg.needs_segments() {
        return json!({"role": "assistant", "content": msg.content});
    }

    let mut segments = Vec::new();
    if let Some(thinking) = &msg.thinking {
        segments.push(json!({"type": "thinking", "thinking": thinking}));
    }
    if !msg.content.is_empty() {
        segments.push(json!({"type": "text", "text": msg.content}));
    }
    for tc in &msg.tool_calls {
        segments.push(json!({
            "type": "tool_use",
            "id": tc.id.as_str(),
            "name": tc.name,
            "input": tc.arguments,
        }));
    }

    json!({"role": "assistant", "content": segments})
}

fn convert_tool(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters_schema,
    })
}

/// Fail on an error envelope embedded in a 2xx body.
pub fn check_error_envelope(body: &Value, model: &str) -> Result<(), GatewayError> {
    if body.get("type").and_then(Value::as_str) == Some("error") {
        let error = body.get("error").cloned().unwrap_or(Value::Null);
        let kind = error.get("type").and_then(Value::as_str).unwrap_or("unknown");
        let message = error.get("message").and_then(Value::as_str).unwrap_or("no message");
        return Err(GatewayError::Backend {
            code: None,
            message: format!("API Error ({kind}): {message}"),
        });
    }

    if let Some(base_resp) = body.get("base_resp") {
        let raw_code = match base_resp.get("status_code") {
            None | Some(Value::Null) => return Ok(()),
            Some(raw) => raw,
        };
        // Only the integer codes 0 and 1000 mean success; a string "0" does not.
        let code = raw_code.as_i64();
        if code.is_some_and(|c| SUCCESS_CODES.contains(&c)) {
            return Ok(());
        }
        let shown = match raw_code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let status_msg = base_resp
            .get("status_msg")
            .and_then(Value::as_str)
            .unwrap_or("");
        let mut message = format!("MiniMax API Error (code {shown}): {status_msg}");
        match code {
            Some(CODE_INSUFFICIENT_BALANCE) => {
                message.push_str("\n\nInsufficient account balance, please recharge on the MiniMax platform")
            }
            Some(CODE_MODEL_NOT_SUPPORTED) => {
                message.push_str(&format!("\n\nModel '{model}' is not supported"))
            }
            _ => {}
        }
        return Err(GatewayError::Backend { code, message });
    }

    Ok(())
}

/// Parse a successful response body into a `ModelResponse`.
pub fn parse_response(body: &Value) -> Result<ModelResponse, GatewayError> {
    let blocks = match body.get("content") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(blocks)) => blocks.as_slice(),
        Some(other) => {
            return Err(GatewayError::MalformedResponse(format!(
                "content is not an array: {other}"
            )))
        }
    };

    let mut content = String::new();
    let mut thinking = String::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => content.push_str(block_str(block, "text")),
            Some("thinking") => thinking.push_str(block_str(block, "thinking")),
            Some("tool_use") => tool_calls.push(parse_tool_use(block)?),
            _ => {}
        }
    }

    let finish_reason = body
        .get("stop_reason")
        .and_then(Value::as_str)
        .map(FinishReason::from_wire)
        .unwrap_or(FinishReason::Stop);

    Ok(ModelResponse {
        content,
        thinking: (!thinking.is_empty()).then_some(thinking),
        tool_calls,
        finish_reason,
    })
}

fn block_str<'a>(block: &'a Value, key: &str) -> &'a str {
    block.get(key).and_then(Value::as_str).unwrap_or("")
}

fn parse_tool_use(block: &Value) -> Result<ToolCall, GatewayError> {
    let id = block
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::MalformedResponse("tool_use block without id".into()))?;
    let name = block
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::MalformedResponse("tool_use block without name".into()))?;
    let arguments = match block.get("input") {
        None | Some(Value::Null) => json!({}),
        Some(input) => input.clone(),
    };
    Ok(ToolCall {
        id: ToolCallId::from_raw(id),
        name: name.to_string(),
        arguments,
    })
}
