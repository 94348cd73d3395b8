use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use mako_core::events::{SessionNotification, SessionUpdate, StopReason, UpdateSink};
use mako_core::ids::SessionId;
use mako_core::messages::{Conversation, ToolMessage, UserMessage};
use mako_core::provider::LlmProvider;
use mako_core::tools::ToolContext;

use crate::registry::{tool_label, ToolRegistry};

pub const DEFAULT_MAX_STEPS: u32 = 50;

/// Everything one prompt's turn operates on.
pub struct TurnParams<'a> {
    pub session_id: &'a SessionId,
    pub conversation: &'a mut Conversation,
    pub tools: &'a ToolRegistry,
    pub tool_ctx: &'a ToolContext,
    pub cancel: &'a CancellationToken,
    pub sink: &'a dyn UpdateSink,
}

/// Drives the model/tool loop for a single prompt.
///
/// Each step calls the model with the whole conversation, streams thinking and
/// text to the sink, appends the assistant message, then runs the requested
/// tool calls in order and appends one result per call. The loop ends when the
/// model stops calling tools, the token is cancelled, the model call fails, or
/// `max_steps` model calls have been made. No failure escapes: the outcome is
/// always a [`StopReason`].
pub struct TurnExecutor {
    provider: Arc<dyn LlmProvider>,
    max_steps: u32,
}

impl TurnExecutor {
    pub fn new(provider: Arc<dyn LlmProvider>, max_steps: u32) -> Self {
        Self {
            provider,
            max_steps,
        }
    }

    #[instrument(skip_all, fields(session_id = %p.session_id, max_steps = self.max_steps))]
    pub async fn run(&self, p: TurnParams<'_>, prompt: UserMessage) -> StopReason {
        p.conversation.push_user(prompt);

        for step in 1..=self.max_steps {
            if p.cancel.is_cancelled() {
                info!(step, "turn cancelled before model call");
                return StopReason::Cancelled;
            }

            let definitions = p.tools.definitions();
            debug!(step, messages = p.conversation.len(), tools = definitions.len(), "calling model");

            let response = match self
                .provider
                .generate(p.conversation.messages(), &definitions)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    error!(step, kind = e.error_kind(), error = %e, "model call failed");
                    emit(p.sink, p.session_id, SessionUpdate::message(format!("Error: {e}"))).await;
                    return StopReason::Refusal;
                }
            };

            if p.cancel.is_cancelled() {
                info!(step, "turn cancelled during model call");
                return StopReason::Cancelled;
            }

            if let Some(thinking) = response.thinking.as_deref().filter(|t| !t.is_empty()) {
                emit(p.sink, p.session_id, SessionUpdate::thought(thinking)).await;
            }
            if !response.content.is_empty() {
                emit(p.sink, p.session_id, SessionUpdate::message(response.content.as_str())).await;
            }

            let assistant = response.to_assistant_message();
            let calls = assistant.tool_calls.clone();
            p.conversation.push_assistant(assistant);

            if calls.is_empty() {
                debug!(step, finish_reason = ?response.finish_reason, "turn complete");
                return StopReason::EndTurn;
            }

            for call in &calls {
                emit(
                    p.sink,
                    p.session_id,
                    SessionUpdate::tool_call_started(
                        call.id.clone(),
                        tool_label(&call.name, &call.arguments),
                        call.arguments.clone(),
                    ),
                )
                .await;

                let result = p.tools.dispatch(call, p.tool_ctx).await;
                let text = result.text().to_string();
                debug!(step, tool = %call.name, success = result.success, "tool finished");

                emit(
                    p.sink,
                    p.session_id,
                    SessionUpdate::tool_call_finished(call.id.clone(), result.success, &text),
                )
                .await;

                let appended = p.conversation.push_tool_result(ToolMessage {
                    tool_call_id: call.id.clone(),
                    name: call.name.clone(),
                    content: text,
                });
                if let Err(e) = appended {
                    error!(error = %e, "tool result rejected by conversation");
                    return StopReason::Refusal;
                }
            }
        }

        warn!(max_steps = self.max_steps, "step limit reached");
        StopReason::MaxTurnRequests
    }
}

async fn emit(sink: &dyn UpdateSink, session_id: &SessionId, update: SessionUpdate) {
    sink.session_update(SessionNotification {
        session_id: session_id.clone(),
        update,
    })
    .await;
}
