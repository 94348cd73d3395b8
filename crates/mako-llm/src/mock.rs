use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use mako_core::errors::GatewayError;
use mako_core::ids::ToolCallId;
use mako_core::messages::{Message, ToolCall};
use mako_core::provider::{LlmProvider, ModelResponse};
use mako_core::tools::ToolDefinition;

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone)]
pub enum MockResponse {
    Reply(ModelResponse),
    Error(GatewayError),
    /// Signal `entered`, wait for `release`, then yield the inner response.
    Gated {
        entered: Arc<Notify>,
        release: Arc<Notify>,
        inner: Box<MockResponse>,
    },
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self::Reply(ModelResponse::text(text))
    }

    /// A single tool call with the given id.
    pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self::Reply(ModelResponse::tool_calls(vec![ToolCall {
            id: ToolCallId::from_raw(id),
            name: name.to_string(),
            arguments,
        }]))
    }

    pub fn gated(entered: Arc<Notify>, release: Arc<Notify>, inner: MockResponse) -> Self {
        Self::Gated {
            entered,
            release,
            inner: Box::new(inner),
        }
    }
}

/// Mock provider that returns pre-programmed responses in sequence.
///
/// Once the queue is drained, the `fallback` response (if any) repeats.
pub struct MockProvider {
    responses: Mutex<VecDeque<MockResponse>>,
    fallback: Option<MockResponse>,
    call_count: AtomicUsize,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that answers every call with `response`.
    pub fn repeating(response: MockResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Conversations received, one per call.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().clone()
    }

    fn next_response(&self) -> Option<MockResponse> {
        self.responses
            .lock()
            .pop_front()
            .or_else(|| self.fallback.clone())
    }
}

async fn resolve(mut response: MockResponse) -> Result<ModelResponse, GatewayError> {
    loop {
        response = match response {
            MockResponse::Reply(r) => return Ok(r),
            MockResponse::Error(e) => return Err(e),
            MockResponse::Gated {
                entered,
                release,
                inner,
            } => {
                entered.notify_one();
                release.notified().await;
                *inner
            }
        };
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn generate(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<ModelResponse, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(messages.to_vec());

        let Some(response) = self.next_response() else {
            return Err(GatewayError::InvalidRequest(format!(
                "MockProvider: no response configured for call {idx}"
            )));
        };
        resolve(response).await
    }
}
