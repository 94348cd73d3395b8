use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use mako_core::errors::GatewayError;
use mako_core::messages::Message;
use mako_core::provider::{LlmProvider, ModelResponse};
use mako_core::tools::ToolDefinition;
use mako_settings::LlmSettings;

use crate::converter;
use crate::retry::RetryPolicy;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Callback invoked before each retry with the 1-based attempt and the failure.
pub type RetryObserver = Arc<dyn Fn(u32, &GatewayError) + Send + Sync>;

/// Live client for an Anthropic-compatible `/v1/messages` endpoint.
pub struct AnthropicCompatProvider {
    client: Client,
    api_base: String,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    retry: RetryPolicy,
    on_retry: Option<RetryObserver>,
}

impl AnthropicCompatProvider {
    pub fn new(settings: &LlmSettings) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::NetworkError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key: SecretString::from(settings.api_key.clone()),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            retry: RetryPolicy::from(&settings.retry),
            on_retry: None,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_retry_observer(mut self, observer: RetryObserver) -> Self {
        self.on_retry = Some(observer);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.api_base)
    }

    /// One HTTP round trip, including error-envelope detection.
    async fn send_once(&self, body: &Value) -> Result<Value, GatewayError> {
        let resp = self
            .client
            .post(self.endpoint())
            .header(
                "authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(GatewayError::from_status(status.as_u16(), text));
        }

        let result: Value = serde_json::from_str(&text)
            .map_err(|e| GatewayError::MalformedResponse(format!("invalid JSON: {e}")))?;
        converter::check_error_envelope(&result, &self.model)?;
        Ok(result)
    }

    fn report_retry(&self, attempt: u32, err: &GatewayError) {
        warn!(
            attempt,
            max_retries = self.retry.max_retries,
            kind = err.error_kind(),
            error = %err,
            "model call failed, retrying"
        );
        if let Some(observer) = &self.on_retry {
            observer(attempt, err);
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(REQUEST_TIMEOUT)
    } else {
        GatewayError::NetworkError(e.to_string())
    }
}

#[async_trait]
impl LlmProvider for AnthropicCompatProvider {
    fn name(&self) -> &str {
        "anthropic-compat"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, messages = messages.len(), tools = tools.len()))]
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, GatewayError> {
        let body = converter::build_request_body(messages, tools, &self.model, self.max_tokens);

        let result = if self.retry.enabled {
            self.retry
                .run_if(
                    || self.send_once(&body),
                    GatewayError::is_retryable,
                    |attempt, err: &GatewayError| self.report_retry(attempt, err),
                )
                .await?
        } else {
            self.send_once(&body).await?
        };

        let response = converter::parse_response(&result)?;
        debug!(
            tool_calls = response.tool_calls.len(),
            finish_reason = ?response.finish_reason,
            "model response parsed"
        );
        Ok(response)
    }
}
