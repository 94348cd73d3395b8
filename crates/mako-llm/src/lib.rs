pub mod converter;
pub mod offline;
pub mod provider;
pub mod retry;

pub mod mock;

use std::sync::Arc;

use tracing::info;

use mako_core::errors::GatewayError;
use mako_core::provider::LlmProvider;
use mako_settings::LlmSettings;

pub use offline::OfflineProvider;
pub use provider::{AnthropicCompatProvider, RetryObserver};
pub use retry::RetryPolicy;

/// Pick the backend strategy once, at startup.
///
/// Offline when `offline` is set or the API key starts with `TEST_`; live otherwise.
pub fn build_provider(settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>, GatewayError> {
    if settings.is_offline() {
        info!(model = %settings.model, "using offline model backend");
        return Ok(Arc::new(OfflineProvider::new(settings.model.clone())));
    }
    if settings.api_key.is_empty() {
        return Err(GatewayError::AuthenticationFailed(
            "no API key configured (set llm.apiKey or MAKO_API_KEY)".into(),
        ));
    }
    info!(model = %settings.model, api_base = %settings.api_base, "using live model backend");
    Ok(Arc::new(AnthropicCompatProvider::new(settings)?))
}
