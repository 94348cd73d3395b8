use mako_core::errors::GatewayError;
use mako_core::ids::SessionId;
use mako_core::messages::ConversationError;
use mako_core::tools::ToolError;

use crate::mcp::McpError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("conversation error: {0}")]
    Conversation(#[from] ConversationError),

    #[error("mcp error: {0}")]
    Mcp(#[from] McpError),

    #[error("session {0} is already running a prompt")]
    SessionBusy(SessionId),

    #[error("{0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_names_the_session() {
        let err = EngineError::SessionBusy(SessionId::from_raw("sess_1"));
        assert_eq!(err.to_string(), "session sess_1 is already running a prompt");
    }

    #[test]
    fn gateway_errors_convert() {
        let err: EngineError = GatewayError::RateLimited(String::new()).into();
        assert!(matches!(err, EngineError::Gateway(GatewayError::RateLimited(_))));
    }
}
