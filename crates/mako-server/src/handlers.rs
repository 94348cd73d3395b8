//! RPC method handlers.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use mako_engine::{EngineError, McpServerSpec};

use crate::protocol::{
    AgentInfo, CancelNotification, InitializeRequest, InitializeResponse, NewSessionRequest,
    NewSessionResponse, PromptRequest, PromptResponse,
};
use crate::rpc::{parse_params, RpcError, RpcResponse, SESSION_BUSY};
use crate::sessions::SessionManager;

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub sessions: Arc<SessionManager>,
    pub agent_info: AgentInfo,
}

impl HandlerState {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            agent_info: AgentInfo::default(),
        }
    }
}

/// Dispatch an RPC method to its handler. Notifications are handled the same
/// way; the transport drops their responses.
pub async fn dispatch(
    state: &Arc<HandlerState>,
    method: &str,
    params: Option<Value>,
    id: Value,
) -> RpcResponse {
    let result = match method {
        "initialize" => initialize(state, params),
        "session/new" => session_new(state, params).await,
        "session/prompt" => session_prompt(state, params).await,
        "session/cancel" => session_cancel(state, params),
        _ => Err(RpcError::method_not_found(method)),
    };
    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(error) => {
            debug!(method, code = error.code, message = %error.message, "request failed");
            RpcResponse::failure(id, error)
        }
    }
}

fn initialize(state: &HandlerState, params: Option<Value>) -> Result<Value, RpcError> {
    let req: InitializeRequest = parse_params(params)?;
    if let Some(version) = req.protocol_version {
        debug!(client_version = version, "client initialize");
    }
    to_value(InitializeResponse::new(state.agent_info.clone()))
}

async fn session_new(state: &HandlerState, params: Option<Value>) -> Result<Value, RpcError> {
    let req: NewSessionRequest = parse_params(params)?;
    let specs: Vec<McpServerSpec> = req
        .mcp_servers
        .iter()
        .filter_map(|config| {
            let spec = config.to_spec();
            if spec.is_none() {
                warn!(server = %config.name, kind = ?config.kind, "ignoring non-stdio MCP server");
            }
            spec
        })
        .collect();

    let session_id = state
        .sessions
        .create(req.cwd.as_deref(), &specs)
        .await
        .map_err(engine_error)?;
    to_value(NewSessionResponse { session_id })
}

async fn session_prompt(state: &HandlerState, params: Option<Value>) -> Result<Value, RpcError> {
    let req: PromptRequest = parse_params(params)?;
    let stop_reason = state
        .sessions
        .prompt(&req.session_id, &req.prompt)
        .await
        .map_err(engine_error)?;
    to_value(PromptResponse { stop_reason })
}

fn session_cancel(state: &HandlerState, params: Option<Value>) -> Result<Value, RpcError> {
    let req: CancelNotification = parse_params(params)?;
    state.sessions.cancel(&req.session_id);
    Ok(Value::Null)
}

fn engine_error(err: EngineError) -> RpcError {
    match err {
        EngineError::SessionBusy(_) => RpcError::new(SESSION_BUSY, err.to_string()),
        other => RpcError::internal(other.to_string()),
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(e.to_string()))
}
