use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 request or notification (no `id`).
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

impl RpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Server-initiated notification.
#[derive(Debug, Serialize)]
pub struct RpcNotification<'a, T: Serialize> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: T,
}

impl<'a, T: Serialize> RpcNotification<'a, T> {
    pub fn new(method: &'a str, params: T) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// Server-defined: the session is already running a prompt.
pub const SESSION_BUSY: i32 = -32000;

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::failure(
            Value::Null,
            RpcError::new(PARSE_ERROR, format!("Parse error: {detail}")),
        )
    }

    pub fn invalid_request(id: Value, detail: impl std::fmt::Display) -> Self {
        Self::failure(id, RpcError::new(INVALID_REQUEST, format!("Invalid request: {detail}")))
    }
}

/// Deserialize method params, treating absent params as an empty object.
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let value = match params {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(v) => v,
    };
    serde_json::from_value(value).map_err(|e| RpcError::invalid_params(format!("Invalid params: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_rpc_request() {
        let raw = r#"{"jsonrpc":"2.0","method":"session/new","params":{"cwd":"/tmp"},"id":1}"#;
        let req: RpcRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.method, "session/new");
        assert_eq!(req.id, Some(json!(1)));
        assert!(!req.is_notification());
    }

    #[test]
    fn notification_has_no_id() {
        let raw = r#"{"jsonrpc":"2.0","method":"session/cancel","params":{"sessionId":"s"}}"#;
        let req: RpcRequest = serde_json::from_str(raw).unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn success_response_serializes() {
        let resp = RpcResponse::success(json!(7), json!({"ok": true}));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}}));
    }

    #[test]
    fn error_response_serializes() {
        let resp = RpcResponse::failure(json!("a"), RpcError::method_not_found("foo/bar"));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["error"]["code"], -32601);
        assert_eq!(value["error"]["message"], "Method not found: foo/bar");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn parse_error_has_null_id() {
        let value = serde_json::to_value(RpcResponse::parse_error("eof")).unwrap();
        assert!(value["id"].is_null());
        assert_eq!(value["error"]["code"], PARSE_ERROR);
    }

    #[test]
    fn notification_frame() {
        let frame = RpcNotification::new("session/update", json!({"x": 1}));
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"jsonrpc": "2.0", "method": "session/update", "params": {"x": 1}})
        );
    }

    #[derive(Debug, Deserialize, Default)]
    struct Sample {
        #[serde(default)]
        name: Option<String>,
    }

    #[test]
    fn params_default_to_empty_object() {
        let s: Sample = parse_params(None).unwrap();
        assert!(s.name.is_none());
        let err = parse_params::<Sample>(Some(json!({"name": 5}))).unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
    }
}
