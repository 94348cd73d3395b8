//! Newline-delimited JSON-RPC over a byte stream (stdin/stdout in production).
//!
//! Every outbound frame goes through one unbounded channel drained by a single
//! writer task, so a turn's `session/update` notifications are written before
//! the response to the `session/prompt` that produced them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use mako_core::events::{SessionNotification, UpdateSink};

use crate::handlers::{self, HandlerState};
use crate::rpc::{RpcNotification, RpcRequest, RpcResponse};

/// How long in-flight requests may keep running after the input closes.
const DRAIN_GRACE: Duration = Duration::from_secs(30);
/// How long cancelled turns get to write their final response.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Handle for queueing outbound frames. Cheap to clone.
#[derive(Clone, Debug)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<String>,
}

pub struct FrameReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FrameSender { tx }, FrameReceiver { rx })
}

impl FrameSender {
    /// Serialize and queue one frame. Returns false if it could not be queued.
    pub fn send_json<T: Serialize>(&self, frame: &T) -> bool {
        match serde_json::to_string(frame) {
            Ok(line) => self.tx.send(line).is_ok(),
            Err(e) => {
                error!(error = %e, "failed to serialize outbound frame");
                false
            }
        }
    }
}

#[async_trait]
impl UpdateSink for FrameSender {
    async fn session_update(&self, notification: SessionNotification) {
        if !self.send_json(&RpcNotification::new("session/update", &notification)) {
            debug!(session_id = %notification.session_id, "update dropped, writer closed");
        }
    }
}

/// Serve JSON-RPC until `reader` reaches EOF, then shut the sessions down and
/// flush every queued frame to `writer`.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    state: Arc<HandlerState>,
    frames: FrameSender,
    outbound: FrameReceiver,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let done = CancellationToken::new();
    let writer_task = tokio::spawn(write_frames(writer, outbound.rx, done.clone()));
    let tracker = TaskTracker::new();

    let mut lines = BufReader::new(reader).lines();
    let read_result = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_request(line) {
            Ok(request) => {
                let state = Arc::clone(&state);
                let frames = frames.clone();
                tracker.spawn(async move { handle_request(&state, &frames, request).await });
            }
            Err(response) => {
                frames.send_json(&response);
            }
        }
    };

    match &read_result {
        Ok(()) => info!("input closed, shutting down"),
        Err(e) => error!(error = %e, "failed to read input, shutting down"),
    }

    tracker.close();
    if tokio::time::timeout(DRAIN_GRACE, tracker.wait()).await.is_err() {
        warn!(in_flight = tracker.len(), "requests still running after input closed, cancelling");
    }
    state.sessions.shutdown().await;
    if tokio::time::timeout(CANCEL_GRACE, tracker.wait()).await.is_err() {
        warn!(in_flight = tracker.len(), "abandoning requests that did not finish");
    }

    done.cancel();
    match writer_task.await {
        Ok(result) => result?,
        Err(e) => error!(error = %e, "writer task failed"),
    }
    read_result
}

/// Malformed JSON is a parse error; well-formed JSON that is not a request is
/// an invalid request, echoing its `id` when it has one.
fn parse_request(line: &str) -> Result<RpcRequest, RpcResponse> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        warn!(error = %e, "unparseable input line");
        RpcResponse::parse_error(e)
    })?;
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| {
        warn!(error = %e, "invalid request");
        RpcResponse::invalid_request(id, e)
    })
}

async fn handle_request(state: &Arc<HandlerState>, frames: &FrameSender, request: RpcRequest) {
    let is_notification = request.is_notification();
    let id = request.id.unwrap_or(Value::Null);
    debug!(method = %request.method, notification = is_notification, "request received");

    let response = handlers::dispatch(state, &request.method, request.params, id).await;
    if is_notification {
        if let Some(err) = &response.error {
            debug!(method = %request.method, code = err.code, "notification failed");
        }
        return;
    }
    frames.send_json(&response);
}

async fn write_frames<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<String>,
    done: CancellationToken,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            frame = rx.recv() => match frame {
                Some(frame) => write_frame(&mut writer, &frame).await?,
                None => break,
            },
            _ = done.cancelled() => {
                while let Ok(frame) = rx.try_recv() {
                    write_frame(&mut writer, &frame).await?;
                }
                break;
            }
        }
    }
    writer.flush().await
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &str) -> std::io::Result<()> {
    writer.write_all(frame.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::{SessionConfig, SessionManager};
    use mako_core::provider::LlmProvider;
    use mako_engine::tools::base_tools;
    use mako_engine::TurnExecutor;
    use mako_llm::mock::{MockProvider, MockResponse};
    use mako_llm::OfflineProvider;
    use mako_settings::ToolSettings;
    use serde_json::json;
    use tokio::io::{duplex, DuplexStream, Lines};
    use tokio::sync::Notify;
    use tokio::task::JoinHandle;

    struct Client {
        input: Option<DuplexStream>,
        output: Lines<BufReader<DuplexStream>>,
        server: JoinHandle<std::io::Result<()>>,
        state: Arc<HandlerState>,
    }

    impl Client {
        fn start(provider: Arc<dyn LlmProvider>) -> Self {
            let (frames, outbound) = frame_channel();
            let tools = ToolSettings::default();
            let config = SessionConfig {
                default_workspace: std::env::temp_dir()
                    .join(format!("mako_stdio_{}", uuid::Uuid::now_v7())),
                system_prompt: "test".into(),
                tools: tools.clone(),
            };
            let sessions = SessionManager::new(
                TurnExecutor::new(provider, 10),
                base_tools(&tools),
                config,
                Arc::new(frames.clone()),
            );
            let state = Arc::new(HandlerState::new(Arc::new(sessions)));

            let (client_in, server_in) = duplex(64 * 1024);
            let (server_out, client_out) = duplex(64 * 1024);
            let server = tokio::spawn(serve(
                server_in,
                server_out,
                Arc::clone(&state),
                frames,
                outbound,
            ));
            Self {
                input: Some(client_in),
                output: BufReader::new(client_out).lines(),
                server,
                state,
            }
        }

        async fn send(&mut self, line: &str) {
            let input = self.input.as_mut().unwrap();
            input.write_all(line.as_bytes()).await.unwrap();
            input.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = self.output.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        /// Read frames until the response with `id`, returning it and the
        /// notifications seen before it.
        async fn until_response(&mut self, id: i64) -> (Value, Vec<Value>) {
            let mut notifications = Vec::new();
            loop {
                let frame = self.recv().await;
                if frame.get("id") == Some(&json!(id)) {
                    return (frame, notifications);
                }
                notifications.push(frame);
            }
        }

        async fn close(mut self) -> Vec<Value> {
            self.input.take();
            let mut rest = Vec::new();
            while let Some(line) = self.output.next_line().await.unwrap() {
                rest.push(serde_json::from_str(&line).unwrap());
            }
            self.server.await.unwrap().unwrap();
            rest
        }
    }

    fn cleanup(state: &HandlerState, session_id: &str) {
        let id = mako_core::ids::SessionId::from_raw(session_id);
        if let Some(ws) = state.sessions.workspace(&id) {
            std::fs::remove_dir_all(ws).ok();
        }
    }

    #[tokio::test]
    async fn initialize_round_trip() {
        let mut client = Client::start(Arc::new(OfflineProvider::new("offline")));
        client
            .send(r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":1}}"#)
            .await;
        let resp = client.recv().await;
        assert_eq!(resp["id"], 0);
        assert_eq!(resp["result"]["protocolVersion"], 1);
        assert_eq!(resp["result"]["agentInfo"]["name"], "mako");
        assert!(client.close().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_line_gets_parse_error() {
        let mut client = Client::start(Arc::new(OfflineProvider::new("offline")));
        client.send("{not json").await;
        let resp = client.recv().await;
        assert_eq!(resp["error"]["code"], -32700);
        assert!(resp["id"].is_null());

        client.send(r#"{"jsonrpc":"2.0","id":9}"#).await;
        let resp = client.recv().await;
        assert_eq!(resp["error"]["code"], -32600);
        assert_eq!(resp["id"], 9);
        client.close().await;
    }

    #[tokio::test]
    async fn unknown_method_and_silent_notification() {
        let mut client = Client::start(Arc::new(OfflineProvider::new("offline")));
        client
            .send(r#"{"jsonrpc":"2.0","method":"session/cancel","params":{"sessionId":"sess_x"}}"#)
            .await;
        client.send(r#"{"jsonrpc":"2.0","id":1,"method":"fs/read"}"#).await;
        let resp = client.recv().await;
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["error"]["code"], -32601);
        assert!(client.close().await.is_empty());
    }

    #[tokio::test]
    async fn prompt_updates_precede_response() {
        let mut client = Client::start(Arc::new(OfflineProvider::new("offline")));
        client
            .send(r#"{"jsonrpc":"2.0","id":1,"method":"session/new","params":{"cwd":null,"mcpServers":[]}}"#)
            .await;
        let (created, _) = client.until_response(1).await;
        let session_id = created["result"]["sessionId"].as_str().unwrap().to_string();

        let prompt = json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "session/prompt",
            "params": {
                "sessionId": session_id,
                "prompt": [{"type": "text", "text": "calculate 123 + 456"}]
            }
        });
        client.send(&prompt.to_string()).await;
        let (resp, updates) = client.until_response(2).await;

        assert_eq!(resp["result"]["stopReason"], "end_turn");
        let kinds: Vec<&str> = updates
            .iter()
            .map(|u| {
                assert_eq!(u["method"], "session/update");
                assert_eq!(u["params"]["sessionId"], session_id.as_str());
                u["params"]["update"]["sessionUpdate"].as_str().unwrap()
            })
            .collect();
        assert_eq!(kinds.first(), Some(&"tool_call"));
        assert_eq!(kinds.get(1), Some(&"tool_call_update"));
        assert_eq!(kinds.last(), Some(&"agent_message_chunk"));
        assert_eq!(
            updates[1]["params"]["update"]["rawOutput"],
            "579"
        );

        let state = Arc::clone(&client.state);
        client.close().await;
        cleanup(&state, &session_id);
    }

    #[tokio::test]
    async fn unknown_session_prompt_is_refused() {
        let mut client = Client::start(Arc::new(OfflineProvider::new("offline")));
        client
            .send(r#"{"jsonrpc":"2.0","id":4,"method":"session/prompt","params":{"sessionId":"sess_gone","prompt":[]}}"#)
            .await;
        let resp = client.recv().await;
        assert_eq!(resp["result"], json!({"stopReason": "refusal"}));
        client.close().await;
    }

    #[tokio::test]
    async fn cancel_is_handled_while_prompt_runs() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let provider = Arc::new(MockProvider::new(vec![MockResponse::gated(
            entered.clone(),
            release.clone(),
            MockResponse::text("too late"),
        )]));
        let mut client = Client::start(provider);
        client
            .send(r#"{"jsonrpc":"2.0","id":1,"method":"session/new","params":{}}"#)
            .await;
        let (created, _) = client.until_response(1).await;
        let session_id = created["result"]["sessionId"].as_str().unwrap().to_string();

        let prompt = json!({
            "jsonrpc": "2.0", "id": 2, "method": "session/prompt",
            "params": {"sessionId": session_id, "prompt": [{"type": "text", "text": "wait"}]}
        });
        client.send(&prompt.to_string()).await;
        entered.notified().await;

        let cancel = json!({
            "jsonrpc": "2.0", "method": "session/cancel",
            "params": {"sessionId": session_id}
        });
        client.send(&cancel.to_string()).await;
        let id = mako_core::ids::SessionId::from_raw(session_id.clone());
        // The cancel runs on its own task; release the model only once it landed.
        while !client.state.sessions.is_cancel_requested(&id) {
            tokio::task::yield_now().await;
        }
        release.notify_one();

        let (resp, updates) = client.until_response(2).await;
        assert_eq!(resp["result"]["stopReason"], "cancelled");
        assert!(updates.is_empty());

        let state = Arc::clone(&client.state);
        client.close().await;
        cleanup(&state, &session_id);
    }

    #[tokio::test]
    async fn eof_flushes_in_flight_response() {
        let mut client = Client::start(Arc::new(OfflineProvider::new("offline")));
        client
            .send(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#)
            .await;
        let rest = client.close().await;
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0]["id"], 1);
    }
}
