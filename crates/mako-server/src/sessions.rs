//! Session table and per-session turn bookkeeping.
//!
//! Each session owns its conversation, its tool set (base tools, tools bound to
//! its workspace, and tools from any MCP servers it connected), and at most one
//! running turn. A turn in progress is tracked in `active_turns` with its
//! cancellation token; a second prompt for the same session is rejected.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use mako_core::events::{ContentBlock, StopReason, UpdateSink};
use mako_core::ids::SessionId;
use mako_core::messages::{Conversation, UserMessage};
use mako_core::tools::ToolContext;
use mako_engine::tools::add_workspace_tools;
use mako_engine::{
    EngineError, McpConnection, McpServerSpec, ToolRegistry, ToolSource, TurnExecutor, TurnParams,
};
use mako_settings::ToolSettings;

/// Immutable configuration shared by all sessions.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub default_workspace: PathBuf,
    pub system_prompt: String,
    pub tools: ToolSettings,
}

struct Session {
    workspace: PathBuf,
    tools: ToolRegistry,
    tool_ctx: ToolContext,
    conversation: Mutex<Conversation>,
    mcp: Vec<McpConnection>,
}

struct ActiveTurn {
    cancel: CancellationToken,
}

/// Removes the active-turn entry however the turn ends.
struct TurnGuard<'a> {
    active_turns: &'a DashMap<SessionId, ActiveTurn>,
    session_id: &'a SessionId,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.active_turns.remove(self.session_id);
    }
}

pub struct SessionManager {
    executor: TurnExecutor,
    base_tools: ToolRegistry,
    config: SessionConfig,
    sink: Arc<dyn UpdateSink>,
    sessions: DashMap<SessionId, Arc<Session>>,
    active_turns: DashMap<SessionId, ActiveTurn>,
}

impl SessionManager {
    pub fn new(
        executor: TurnExecutor,
        base_tools: ToolRegistry,
        config: SessionConfig,
        sink: Arc<dyn UpdateSink>,
    ) -> Self {
        Self {
            executor,
            base_tools,
            config,
            sink,
            sessions: DashMap::new(),
            active_turns: DashMap::new(),
        }
    }

    /// Create a session rooted at `cwd` (or the configured default workspace)
    /// with the base tools, workspace tools, and every stdio MCP server that
    /// connects. Servers that fail to connect are skipped.
    #[instrument(skip(self, mcp_servers), fields(mcp_servers = mcp_servers.len()))]
    pub async fn create(
        &self,
        cwd: Option<&str>,
        mcp_servers: &[McpServerSpec],
    ) -> Result<SessionId, EngineError> {
        let workspace = resolve_workspace(cwd, &self.config.default_workspace)?;
        if let Err(e) = std::fs::create_dir_all(&workspace) {
            warn!(workspace = %workspace.display(), error = %e, "failed to create workspace directory");
        }

        let mut tools = self.base_tools.clone();
        add_workspace_tools(&mut tools, &workspace, &self.config.tools);

        let mut mcp = Vec::new();
        for spec in mcp_servers {
            match McpConnection::connect(spec).await {
                Ok(conn) => {
                    for tool in conn.tools() {
                        tools.register(tool, ToolSource::Mcp(spec.name.clone()));
                    }
                    mcp.push(conn);
                }
                Err(e) => warn!(server = %spec.name, error = %e, "skipping MCP server"),
            }
        }

        let session_id = SessionId::new();
        let session = Session {
            tool_ctx: ToolContext {
                session_id: session_id.clone(),
                working_directory: workspace.clone(),
            },
            workspace,
            tools,
            conversation: Mutex::new(Conversation::with_system(self.config.system_prompt.clone())),
            mcp,
        };
        info!(
            session_id = %session_id,
            workspace = %session.workspace.display(),
            tools = session.tools.count(),
            "session created"
        );
        self.sessions.insert(session_id.clone(), Arc::new(session));
        Ok(session_id)
    }

    /// Run one prompt to completion. Unknown sessions answer `Refusal`
    /// without side effects; a session already running a turn is busy.
    pub async fn prompt(
        &self,
        session_id: &SessionId,
        content: &[ContentBlock],
    ) -> Result<StopReason, EngineError> {
        let Some(session) = self.sessions.get(session_id).map(|s| Arc::clone(s.value())) else {
            warn!(session_id = %session_id, "prompt for unknown session");
            return Ok(StopReason::Refusal);
        };

        let cancel = match self.active_turns.entry(session_id.clone()) {
            Entry::Occupied(_) => {
                debug!(session_id = %session_id, "prompt rejected, session busy");
                return Err(EngineError::SessionBusy(session_id.clone()));
            }
            Entry::Vacant(slot) => {
                let cancel = CancellationToken::new();
                slot.insert(ActiveTurn {
                    cancel: cancel.clone(),
                });
                cancel
            }
        };
        let _guard = TurnGuard {
            active_turns: &self.active_turns,
            session_id,
        };

        let text = content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n");

        let mut conversation = session.conversation.lock().await;
        let stop = self
            .executor
            .run(
                TurnParams {
                    session_id,
                    conversation: &mut conversation,
                    tools: &session.tools,
                    tool_ctx: &session.tool_ctx,
                    cancel: &cancel,
                    sink: self.sink.as_ref(),
                },
                UserMessage::text(text),
            )
            .await;

        info!(session_id = %session_id, stop_reason = ?stop, "prompt finished");
        Ok(stop)
    }

    /// Request cancellation of the running turn. No-op for unknown or idle sessions.
    pub fn cancel(&self, session_id: &SessionId) {
        match self.active_turns.get(session_id) {
            Some(turn) => {
                turn.cancel.cancel();
                info!(session_id = %session_id, "turn cancellation requested");
            }
            None => debug!(session_id = %session_id, "cancel ignored, no running turn"),
        }
    }

    /// Cancel running turns and disconnect every session's MCP servers.
    pub async fn shutdown(&self) {
        for turn in self.active_turns.iter() {
            turn.cancel.cancel();
        }
        let sessions: Vec<Arc<Session>> =
            self.sessions.iter().map(|s| Arc::clone(s.value())).collect();
        for session in &sessions {
            for conn in &session.mcp {
                conn.disconnect().await;
            }
        }
        info!(sessions = sessions.len(), "session manager shut down");
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn is_busy(&self, session_id: &SessionId) -> bool {
        self.active_turns.contains_key(session_id)
    }

    /// True while a running turn has been asked to stop but has not yet ended.
    pub fn is_cancel_requested(&self, session_id: &SessionId) -> bool {
        self.active_turns
            .get(session_id)
            .is_some_and(|turn| turn.cancel.is_cancelled())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn workspace(&self, session_id: &SessionId) -> Option<PathBuf> {
        self.sessions.get(session_id).map(|s| s.workspace.clone())
    }

    /// Snapshot of a session's conversation length, for diagnostics and tests.
    pub async fn message_count(&self, session_id: &SessionId) -> Option<usize> {
        let session = self.sessions.get(session_id).map(|s| Arc::clone(s.value()))?;
        let conversation = session.conversation.lock().await;
        Some(conversation.len())
    }

    /// Names of the tools a session can call.
    pub fn tool_names(&self, session_id: &SessionId) -> Option<Vec<String>> {
        self.sessions.get(session_id).map(|s| s.tools.names())
    }
}

/// Requested cwd (or `default`), with `~` expanded and relative paths made
/// absolute against the process working directory.
pub fn resolve_workspace(requested: Option<&str>, default: &Path) -> Result<PathBuf, EngineError> {
    let raw = match requested.map(str::trim).filter(|s| !s.is_empty()) {
        Some(r) => expand_home(r),
        None => default.to_path_buf(),
    };
    if raw.is_absolute() {
        return Ok(raw);
    }
    let cwd = std::env::current_dir()
        .map_err(|e| EngineError::Internal(format!("cannot read current directory: {e}")))?;
    Ok(cwd.join(raw))
}

fn expand_home(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (path, home) {
        ("~", Some(home)) => home,
        (p, Some(home)) if p.starts_with("~/") => home.join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}
