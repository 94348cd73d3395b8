use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use mako_engine::tools::base_tools;
use mako_engine::{load_system_prompt, SkillRegistry, TurnExecutor};
use mako_server::sessions::resolve_workspace;
use mako_server::{frame_channel, serve, HandlerState, SessionConfig, SessionManager};
use mako_settings::{load_settings, load_settings_file, settings_path};
use mako_telemetry::{init_telemetry, TelemetryConfig};

/// ACP agent bridge speaking JSON-RPC over stdin/stdout.
#[derive(Debug, Parser)]
#[command(name = "mako", version, about)]
struct Args {
    /// Settings file (defaults to ~/.mako/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the deterministic offline model backend.
    #[arg(long)]
    offline: bool,

    /// Default workspace for sessions that do not send a cwd.
    #[arg(long)]
    workspace: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let path = args.config.clone().unwrap_or_else(settings_path);
    let loaded = match &args.config {
        Some(explicit) => load_settings_file(explicit),
        None => load_settings(),
    };
    let mut settings =
        loaded.with_context(|| format!("failed to load settings from {}", path.display()))?;
    if args.offline {
        settings.llm.offline = true;
    }
    if let Some(workspace) = args.workspace {
        settings.agent.workspace_dir = workspace;
    }

    let telemetry = TelemetryConfig {
        json: settings.logging.json,
        ..TelemetryConfig::with_level(&settings.logging.level)?
    };
    init_telemetry(&telemetry)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), settings = %path.display(), "starting mako");

    let provider = mako_llm::build_provider(&settings.llm).context("failed to set up model backend")?;

    let skills = match &settings.agent.skills_dir {
        Some(dir) => SkillRegistry::load(&expand(dir)?),
        None => SkillRegistry::new(),
    };
    let prompt_path = settings.agent.system_prompt_path.as_deref().map(expand).transpose()?;
    let system_prompt = load_system_prompt(prompt_path.as_deref(), &skills);

    let config = SessionConfig {
        default_workspace: expand(&settings.agent.workspace_dir)?,
        system_prompt,
        tools: settings.tools.clone(),
    };
    tracing::info!(
        workspace = %config.default_workspace.display(),
        skills = skills.count(),
        max_steps = settings.agent.max_steps,
        "agent configured"
    );

    let (frames, outbound) = frame_channel();
    let sessions = SessionManager::new(
        TurnExecutor::new(provider, settings.agent.max_steps),
        base_tools(&settings.tools),
        config,
        Arc::new(frames.clone()),
    );
    let state = Arc::new(HandlerState::new(Arc::new(sessions)));

    serve(tokio::io::stdin(), tokio::io::stdout(), state, frames, outbound)
        .await
        .context("stdio transport failed")?;

    tracing::info!("mako stopped");
    Ok(())
}

/// `~` expansion and absolutization, shared with session workspaces.
fn expand(path: &str) -> anyhow::Result<PathBuf> {
    Ok(resolve_workspace(Some(path), Path::new("."))?)
}
