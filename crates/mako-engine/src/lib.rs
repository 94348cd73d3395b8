pub mod error;
pub mod mcp;
pub mod registry;
pub mod runner;
pub mod skills;
pub mod tools;
pub mod truncate;

pub use error::EngineError;
pub use mcp::{McpConnection, McpError, McpServerSpec, McpTool};
pub use registry::{ToolRegistry, ToolSource};
pub use runner::{TurnExecutor, TurnParams};
pub use skills::{load_system_prompt, SkillRegistry};
