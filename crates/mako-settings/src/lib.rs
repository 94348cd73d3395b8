//! Configuration for the mako agent bridge.
//!
//! Compiled defaults, optionally overlaid by a JSON settings file, then by
//! `MAKO_*` environment variables.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_file, load_settings_from_path, settings_path};
pub use types::{AgentSettings, LlmSettings, LoggingSettings, MakoSettings, RetrySettings, ToolSettings};
