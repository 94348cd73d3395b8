pub mod bash;
pub mod calculator;
pub mod edit;
pub mod read;
pub mod write;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mako_settings::ToolSettings;

use crate::registry::{ToolRegistry, ToolSource};

/// Tools shared by every session.
pub fn base_tools(settings: &ToolSettings) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(calculator::CalculatorTool), ToolSource::BuiltIn);

    if settings.enable_bash {
        registry.register(
            Arc::new(bash::BashTool::with_timeout(Duration::from_secs(
                settings.bash_timeout_secs,
            ))),
            ToolSource::BuiltIn,
        );
    }

    registry
}

/// Register the file tools bound to `workspace`.
pub fn add_workspace_tools(registry: &mut ToolRegistry, workspace: &Path, settings: &ToolSettings) {
    if !settings.enable_file_tools {
        return;
    }
    registry.register(Arc::new(read::ReadFileTool::new(workspace)), ToolSource::Workspace);
    registry.register(Arc::new(write::WriteFileTool::new(workspace)), ToolSource::Workspace);
    registry.register(Arc::new(edit::EditFileTool::new(workspace)), ToolSource::Workspace);
}

pub(crate) fn resolve_path(file_path: &str, working_dir: &Path) -> PathBuf {
    let path = Path::new(file_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_tools_follow_settings() {
        let registry = base_tools(&ToolSettings::default());
        assert_eq!(registry.names(), vec!["bash", "calculator"]);

        let no_bash = ToolSettings {
            enable_bash: false,
            ..ToolSettings::default()
        };
        assert_eq!(base_tools(&no_bash).names(), vec!["calculator"]);
    }

    #[test]
    fn workspace_tools_are_tagged() {
        let mut registry = base_tools(&ToolSettings::default());
        add_workspace_tools(&mut registry, Path::new("/tmp/ws"), &ToolSettings::default());
        assert_eq!(
            registry.names(),
            vec!["bash", "calculator", "edit_file", "read_file", "write_file"]
        );
        assert_eq!(registry.source("read_file"), Some(&ToolSource::Workspace));
    }

    #[test]
    fn file_tools_can_be_disabled() {
        let settings = ToolSettings {
            enable_file_tools: false,
            ..ToolSettings::default()
        };
        let mut registry = ToolRegistry::new();
        add_workspace_tools(&mut registry, Path::new("/tmp/ws"), &settings);
        assert!(registry.is_empty());
    }

    #[test]
    fn relative_paths_join_workspace() {
        assert_eq!(
            resolve_path("a/b.txt", Path::new("/ws")),
            PathBuf::from("/ws/a/b.txt")
        );
        assert_eq!(resolve_path("/etc/hosts", Path::new("/ws")), PathBuf::from("/etc/hosts"));
    }
}
