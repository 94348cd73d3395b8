use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

const SKILL_FILE: &str = "SKILL.md";

/// A skill discovered on disk. Only its metadata goes into the system prompt.
#[derive(Clone, Debug, PartialEq)]
pub struct Skill {
    pub name: String,
    pub description: Option<String>,
    pub path: PathBuf,
}

/// Skills available to every session, keyed by name.
#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills: BTreeMap<String, Skill>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover `<dir>/<skill>/SKILL.md` and `<dir>/<skill>.md`.
    /// A missing directory yields an empty registry.
    pub fn load(dir: &Path) -> Self {
        let mut registry = Self::new();
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "skills directory not found");
            return registry;
        }
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to read skills directory");
                return registry;
            }
        };

        let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();

        for path in paths {
            let (file, fallback_name) = if path.is_dir() {
                (path.join(SKILL_FILE), path.file_name())
            } else if path.extension().is_some_and(|e| e == "md") {
                (path.clone(), path.file_stem())
            } else {
                continue;
            };
            let Some(fallback_name) = fallback_name.and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };
            if let Some(skill) = load_skill(&file, fallback_name) {
                registry.skills.insert(skill.name.clone(), skill);
            }
        }

        debug!(count = registry.count(), "skills loaded");
        registry
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    /// Skill names, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.skills.keys().map(|s| s.as_str()).collect()
    }

    pub fn count(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Block listing every skill, or `None` when there are none.
    pub fn metadata_prompt(&self) -> Option<String> {
        if self.skills.is_empty() {
            return None;
        }
        let mut out = String::from(
            "## Available Skills\n\nRead a skill's file for full instructions before using it.\n",
        );
        for skill in self.skills.values() {
            match &skill.description {
                Some(desc) => out.push_str(&format!("\n- `{}`: {desc}", skill.name)),
                None => out.push_str(&format!("\n- `{}`", skill.name)),
            }
        }
        Some(out)
    }
}

/// The session system prompt: the file at `path` when it exists, else the
/// default, followed by the skills block.
pub fn load_system_prompt(path: Option<&Path>, skills: &SkillRegistry) -> String {
    let base = match path {
        Some(p) if p.is_file() => match std::fs::read_to_string(p) {
            Ok(text) => text.trim_end().to_string(),
            Err(e) => {
                warn!(path = %p.display(), error = %e, "failed to read system prompt, using default");
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        },
        Some(p) => {
            debug!(path = %p.display(), "system prompt file not found, using default");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
        None => DEFAULT_SYSTEM_PROMPT.to_string(),
    };

    match skills.metadata_prompt() {
        Some(block) => format!("{base}\n\n{block}"),
        None => base,
    }
}

fn load_skill(path: &Path, fallback_name: String) -> Option<Skill> {
    let raw = std::fs::read_to_string(path).ok()?;
    let fm = parse_frontmatter(&raw);
    Some(Skill {
        name: fm.name.unwrap_or(fallback_name),
        description: fm.description,
        path: path.to_path_buf(),
    })
}

#[derive(Debug, Default, PartialEq)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
}

fn parse_frontmatter(raw: &str) -> Frontmatter {
    let mut fm = Frontmatter::default();
    // Leading blank lines and CRLF line endings are tolerated.
    let Some(after_start) = raw.trim_start().strip_prefix("---") else {
        return fm;
    };
    let Some(end) = after_start.find("\n---") else {
        return fm;
    };

    for line in after_start[..end].lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix("name:") {
            fm.name = non_empty(name);
        } else if let Some(desc) = line.strip_prefix("description:") {
            fm.description = non_empty(desc);
        }
    }
    fm
}

fn non_empty(value: &str) -> Option<String> {
    let v = value.trim().trim_matches('"').trim_matches('\'');
    (!v.is_empty()).then(|| v.to_string())
}
