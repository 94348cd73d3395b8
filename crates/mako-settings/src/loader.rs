//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`MakoSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `MAKO_*` environment variable overrides (highest priority)
//! 4. Validate

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::MakoSettings;

/// Default settings file: `~/.mako/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".mako").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<MakoSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a file the caller named explicitly. Unlike the default
/// location, the file must exist.
pub fn load_settings_file(path: &Path) -> Result<MakoSettings> {
    if !path.is_file() {
        return Err(SettingsError::NotFound(path.to_path_buf()));
    }
    load_settings_from_path(path)
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<MakoSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<MakoSettings> {
    let defaults = serde_json::to_value(MakoSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key; arrays and primitives are replaced; nulls in
/// `source` are skipped.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides. Unparseable values are logged and ignored.
pub fn apply_env_overrides(settings: &mut MakoSettings) {
    if let Some(v) = read_env_string("MAKO_API_KEY") {
        settings.llm.api_key = v;
    }
    if let Some(v) = read_env_string("MAKO_API_BASE") {
        settings.llm.api_base = v;
    }
    if let Some(v) = read_env_string("MAKO_MODEL") {
        settings.llm.model = v;
    }
    if let Some(v) = read_env_bool("MAKO_OFFLINE") {
        settings.llm.offline = v;
    }
    if let Some(v) = read_env_u32("MAKO_MAX_STEPS", 1, 10_000) {
        settings.agent.max_steps = v;
    }
    if let Some(v) = read_env_string("MAKO_WORKSPACE") {
        settings.agent.workspace_dir = v;
    }
    if let Some(v) = read_env_string("MAKO_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Accepts (case-insensitive) `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
    }
    result
}
