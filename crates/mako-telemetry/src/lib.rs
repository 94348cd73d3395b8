use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by the RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "mako_llm" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown log level: {0}")]
    InvalidLevel(String),
    #[error("failed to install subscriber: {0}")]
    Init(String),
}

impl TelemetryConfig {
    pub fn with_level(level: &str) -> Result<Self, TelemetryError> {
        let log_level =
            Level::from_str(level).map_err(|_| TelemetryError::InvalidLevel(level.to_string()))?;
        Ok(Self {
            log_level,
            ..Self::default()
        })
    }

    /// Filter directive string: default level, then per-module overrides.
    pub fn directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

/// Initialize tracing. Call once at startup.
///
/// Output goes to stderr: stdout carries protocol frames.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directives()));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_include_module_overrides() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![("mako_llm".into(), Level::DEBUG)],
            json: true,
        };
        assert_eq!(config.directives(), "warn,mako_llm=debug");
    }

    #[test]
    fn with_level_parses_names() {
        let config = TelemetryConfig::with_level("debug").unwrap();
        assert_eq!(config.log_level, Level::DEBUG);
        assert!(!config.json);
    }

    #[test]
    fn with_level_rejects_garbage() {
        assert!(matches!(
            TelemetryConfig::with_level("loud"),
            Err(TelemetryError::InvalidLevel(_))
        ));
    }

    #[test]
    fn second_init_reports_error() {
        let config = TelemetryConfig::default();
        let _ = init_telemetry(&config);
        let second = init_telemetry(&config);
        assert!(second.is_err());
    }
}
