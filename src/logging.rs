//! Tracing subscriber setup for the binary.

use std::io;

use serde::Deserialize;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

/// `[logging]` section. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl LoggingConfig {
    /// Install the global subscriber. Output goes to stderr; a second call is a no-op.
    pub fn init(&self) {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = match self.format.as_str() {
            "json" => fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .try_init(),
            _ => fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .with_target(false)
                .try_init(),
        };
    }

    pub(crate) fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if EnvFilter::try_new(&self.level).is_err() {
            problems.push(format!(
                "`logging.level` value `{}` is not a valid filter directive.",
                self.level
            ));
        }
        if !LOG_FORMATS.contains(&self.format.as_str()) {
            problems.push(format!(
                "`logging.format` must be one of {LOG_FORMATS:?}, got `{}`.",
                self.format
            ));
        }
        problems
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(LoggingConfig::default().problems().is_empty());
    }

    #[test]
    fn unknown_format_is_reported() {
        let config = LoggingConfig {
            format: "xml".into(),
            ..LoggingConfig::default()
        };
        let problems = config.problems();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("logging.format"));
    }

    #[test]
    fn directive_filters_are_accepted() {
        let config = LoggingConfig {
            level: "ingestd=debug,bollard=warn".into(),
            ..LoggingConfig::default()
        };
        assert!(config.problems().is_empty());
    }
}
