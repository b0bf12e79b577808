//! Configuration management for Hostwatch
//!
//! Settings come from an optional TOML/JSON/YAML file layered under
//! `HOSTWATCH__SECTION__KEY` environment variables, e.g.
//! `HOSTWATCH__AGENT__TICK_INTERVAL=500ms`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::collector::DEFAULT_TOP_K;
use crate::error::{Error, Result};
use crate::log_sink::DEFAULT_CAPACITY;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "HOSTWATCH";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Poll loop configuration
    pub agent: AgentSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Poll loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Time between tick starts
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Number of memory-heaviest processes tracked
    pub top_k: usize,
    /// Rule definitions file
    pub rules_path: PathBuf,
    /// Reload when the rules file changes on disk
    pub watch_rules: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            top_k: DEFAULT_TOP_K,
            rules_path: default_rules_path(),
            watch_rules: false,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter, overridden by `RUST_LOG`
    pub level: String,
    /// Log format (json or pretty)
    pub format: LogFormat,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
    /// Entries kept in the in-memory log history
    pub capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl AgentConfig {
    /// Load from an optional file plus the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Load from an optional file plus `env`, or the process environment when `None`
    fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.agent.tick_interval.is_zero() {
            return Err(Error::config("agent.tick_interval must be greater than zero"));
        }
        if self.agent.top_k == 0 {
            return Err(Error::config("agent.top_k must be at least 1"));
        }
        if self.logging.capacity == 0 {
            return Err(Error::config("logging.capacity must be at least 1"));
        }
        Ok(())
    }
}

/// `rules.json` in the platform config directory, or the working directory
pub fn default_rules_path() -> PathBuf {
    ProjectDirs::from("", "", "hostwatch")
        .map(|dirs| dirs.config_dir().join("rules.json"))
        .unwrap_or_else(|| PathBuf::from("rules.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::load_with_env(None, env(&[])).unwrap();

        assert_eq!(config.agent.tick_interval, Duration::from_secs(1));
        assert_eq!(config.agent.top_k, 5);
        assert!(config.agent.rules_path.ends_with("rules.json"));
        assert_eq!(config.logging.capacity, 50);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_file_with_env_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hostwatch.toml");
        fs::write(
            &path,
            "[agent]\ntick_interval = \"250ms\"\ntop_k = 3\nrules_path = \"/tmp/r.json\"\n\n[logging]\nformat = \"json\"\n",
        )
        .unwrap();

        let config =
            AgentConfig::load_with_env(Some(&path), env(&[("HOSTWATCH__AGENT__TOP_K", "8")])).unwrap();

        assert_eq!(config.agent.tick_interval, Duration::from_millis(250));
        assert_eq!(config.agent.top_k, 8);
        assert_eq!(config.agent.rules_path, PathBuf::from("/tmp/r.json"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let result = AgentConfig::load_with_env(Some(&dir.path().join("nope.toml")), env(&[]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = AgentConfig::load_with_env(None, env(&[("HOSTWATCH__AGENT__TICK_INTERVAL", "0s")]));
        assert!(result.is_err());
    }
}
