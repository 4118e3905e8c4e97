//! Configuration handling for gantt
//!
//! Configuration is a single TOML file. It is looked up from `--config`,
//! then `$GANTT_CONFIG`, then `config.toml` in the user config directory
//! (`~/.config/gantt-graph/` on Linux). A missing file means defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{PropagationLimits, DEFAULT_MAX_STEPS};

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "GANTT_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Propagation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PropagationConfig {
    /// Jobs one propagation wave may run before it is abandoned
    pub max_steps: usize,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format (text or json)
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Log filter used when neither flags nor `GANTT_LOG` set one
    pub level: Option<String>,
}

/// Combined configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub propagation: PropagationConfig,
    pub output: OutputConfig,
    pub log: LogConfig,
}

impl Config {
    /// Loads configuration, preferring `explicit` over the environment and
    /// the user config directory
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }

        match Self::user_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Reads and validates a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to load config: {}", path.display()))?;
        Ok(config)
    }

    /// Parses and validates TOML config text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.propagation.max_steps == 0 {
            return Err(ConfigError::Invalid(
                "propagation.max_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the user config directory
    pub fn user_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "gantt", "gantt-graph").map(|dirs| dirs.config_dir().to_path_buf())
    }

    fn user_config_path() -> Option<PathBuf> {
        Self::user_config_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn limits(&self) -> PropagationLimits {
        PropagationLimits {
            max_steps: self.propagation.max_steps,
        }
    }
}
