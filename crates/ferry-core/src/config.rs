//! Engine configuration types.

use std::fs;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::item::ConflictPolicy;

/// Configuration for the transfer engine.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Number of worker slots in the pool.
    #[builder(default = "6")]
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum number of queued requests (None = unbounded).
    #[builder(default)]
    #[serde(default)]
    pub max_backlog: Option<usize>,

    /// How long teardown waits for workers to exit, in milliseconds.
    #[builder(default = "5000")]
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Policy applied to every conflict without asking.
    #[builder(default)]
    #[serde(default)]
    pub default_policy: Option<ConflictPolicy>,

    /// Maximum number of undoable actions kept.
    #[builder(default = "100")]
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Stage trashed items here instead of the platform trash.
    #[builder(default)]
    #[serde(default)]
    pub trash_dir: Option<PathBuf>,
}

fn default_workers() -> usize {
    6
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

fn default_history_limit() -> usize {
    100
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.workers == Some(0) {
            return Err("workers must be at least 1".to_string());
        }
        if self.history_limit == Some(0) {
            return Err("history_limit must be at least 1".to_string());
        }
        if let Some(Some(0)) = self.max_backlog {
            return Err("max_backlog must be at least 1 when set".to_string());
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Create a new engine config builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Default location of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ferry").join("config.toml"))
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file at [`Self::default_path`], or defaults when it does not exist.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };
        if self.workers == 0 {
            return invalid("workers must be at least 1");
        }
        if self.history_limit == 0 {
            return invalid("history_limit must be at least 1");
        }
        if self.max_backlog == Some(0) {
            return invalid("max_backlog must be at least 1 when set");
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_backlog: None,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            default_policy: None,
            history_limit: default_history_limit(),
            trash_dir: None,
        }
    }
}
