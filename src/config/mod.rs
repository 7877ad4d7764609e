//! # Engine Configuration
//!
//! Typed configuration for the batch engine, loaded in layers by
//! [`ConfigManager`]: built-in defaults, then an optional TOML/YAML/JSON file,
//! then `IMAGEBATCH__`-prefixed environment variables
//! (`IMAGEBATCH__ENGINE__SUB_TASK_TIMEOUT_SECONDS=600`).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use imagebatch_core::config::ConfigManager;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_path(Some(Path::new("config/imagebatch.toml")))?;
//! let parallelism = manager.config().engine.default_max_parallel_operations;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSettings,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.engine.validate()?;
        self.query.validate()?;
        self.logging.validate()
    }
}

/// Execution engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Directory holding one JSON document per operation
    pub storage_dir: PathBuf,
    /// Parallelism for requests that do not specify one
    pub default_max_parallel_operations: usize,
    /// Largest parallelism a request may ask for
    pub max_parallel_operations_limit: usize,
    /// Per-image executor timeout; 0 disables it
    pub sub_task_timeout_seconds: u64,
    pub writer_channel_capacity: usize,
    /// Fail the operation when a snapshot cannot be written
    pub fail_on_persistence_error: bool,
    /// Restart operations found interrupted by a previous process
    pub resume_interrupted_on_startup: bool,
    pub audit_timeout_ms: u64,
    pub notification_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("data/operations"),
            default_max_parallel_operations: 2,
            max_parallel_operations_limit: 16,
            sub_task_timeout_seconds: 3600,
            writer_channel_capacity: 64,
            fail_on_persistence_error: false,
            resume_interrupted_on_startup: false,
            audit_timeout_ms: 2000,
            notification_timeout_ms: 5000,
        }
    }
}

impl EngineSettings {
    pub fn sub_task_timeout(&self) -> Option<Duration> {
        (self.sub_task_timeout_seconds > 0).then(|| Duration::from_secs(self.sub_task_timeout_seconds))
    }

    pub fn audit_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_timeout_ms)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_parallel_operations_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.max_parallel_operations_limit",
                "0",
                "must be at least 1",
            ));
        }
        if self.default_max_parallel_operations == 0
            || self.default_max_parallel_operations > self.max_parallel_operations_limit
        {
            return Err(ConfigurationError::invalid_value(
                "engine.default_max_parallel_operations",
                self.default_max_parallel_operations.to_string(),
                format!(
                    "must be between 1 and max_parallel_operations_limit ({})",
                    self.max_parallel_operations_limit
                ),
            ));
        }
        if self.writer_channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.writer_channel_capacity",
                "0",
                "must be at least 1",
            ));
        }
        if self.storage_dir.as_os_str().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "engine.storage_dir",
                "",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

/// Listing defaults and bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl QueryConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_page_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "query.max_page_size",
                "0",
                "must be at least 1",
            ));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigurationError::invalid_value(
                "query.default_page_size",
                self.default_page_size.to_string(),
                format!("must be between 1 and max_page_size ({})", self.max_page_size),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.level.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "logging.level",
                "",
                "must not be empty",
            ));
        }
        Ok(())
    }
}
