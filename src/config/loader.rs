//! Configuration Loader
//!
//! Layers defaults, an optional file and environment overrides with the
//! `config` crate, then validates the merged result.

use super::error::{ConfigResult, ConfigurationError};
use super::EngineConfig;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Prefix for environment overrides, e.g. `IMAGEBATCH__QUERY__MAX_PAGE_SIZE`
pub const ENV_PREFIX: &str = "IMAGEBATCH";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: EngineConfig,
    source_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Defaults plus environment overrides
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_path(None)
    }

    /// Defaults, then `path` if given, then environment overrides
    pub fn load_from_path(path: Option<&Path>) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_environment(path, None)
    }

    /// Like [`Self::load_from_path`] with an explicit variable map standing in
    /// for the process environment
    pub fn load_with_environment(
        path: Option<&Path>,
        environment: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let defaults = Config::try_from(&EngineConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigurationError::FileNotFound(path.display().to_string()));
            }
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(environment),
        );

        let source_name = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        let config: EngineConfig = builder
            .build()
            .and_then(|merged| merged.try_deserialize())
            .map_err(|e| ConfigurationError::load_error(&source_name, e))?;

        config.validate()?;

        debug!(
            source = %source_name,
            storage_dir = %config.engine.storage_dir.display(),
            default_parallelism = config.engine.default_max_parallel_operations,
            "Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            source_file: path.map(Path::to_path_buf),
        }))
    }

    /// Wrap an already-built configuration after validating it
    pub fn from_config(config: EngineConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            source_file: None,
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use std::io::Write;

    fn no_env() -> Option<HashMap<String, String>> {
        Some(HashMap::new())
    }

    #[test]
    fn test_defaults_without_file() {
        let manager = ConfigManager::load_with_environment(None, no_env()).unwrap();
        assert_eq!(manager.config(), &EngineConfig::default());
        assert!(manager.source_file().is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[engine]\ndefault_max_parallel_operations = 4\nstorage_dir = \"/var/lib/imagebatch\"\n\n[logging]\nformat = \"json\""
        )
        .unwrap();

        let manager = ConfigManager::load_with_environment(Some(file.path()), no_env()).unwrap();
        let config = manager.config();
        assert_eq!(config.engine.default_max_parallel_operations, 4);
        assert_eq!(config.engine.storage_dir, PathBuf::from("/var/lib/imagebatch"));
        assert_eq!(config.logging.format, LogFormat::Json);
        // untouched keys keep their defaults
        assert_eq!(config.engine.max_parallel_operations_limit, 16);
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[engine]\nsub_task_timeout_seconds = 60").unwrap();

        let environment = HashMap::from([(
            "IMAGEBATCH__ENGINE__SUB_TASK_TIMEOUT_SECONDS".to_string(),
            "0".to_string(),
        )]);
        let manager =
            ConfigManager::load_with_environment(Some(file.path()), Some(environment)).unwrap();
        assert_eq!(manager.config().engine.sub_task_timeout_seconds, 0);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = ConfigManager::load_with_environment(
            Some(Path::new("/definitely/not/here.toml")),
            no_env(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::FileNotFound(_)));
    }

    #[test]
    fn test_invalid_merged_config_is_rejected() {
        let environment = HashMap::from([(
            "IMAGEBATCH__ENGINE__MAX_PARALLEL_OPERATIONS_LIMIT".to_string(),
            "1".to_string(),
        )]);
        let err = ConfigManager::load_with_environment(None, Some(environment)).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }
}
