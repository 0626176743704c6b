//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery,
//! environment detection, and merging of environment-specific overrides.

use super::error::{ConfigResult, ConfigurationError};
use super::OrchestratorConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_NAMES: [&str; 2] = ["speech-config.yaml", "speech-config.yml"];
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];

/// Loaded configuration plus the context it was loaded from
#[derive(Debug)]
pub struct ConfigManager {
    config: OrchestratorConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that must not touch process environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            max_retries = config.retry.max_retries,
            rate_limit_delay_ms = config.scheduler.rate_limit_delay_ms,
            probe_enabled = config.health.probe_enabled,
            "🔧 Speech configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (validated) without touching the filesystem
    pub fn from_config(config: OrchestratorConfig, environment: &str) -> ConfigResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with sensitive-looking fields masked
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::json!(self.config);
        Self::sanitize_json_recursive(&mut value, &["password", "secret", "key", "token"]);
        value
    }

    /// Detect current environment: SPEECH_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("SPEECH_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.exists() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    /// Read a configuration file with a size limit
    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "file_type",
                "directory or special file",
                "Configuration path must point to a regular file",
            ));
        }

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!("Configuration file exceeds {MAX_CONFIG_FILE_SIZE} bytes"),
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    /// Load the base file and apply the environment's override block
    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<OrchestratorConfig> {
        let config_file = Self::find_config_file(config_directory)?;
        let yaml_content = Self::read_config_file_safely(&config_file)?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!("Applying environment-specific overrides for: {}", environment);
            Self::merge_yaml_values(&mut yaml_data, env_overrides)?;
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
            map.remove(YamlValue::String(environment.to_string()));
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) -> ConfigResult<()> {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value)?;
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (YamlValue::Mapping(_), other) if !other.is_null() => {
                return Err(ConfigurationError::ConfigMergeError {
                    error: format!("cannot merge non-mapping override into a section: {other:?}"),
                });
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
        Ok(())
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    if sensitive_patterns.iter().any(|p| key_lower.contains(p)) {
                        *val = serde_json::Value::String("[MASKED]".to_string());
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_yaml() -> &'static str {
        r#"
cache:
  success_capacity: 50
  failure_capacity: 100
retry:
  max_retries: 3
  base_delay_ms: 1000
  max_delay_ms: 10000
health:
  probe_interval_ms: 30000
  max_consecutive_failures: 5
scheduler:
  rate_limit_delay_ms: 100

test:
  retry:
    max_retries: 1
    base_delay_ms: 10
    max_delay_ms: 50
  health:
    probe_enabled: false

production:
  cache:
    success_capacity: 200
"#
    }

    fn write_config(dir: &TempDir, contents: &str) {
        fs::write(dir.path().join("speech-config.yaml"), contents).unwrap();
    }

    #[test]
    fn test_environment_override_merges_nested_values() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, create_test_config_yaml());

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        let config = manager.config();

        assert_eq!(manager.environment(), "test");
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.base_delay_ms, 10);
        assert!(!config.health.probe_enabled);
        // Untouched by the override
        assert_eq!(config.health.max_consecutive_failures, 5);
        assert_eq!(config.cache.success_capacity, 50);
    }

    #[test]
    fn test_production_override() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, create_test_config_yaml());

        let manager = ConfigManager::load_from_directory_with_env(
            Some(dir.path().to_path_buf()),
            "production",
        )
        .unwrap();

        assert_eq!(manager.config().cache.success_capacity, 200);
        assert_eq!(manager.config().retry.max_retries, 3);
    }

    #[test]
    fn test_missing_file_reports_searched_paths() {
        let dir = TempDir::new().unwrap();
        let err =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap_err();

        match err {
            ConfigurationError::ConfigFileNotFound { searched_paths } => {
                assert_eq!(searched_paths.len(), 2);
            }
            other => panic!("Expected ConfigFileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            r#"
retry:
  base_delay_ms: 50000
  max_delay_ms: 10000
"#,
        );

        let err = ConfigManager::load_from_directory_with_env(
            Some(dir.path().to_path_buf()),
            "development",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }

    #[test]
    fn test_malformed_yaml() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "retry: [unclosed");

        let err = ConfigManager::load_from_directory_with_env(
            Some(dir.path().to_path_buf()),
            "development",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidYaml { .. }));
    }

    #[test]
    fn test_debug_config_is_json() {
        let manager =
            ConfigManager::from_config(OrchestratorConfig::default(), "development").unwrap();
        let json = manager.debug_config();
        assert_eq!(json["retry"]["max_retries"], 3);
        assert_eq!(json["voice"]["default_mood"], "neutral");
    }
}
