use anyhow::Context as _;
use moonraker::MoonrakerClient;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    num::NonZeroU64,
    path::{Path, PathBuf},
    time::Duration,
};
use utilities::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found at {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read configuration file: {source}")]
    ReadError { source: std::io::Error },

    #[error("Failed to parse configuration: {source}")]
    ParseError { source: toml::de::Error },

    #[error("Failed to serialize configuration: {source}")]
    SerializeError { source: toml::ser::Error },

    #[error("Failed to write configuration file: {source}")]
    WriteError { source: std::io::Error },

    #[error("Configuration validation failed: {message}")]
    ValidationError { message: String },
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write daily-rotated log files here when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    pub json: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MotionMinderConfig {
    pub endpoint: String,
    pub namespace: String,
    pub persist_interval: u64,
    pub poll_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub reset_position_on_unhome: bool,
    pub logging: LoggingConfig,
}

impl Default for MotionMinderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("http://127.0.0.1:7125"),
            namespace: String::from("motion_minder"),
            persist_interval: 20,
            poll_interval_ms: 2000,
            reconnect_delay_ms: 5000,
            reset_position_on_unhome: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl MotionMinderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::ValidationError { message });

        if self.persist_interval == 0 {
            return invalid("persist_interval must be at least 1".to_string());
        }
        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be at least 1".to_string());
        }
        if self.namespace.is_empty() {
            return invalid("namespace must not be empty".to_string());
        }
        if let Err(e) = MoonrakerClient::new(&self.endpoint) {
            return invalid(format!("endpoint '{}': {}", self.endpoint, e));
        }

        Ok(())
    }

    pub fn persist_interval(&self) -> Result<NonZeroU64, ConfigError> {
        NonZeroU64::new(self.persist_interval).ok_or_else(|| ConfigError::ValidationError {
            message: "persist_interval must be at least 1".to_string(),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_millis(self.reconnect_delay_ms))
    }
}

#[derive(Debug)]
pub struct ConfigOptions {
    pub config_path: PathBuf,
    pub create_if_missing: bool,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            create_if_missing: false,
        }
    }
}

impl ConfigOptions {
    pub fn default_config_path() -> PathBuf {
        std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("motion_minder.toml"))
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct ConfigManager {
    options: ConfigOptions,
}

impl ConfigManager {
    pub fn with_options(options: ConfigOptions) -> Self {
        Self { options }
    }

    pub fn path(&self) -> &Path {
        &self.options.config_path
    }

    pub fn load(&self) -> anyhow::Result<MotionMinderConfig> {
        let config_path = &self.options.config_path;

        if !config_path.exists() {
            if self.options.create_if_missing {
                let default_config = MotionMinderConfig::default();
                self.save(&default_config)
                    .context("Failed to save default config")?;
                return Ok(default_config);
            } else {
                return Err(ConfigError::FileNotFound {
                    path: config_path.clone(),
                }
                .into());
            }
        }

        let content =
            fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError { source: e })?;

        let config: MotionMinderConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError { source: e })?;

        Ok(config)
    }

    pub fn save(&self, config: &MotionMinderConfig) -> anyhow::Result<()> {
        let config_path = &self.options.config_path;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError { source: e })?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::SerializeError { source: e })?;

        fs::write(config_path, content).map_err(|e| ConfigError::WriteError { source: e })?;

        Ok(())
    }
}

pub fn init_config_with_options(
    options: ConfigOptions,
) -> anyhow::Result<(ConfigManager, MotionMinderConfig)> {
    let manager = ConfigManager::with_options(options);
    let config = manager.load()?;
    Ok((manager, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MotionMinderConfig::default();

        config.validate().unwrap();
        assert_eq!(config.persist_interval().unwrap().get(), 20);
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.reconnect_policy().delay, Duration::from_secs(5));
        assert_eq!(config.reconnect_policy().max_retries, None);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("motion_minder.toml");

        let options = ConfigOptions {
            config_path: path.clone(),
            create_if_missing: true,
        };

        let (_manager, config) = init_config_with_options(options).unwrap();

        assert_eq!(config, MotionMinderConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn missing_file_without_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let options = ConfigOptions::with_path(dir.path().join("absent.toml"));

        let err = ConfigManager::with_options(options).load().unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motion_minder.toml");
        fs::write(
            &path,
            "endpoint = \"http://printer.local:7125\"\npersist_interval = 50\n\n[logging]\njson = true\n",
        )
        .unwrap();

        let config = ConfigManager::with_options(ConfigOptions::with_path(&path))
            .load()
            .unwrap();

        assert_eq!(config.endpoint, "http://printer.local:7125");
        assert_eq!(config.persist_interval, 50);
        assert_eq!(config.namespace, "motion_minder");
        assert!(config.logging.json);
        assert!(!config.reset_position_on_unhome);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motion_minder.toml");
        fs::write(&path, "persist_interval = \"often\"").unwrap();

        let err = ConfigManager::with_options(ConfigOptions::with_path(&path))
            .load()
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn rejects_invalid_values() {
        let zero_interval = MotionMinderConfig {
            persist_interval: 0,
            ..Default::default()
        };
        assert!(zero_interval.validate().is_err());
        assert!(zero_interval.persist_interval().is_err());

        let bad_endpoint = MotionMinderConfig {
            endpoint: "printer.local".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            bad_endpoint.validate(),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motion_minder.toml");
        let config = MotionMinderConfig {
            namespace: "shop_printer".to_string(),
            reset_position_on_unhome: true,
            ..Default::default()
        };
        let manager = ConfigManager::with_options(ConfigOptions::with_path(&path));

        manager.save(&config).unwrap();

        assert_eq!(manager.load().unwrap(), config);
    }
}
