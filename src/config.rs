//! Configuration management for Utility Costs
//!
//! This module handles loading, validation, and management of the service
//! configuration from YAML files. Configured providers are not part of this
//! file; they live in the entry store referenced by `entries_file`.

use crate::error::{Result, UtilityCostsError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "UTILITY_COSTS_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,

    /// Refresh interval and request timeouts
    pub polling: PollingConfig,

    /// Setup wizard defaults
    pub setup: SetupConfig,

    /// Path of the JSON file holding configured providers
    pub entries_file: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional override for console output
    pub console_level: Option<String>,

    /// Optional override for file output
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rolling files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

/// Polling configuration shared by every coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between refreshes
    pub interval_seconds: u64,

    /// Timeout for steady-state rate fetches
    pub request_timeout_seconds: u64,

    /// Timeout for discovery and validation calls made by the setup wizard
    pub validation_timeout_seconds: u64,
}

/// Setup wizard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct SetupConfig {
    /// API URL pre-filled in the first wizard step
    pub default_api_url: String,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_seconds)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the environment override or default locations
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            let path = Path::new(&path);
            if !path.exists() {
                return Err(UtilityCostsError::config(format!(
                    "{} points to missing file {}",
                    CONFIG_PATH_ENV,
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        let default_paths = [
            "utility_costs.yaml",
            "/data/utility_costs.yaml",
            "/etc/utility-costs/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_seconds == 0 {
            return Err(UtilityCostsError::validation(
                "polling.interval_seconds",
                "Must be greater than 0",
            ));
        }

        if self.polling.request_timeout_seconds == 0 {
            return Err(UtilityCostsError::validation(
                "polling.request_timeout_seconds",
                "Must be greater than 0",
            ));
        }

        if self.polling.validation_timeout_seconds == 0 {
            return Err(UtilityCostsError::validation(
                "polling.validation_timeout_seconds",
                "Must be greater than 0",
            ));
        }

        if self.web.port == 0 {
            return Err(UtilityCostsError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        if self.entries_file.trim().is_empty() {
            return Err(UtilityCostsError::validation(
                "entries_file",
                "Path cannot be empty",
            ));
        }

        crate::logging::parse_log_level(&self.logging.level)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.polling.interval_seconds, 900);
        assert_eq!(config.polling.request_timeout_seconds, 30);
        assert_eq!(config.polling.validation_timeout_seconds, 10);
        assert_eq!(config.web.port, 8089);
        assert_eq!(config.setup.default_api_url, "https://rates.bherville.com");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.polling.interval_seconds = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.web.port = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.logging.level = "chatty".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "polling:\n  interval_seconds: 60\nweb:\n  port: 9000\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.polling.interval_seconds, 60);
        assert_eq!(config.polling.request_timeout_seconds, 30);
        assert_eq!(config.web.port, 9000);
        assert_eq!(config.web.host, "127.0.0.1");
        assert!(!config.entries_file.is_empty());
    }
}
