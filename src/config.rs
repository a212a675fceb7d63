//! # Pressroom Configuration System
//!
//! Explicit, validated configuration loading: an optional YAML file under
//! `config/` plus `PRESSROOM_*` environment overrides, deserialized into
//! typed sections with explicit defaults. No silent hardcoded fallbacks
//! beyond the documented `Default` impls.

use std::path::PathBuf;

use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::report::ReportConfig;
use crate::retry::RetryConfig;

/// Root configuration for the resilience core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PressroomConfig {
    /// Backoff and retry bounds
    pub retry: RetryConfig,
    /// Report output locations and recommendation thresholds
    pub report: ReportConfig,
    /// Structured logging settings
    pub logging: LoggingConfig,
}

/// Structured logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for JSON log files
    pub log_dir: PathBuf,
    /// Explicit level filter; falls back to the environment default
    pub level: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("log"),
            level: None,
        }
    }
}

/// Loads and holds the effective configuration for one process
pub struct ConfigManager {
    config: PressroomConfig,
    environment: String,
}

impl ConfigManager {
    /// Load configuration for the detected environment
    ///
    /// Sources, later ones overriding earlier: `config/pressroom.yaml`,
    /// `config/pressroom.{environment}.yaml`, then `PRESSROOM_*` environment
    /// variables (`__` separates nesting, e.g. `PRESSROOM_RETRY__MAX_RETRIES`).
    pub fn load() -> Result<Self> {
        let environment = detect_environment();
        let settings = Config::builder()
            .add_source(File::with_name("config/pressroom").required(false))
            .add_source(
                File::with_name(&format!("config/pressroom.{environment}")).required(false),
            )
            .add_source(Environment::with_prefix("PRESSROOM").separator("__"))
            .build()
            .map_err(|e| CoreError::configuration("loader", e.to_string()))?;

        let config: PressroomConfig = settings
            .try_deserialize()
            .map_err(|e| CoreError::configuration("deserialize", e.to_string()))?;

        Ok(Self {
            config,
            environment,
        })
    }

    pub fn config(&self) -> &PressroomConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }
}

/// Detect the current environment from environment variables
pub fn detect_environment() -> String {
    std::env::var("PRESSROOM_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = PressroomConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.retry.max_delay_ms, 30_000);
        assert_eq!(config.report.min_success_rate, 0.95);
        assert_eq!(config.report.max_workflow_duration_secs, 1800);
        assert_eq!(config.logging.log_dir, PathBuf::from("log"));
    }

    #[test]
    fn test_config_deserializes_partial_document() {
        let parsed: PressroomConfig =
            serde_json::from_str(r#"{"retry": {"max_retries": 5}}"#).unwrap();
        assert_eq!(parsed.retry.max_retries, 5);
        // Unspecified sections keep their defaults
        assert_eq!(parsed.retry.base_delay_ms, 1000);
        assert_eq!(parsed.report.min_success_rate, 0.95);
    }

    #[test]
    fn test_environment_detection_default() {
        if std::env::var("PRESSROOM_ENV").is_err() && std::env::var("APP_ENV").is_err() {
            assert_eq!(detect_environment(), "development");
        }
    }
}
