//! Configuration
//!
//! Loaded from a TOML file; every section is optional and falls back to its
//! defaults. Environment variables override the file for deployment secrets
//! such as the prediction endpoint.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::capture::CaptureConfig;
use crate::error::Result;

/// Overrides `prediction.endpoint`
pub const ENV_PREDICTION_URL: &str = "KEYSTROKE_PREDICTION_URL";

/// Overrides `logging.level`
pub const ENV_LOG_LEVEL: &str = "KEYSTROKE_LOG";

/// Default prediction request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeystrokeConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub prediction: PredictionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KeystrokeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: KeystrokeConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing
    /// or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply [`ENV_PREDICTION_URL`] and [`ENV_LOG_LEVEL`] from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_PREDICTION_URL).filter(|v| !v.trim().is_empty()) {
            self.prediction.endpoint = Some(url);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            self.logging.level = level;
        }
    }
}

/// Prediction service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Service URL; verification is unavailable without it
    pub endpoint: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error (or a full filter directive)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::DEFAULT_EXCLUDED_KEYS;
    use crate::error::KeystrokeError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = KeystrokeConfig::default();
        assert_eq!(config.prediction.endpoint, None);
        assert_eq!(config.prediction.timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.capture.excluded_keys.len(), DEFAULT_EXCLUDED_KEYS.len());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: KeystrokeConfig = toml::from_str(
            r#"
            [capture]
            fields = ["username", "password"]

            [prediction]
            endpoint = "https://predict.example.com/v1"
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.fields, vec!["username", "password"]);
        assert_eq!(
            config.prediction.endpoint.as_deref(),
            Some("https://predict.example.com/v1")
        );
        assert_eq!(config.prediction.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("keystroke.toml");

        let mut config = KeystrokeConfig::default();
        config.capture.fields = vec!["password".to_string()];
        config.prediction.endpoint = Some("http://localhost:9000".to_string());
        config.save(&path).unwrap();

        let loaded = KeystrokeConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = KeystrokeConfig::load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(config, KeystrokeConfig::default());
    }

    #[test]
    fn test_load_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "capture = [[[").unwrap();

        let err = KeystrokeConfig::load(&path).unwrap_err();
        assert!(matches!(err, KeystrokeError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let mut config = KeystrokeConfig::default();
        config.apply_overrides(|name| match name {
            ENV_PREDICTION_URL => Some("http://override".to_string()),
            ENV_LOG_LEVEL => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(config.prediction.endpoint.as_deref(), Some("http://override"));
        assert_eq!(config.logging.level, "info");
    }
}
