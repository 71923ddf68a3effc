//! Error types for Keystroke Flux
//!
//! Capture, feature extraction and consensus scoring never fail: noisy input
//! degrades to ignored events or null metrics. Errors only surface at the
//! boundaries (parsing, configuration, the prediction service transport).

use thiserror::Error;

/// Errors that can occur at the edges of the keystroke pipeline
#[derive(Debug, Error)]
pub enum KeystrokeError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Prediction service error: {0}")]
    Prediction(String),

    #[error("No prediction endpoint configured")]
    MissingEndpoint,

    #[error("Invalid key signal: {0}")]
    InvalidSignal(String),
}

impl From<toml::de::Error> for KeystrokeError {
    fn from(err: toml::de::Error) -> Self {
        KeystrokeError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for KeystrokeError {
    fn from(err: toml::ser::Error) -> Self {
        KeystrokeError::Config(err.to_string())
    }
}

/// A specialized `Result` type for Keystroke Flux operations.
pub type Result<T> = std::result::Result<T, KeystrokeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KeystrokeError::Prediction("status 502".to_string());
        assert_eq!(err.to_string(), "Prediction service error: status 502");
        assert_eq!(
            KeystrokeError::MissingEndpoint.to_string(),
            "No prediction endpoint configured"
        );
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let converted: KeystrokeError = err.unwrap_err().into();
        assert!(matches!(converted, KeystrokeError::JsonError(_)));
    }

    #[test]
    fn test_error_from_toml() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let converted: KeystrokeError = err.unwrap_err().into();
        assert!(matches!(converted, KeystrokeError::Config(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let converted: KeystrokeError = io_err.into();
        assert!(converted.to_string().starts_with("I/O error:"));
    }
}
