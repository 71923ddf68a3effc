//! keystroke.signal.v1 schema definition
//!
//! One record per real keyboard interaction, in arrival order. A recorded
//! stream of these signals can be replayed through a capture session to
//! reproduce the per-field key event logs offline.

use serde::{Deserialize, Serialize};

/// Current schema version
pub const SCHEMA_VERSION: &str = "keystroke.signal.v1";

/// Press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySignalType {
    Down,
    Up,
}

/// A single key interaction on a named field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeySignal {
    /// Logical key identifier ("a", "Shift", "Backspace", ...)
    pub key: String,
    /// Field identifier the event targets
    pub field: String,
    /// Press or release
    pub event_type: KeySignalType,
    /// Absolute capture time, milliseconds since epoch
    pub timestamp: i64,
    /// Whether the target field had focus
    #[serde(default = "default_focused")]
    pub focused: bool,
    /// Whether the target field's value was empty when the key went down
    #[serde(default)]
    pub field_empty: bool,
}

fn default_focused() -> bool {
    true
}

impl KeySignal {
    /// A press on a focused field
    pub fn down(key: impl Into<String>, field: impl Into<String>, timestamp: i64) -> Self {
        Self {
            key: key.into(),
            field: field.into(),
            event_type: KeySignalType::Down,
            timestamp,
            focused: true,
            field_empty: false,
        }
    }

    /// A release
    pub fn up(key: impl Into<String>, field: impl Into<String>, timestamp: i64) -> Self {
        Self {
            key: key.into(),
            field: field.into(),
            event_type: KeySignalType::Up,
            timestamp,
            focused: true,
            field_empty: false,
        }
    }

    /// Mark the target field as empty at press time
    pub fn on_empty_field(mut self) -> Self {
        self.field_empty = true;
        self
    }

    /// Mark the target field as not focused
    pub fn unfocused(mut self) -> Self {
        self.focused = false;
        self
    }

    /// Validate the signal
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.key.is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        if self.field.trim().is_empty() {
            return Err(ValidationError::EmptyField);
        }
        if self.timestamp <= 0 {
            return Err(ValidationError::NonPositiveTimestamp(self.timestamp));
        }
        Ok(())
    }
}

/// Validation errors for key signals
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Key is empty")]
    EmptyKey,

    #[error("Field identifier is empty")]
    EmptyField,

    #[error("Timestamp must be positive epoch milliseconds, got {0}")]
    NonPositiveTimestamp(i64),
}
