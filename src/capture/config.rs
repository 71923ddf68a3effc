//! Capture configuration
//!
//! The exclusion list and the set of tracked fields are injected rather than
//! hardcoded so that every form (signup, login, free-text test) shares one
//! capture implementation.

use serde::{Deserialize, Serialize};

/// Keys that never produce key events (modifiers, navigation, function keys)
pub const DEFAULT_EXCLUDED_KEYS: &[&str] = &[
    "Shift",
    "Control",
    "Alt",
    "Meta",
    "Tab",
    "CapsLock",
    "Escape",
    "Enter",
    "ArrowUp",
    "ArrowDown",
    "ArrowLeft",
    "ArrowRight",
    "Home",
    "End",
    "PageUp",
    "PageDown",
    "F1",
    "F2",
    "F3",
    "F4",
    "F5",
    "F6",
    "F7",
    "F8",
    "F9",
    "F10",
    "F11",
    "F12",
];

/// Configuration for a capture session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Keys ignored on both press and release
    pub excluded_keys: Vec<String>,
    /// Fields registered up front, in this order
    pub fields: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            excluded_keys: DEFAULT_EXCLUDED_KEYS.iter().map(|k| k.to_string()).collect(),
            fields: Vec::new(),
        }
    }
}

impl CaptureConfig {
    /// Default exclusions with the given tracked fields
    pub fn with_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Replace the exclusion list
    pub fn excluding<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_excluded(&self, key: &str) -> bool {
        self.excluded_keys.iter().any(|k| k == key)
    }
}
