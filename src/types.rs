//! Core keystroke data types
//!
//! These types flow through the pipeline: key events are accumulated per field
//! by the capture session, frozen into [`FieldLogs`], and turned into a flat
//! table of [`ProcessedRow`]s by feature extraction.
//!
//! Field names on the wire are camelCase because the captured logs and the
//! feature table are exchanged with a browser front end and an external
//! prediction service that already speak that format.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// One observed key interaction for a field.
///
/// A release is recorded on the same event, so `key_up_time`,
/// `key_up_timestamp` and `duration_in_seconds` stay `None` while the key is
/// held down.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEvent {
    /// Logical key identifier as delivered by the input device
    #[serde(default, deserialize_with = "lenient::key")]
    pub key: String,
    /// Seconds since the field's start time (6 decimals)
    #[serde(default, deserialize_with = "lenient::seconds")]
    pub key_down_time: Option<f64>,
    /// Seconds since the field's start time (6 decimals)
    #[serde(default, deserialize_with = "lenient::seconds")]
    pub key_up_time: Option<f64>,
    /// Absolute press time, milliseconds since epoch
    #[serde(default, deserialize_with = "lenient::millis")]
    pub key_down_timestamp: Option<i64>,
    /// Absolute release time, milliseconds since epoch
    #[serde(default, deserialize_with = "lenient::millis")]
    pub key_up_timestamp: Option<i64>,
    /// `key_up_time - key_down_time` (6 decimals)
    #[serde(default, deserialize_with = "lenient::seconds")]
    pub duration_in_seconds: Option<f64>,
}

impl KeyEvent {
    /// Create an event for a key that has just been pressed
    pub fn pressed(key: impl Into<String>, key_down_time: f64, key_down_timestamp: i64) -> Self {
        Self {
            key: key.into(),
            key_down_time: Some(key_down_time),
            key_up_time: None,
            key_down_timestamp: Some(key_down_timestamp),
            key_up_timestamp: None,
            duration_in_seconds: None,
        }
    }

    /// Whether the key is still held (no release recorded yet)
    pub fn is_open(&self) -> bool {
        self.key_up_time.is_none()
    }
}

/// One row of the digraph feature table.
///
/// Each row describes a pair of temporally adjacent key events from the same
/// field. All timings are in seconds rounded to 3 decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRow {
    /// Dwell time of the first key
    #[serde(rename = "keydownTime")]
    pub keydown_time: Option<f64>,
    /// Release of the first key to press of the second (flight time)
    #[serde(rename = "UD")]
    pub ud: Option<f64>,
    /// Press to press
    #[serde(rename = "DD")]
    pub dd: Option<f64>,
    /// Press of the first key to release of the second
    #[serde(rename = "DU")]
    pub du: Option<f64>,
    /// Release to release
    #[serde(rename = "UU")]
    pub uu: Option<f64>,
    /// 1-based position of the pair within its field
    pub iteration: u32,
    pub key1: String,
    pub key2: Option<String>,
}

/// Insertion-ordered mapping of field identifier to its event log.
///
/// Order matters: feature rows are emitted field by field in the order the
/// fields were first registered (or appeared in the input document).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldLogs {
    entries: Vec<(String, Vec<KeyEvent>)>,
}

impl FieldLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of key events across all fields
    pub fn total_events(&self) -> usize {
        self.entries.iter().map(|(_, events)| events.len()).sum()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.position(field).is_some()
    }

    /// Event log for a field, if the field is registered
    pub fn get(&self, field: &str) -> Option<&[KeyEvent]> {
        self.position(field).map(|idx| self.entries[idx].1.as_slice())
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Vec<KeyEvent>> {
        let idx = self.position(field)?;
        Some(&mut self.entries[idx].1)
    }

    /// Event log for a field, registering an empty one at the end if absent
    pub fn entry(&mut self, field: &str) -> &mut Vec<KeyEvent> {
        let idx = match self.position(field) {
            Some(idx) => idx,
            None => {
                self.entries.push((field.to_string(), Vec::new()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    /// Set a field's log. An existing field keeps its position.
    pub fn insert(&mut self, field: impl Into<String>, events: Vec<KeyEvent>) {
        let field = field.into();
        match self.position(&field) {
            Some(idx) => self.entries[idx].1 = events,
            None => self.entries.push((field, events)),
        }
    }

    /// Iterate over `(field, events)` in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[KeyEvent])> {
        self.entries
            .iter()
            .map(|(field, events)| (field.as_str(), events.as_slice()))
    }

    /// Field identifiers in insertion order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(field, _)| field.as_str())
    }

    fn position(&self, field: &str) -> Option<usize> {
        self.entries.iter().position(|(name, _)| name == field)
    }
}

impl FromIterator<(String, Vec<KeyEvent>)> for FieldLogs {
    fn from_iter<I: IntoIterator<Item = (String, Vec<KeyEvent>)>>(iter: I) -> Self {
        let mut logs = FieldLogs::new();
        for (field, events) in iter {
            logs.insert(field, events);
        }
        logs
    }
}

impl Serialize for FieldLogs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (field, events) in &self.entries {
            map.serialize_entry(field, events)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldLogs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldLogsVisitor;

        impl<'de> Visitor<'de> for FieldLogsVisitor {
            type Value = FieldLogs;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping field identifiers to key event arrays")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldLogs, A::Error> {
                let mut logs = FieldLogs::new();
                while let Some((field, value)) = access.next_entry::<String, Value>()? {
                    logs.insert(field, lenient::events(value));
                }
                Ok(logs)
            }
        }

        deserializer.deserialize_map(FieldLogsVisitor)
    }
}

/// Tolerant decoding for captured key data.
///
/// Browser captures are noisy; anything that does not look like a usable
/// value decodes to `None` instead of failing the whole document.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::KeyEvent;

    pub(super) fn key<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            _ => String::new(),
        })
    }

    pub(super) fn seconds<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64(),
            _ => None,
        })
    }

    pub(super) fn millis<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|v| v.trunc() as i64)),
            _ => None,
        })
    }

    /// A non-array log is empty; a non-object entry is an all-null event.
    pub(super) fn events(value: Value) -> Vec<KeyEvent> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| serde_json::from_value(item).unwrap_or_default())
                .collect(),
            _ => Vec::new(),
        }
    }
}
