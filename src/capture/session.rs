//! Capture session state
//!
//! A `CaptureSession` owns the per-field event logs and start times for one
//! form-filling session. Events are delivered one at a time in arrival order,
//! so the session takes `&mut self` and needs no locking.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, trace};

use crate::capture::config::CaptureConfig;
use crate::features::round_to_decimal;
use crate::types::{FieldLogs, KeyEvent};

/// Decimal places kept for relative key times
const RELATIVE_TIME_DECIMALS: u32 = 6;

/// Why a key signal left the session unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Key is on the exclusion list
    ExcludedKey,
    /// The field was not focused when the key went down
    Unfocused,
    /// The key already has an open press in this field (key repeat)
    DuplicatePress,
    /// No open press for this key in this field
    NoOpenPress,
}

/// Result of feeding one key signal into the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A new press was appended
    Recorded,
    /// The field had been cleared: its log was reset, then the press appended
    ResetAndRecorded,
    /// An open press was closed
    Released,
    /// Nothing changed
    Ignored(IgnoreReason),
}

impl CaptureOutcome {
    /// Whether the signal changed the session
    pub fn is_accepted(&self) -> bool {
        !matches!(self, CaptureOutcome::Ignored(_))
    }
}

/// Per-field keystroke capture state
#[derive(Debug, Clone)]
pub struct CaptureSession {
    config: CaptureConfig,
    logs: FieldLogs,
    /// Absolute start time per field; 0 means unset
    start_times: HashMap<String, i64>,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new(CaptureConfig::default())
    }
}

impl CaptureSession {
    /// Create a session with the configured fields registered, empty and unstarted
    pub fn new(config: CaptureConfig) -> Self {
        let mut logs = FieldLogs::new();
        let mut start_times = HashMap::new();
        for field in &config.fields {
            logs.insert(field.clone(), Vec::new());
            start_times.insert(field.clone(), 0);
        }

        Self {
            config,
            logs,
            start_times,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Handle a key press on `field` at absolute time `now_ms`.
    ///
    /// `is_focused` tells whether `field` is the currently focused input and
    /// `field_is_empty` whether its current value is empty. Never fails;
    /// rejected presses are reported as [`CaptureOutcome::Ignored`].
    pub fn key_down(
        &mut self,
        key: &str,
        field: &str,
        now_ms: i64,
        is_focused: bool,
        field_is_empty: bool,
    ) -> CaptureOutcome {
        if self.config.is_excluded(key) {
            trace!(key, field, "Excluded key press ignored");
            return CaptureOutcome::Ignored(IgnoreReason::ExcludedKey);
        }

        if !is_focused {
            trace!(key, field, "Press on unfocused field ignored");
            return CaptureOutcome::Ignored(IgnoreReason::Unfocused);
        }

        let log = self.logs.entry(field);
        let start = self.start_times.entry(field.to_string()).or_insert(0);

        let mut reset = false;
        if field_is_empty && !log.is_empty() {
            debug!(field, discarded = log.len(), "Field cleared, restarting capture");
            log.clear();
            *start = now_ms;
            reset = true;
        }

        if log.iter().any(|event| event.key == key && event.is_open()) {
            trace!(key, field, "Repeated press suppressed");
            return CaptureOutcome::Ignored(IgnoreReason::DuplicatePress);
        }

        if *start == 0 {
            *start = now_ms;
        }

        let key_down_time = relative_seconds(now_ms, *start);
        log.push(KeyEvent::pressed(key, key_down_time, now_ms));

        if reset {
            CaptureOutcome::ResetAndRecorded
        } else {
            CaptureOutcome::Recorded
        }
    }

    /// Handle a key release on `field` at absolute time `now_ms`.
    ///
    /// Closes the most recent open press of `key`. Focus is not checked:
    /// a release after focus moved away still completes the press.
    pub fn key_up(&mut self, key: &str, field: &str, now_ms: i64) -> CaptureOutcome {
        if self.config.is_excluded(key) {
            trace!(key, field, "Excluded key release ignored");
            return CaptureOutcome::Ignored(IgnoreReason::ExcludedKey);
        }

        let open = self
            .logs
            .get_mut(field)
            .and_then(|log| log.iter_mut().rev().find(|e| e.key == key && e.is_open()));

        let Some(event) = open else {
            trace!(key, field, "Release without open press ignored");
            return CaptureOutcome::Ignored(IgnoreReason::NoOpenPress);
        };

        let start = self.start_times.get(field).copied().unwrap_or(0);
        let key_up_time = relative_seconds(now_ms, start);

        event.key_up_time = Some(key_up_time);
        event.key_up_timestamp = Some(now_ms);
        event.duration_in_seconds = event
            .key_down_time
            .map(|down| round_to_decimal(key_up_time - down, RELATIVE_TIME_DECIMALS));

        CaptureOutcome::Released
    }

    /// [`key_down`](Self::key_down) stamped with the current wall-clock time
    pub fn key_down_now(
        &mut self,
        key: &str,
        field: &str,
        is_focused: bool,
        field_is_empty: bool,
    ) -> CaptureOutcome {
        self.key_down(key, field, now_millis(), is_focused, field_is_empty)
    }

    /// [`key_up`](Self::key_up) stamped with the current wall-clock time
    pub fn key_up_now(&mut self, key: &str, field: &str) -> CaptureOutcome {
        self.key_up(key, field, now_millis())
    }

    /// Event log of a field (empty if the field was never seen)
    pub fn log(&self, field: &str) -> &[KeyEvent] {
        self.logs.get(field).unwrap_or(&[])
    }

    pub fn logs(&self) -> &FieldLogs {
        &self.logs
    }

    /// Start time of a field, if capture has started for it
    pub fn start_time(&self, field: &str) -> Option<i64> {
        self.start_times.get(field).copied().filter(|&t| t != 0)
    }

    /// Presses in `field` still waiting for their release
    pub fn open_presses(&self, field: &str) -> usize {
        self.log(field).iter().filter(|e| e.is_open()).count()
    }

    /// End capture and hand over the frozen logs
    pub fn finish(self) -> FieldLogs {
        debug!(
            fields = self.logs.len(),
            events = self.logs.total_events(),
            "Capture finished"
        );
        self.logs
    }
}

fn relative_seconds(now_ms: i64, start_ms: i64) -> f64 {
    round_to_decimal(now_ms.saturating_sub(start_ms) as f64 / 1000.0, RELATIVE_TIME_DECIMALS)
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
