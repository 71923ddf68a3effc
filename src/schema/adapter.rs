//! Adapter for key signal streams
//!
//! Parses recorded signal streams and replays them through a
//! [`CaptureSession`], producing the same per-field logs the live capture
//! would have produced.

use serde::Serialize;
use tracing::debug;

use crate::capture::{CaptureOutcome, CaptureSession, IgnoreReason};
use crate::error::KeystrokeError;
use crate::schema::key_signal::{KeySignal, KeySignalType, ValidationError};

/// Adapter for parsing and replaying key signals
pub struct KeySignalAdapter;

impl KeySignalAdapter {
    /// Parse a JSON string containing an array of KeySignals
    pub fn parse_array(json: &str) -> Result<Vec<KeySignal>, KeystrokeError> {
        let signals: Vec<KeySignal> = serde_json::from_str(json)?;
        Ok(signals)
    }

    /// Parse NDJSON (newline-delimited JSON) containing KeySignals
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<KeySignal>, KeystrokeError> {
        let mut signals = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<KeySignal>(trimmed) {
                Ok(signal) => signals.push(signal),
                Err(e) => {
                    return Err(KeystrokeError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(signals)
    }

    /// Validate a batch of signals, returning only the failures
    pub fn validate_signals(signals: &[KeySignal]) -> Vec<ValidationResult> {
        signals
            .iter()
            .enumerate()
            .filter_map(|(index, signal)| {
                signal.validate().err().map(|error| ValidationResult {
                    index,
                    field: signal.field.clone(),
                    error,
                })
            })
            .collect()
    }

    /// Fail on the first invalid signal
    pub fn ensure_valid(signals: &[KeySignal]) -> Result<(), KeystrokeError> {
        match Self::validate_signals(signals).into_iter().next() {
            Some(failure) => Err(KeystrokeError::InvalidSignal(format!(
                "signal {} on field {:?}: {}",
                failure.index, failure.field, failure.error
            ))),
            None => Ok(()),
        }
    }

    /// Feed signals into the session in order.
    ///
    /// Replay never fails: signals the capture rules reject are counted in
    /// the returned stats and otherwise ignored.
    pub fn replay(signals: &[KeySignal], session: &mut CaptureSession) -> ReplayStats {
        let mut stats = ReplayStats::default();

        for signal in signals {
            let outcome = match signal.event_type {
                KeySignalType::Down => session.key_down(
                    &signal.key,
                    &signal.field,
                    signal.timestamp,
                    signal.focused,
                    signal.field_empty,
                ),
                KeySignalType::Up => session.key_up(&signal.key, &signal.field, signal.timestamp),
            };
            stats.record(outcome);
        }

        debug!(
            total = stats.total,
            recorded = stats.recorded,
            released = stats.released,
            resets = stats.resets,
            "Signals replayed"
        );
        stats
    }
}

/// Result of signal validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub index: usize,
    pub field: String,
    pub error: ValidationError,
}

/// Counts of capture outcomes during a replay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub total: usize,
    pub recorded: usize,
    pub released: usize,
    pub resets: usize,
    pub excluded: usize,
    pub unfocused: usize,
    pub duplicates: usize,
    pub unmatched_releases: usize,
}

impl ReplayStats {
    fn record(&mut self, outcome: CaptureOutcome) {
        self.total += 1;
        match outcome {
            CaptureOutcome::Recorded => self.recorded += 1,
            CaptureOutcome::ResetAndRecorded => {
                self.resets += 1;
                self.recorded += 1;
            }
            CaptureOutcome::Released => self.released += 1,
            CaptureOutcome::Ignored(IgnoreReason::ExcludedKey) => self.excluded += 1,
            CaptureOutcome::Ignored(IgnoreReason::Unfocused) => self.unfocused += 1,
            CaptureOutcome::Ignored(IgnoreReason::DuplicatePress) => self.duplicates += 1,
            CaptureOutcome::Ignored(IgnoreReason::NoOpenPress) => self.unmatched_releases += 1,
        }
    }

    /// Signals that left the session unchanged
    pub fn ignored(&self) -> usize {
        self.excluded + self.unfocused + self.duplicates + self.unmatched_releases
    }
}
