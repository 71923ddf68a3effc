//! Digraph feature extraction
//!
//! Turns frozen per-field key event logs into a flat table of inter-key timing
//! features. For every pair of adjacent events `(i, i + 1)` within a field:
//!
//! - `keydownTime`: dwell of event i (`up_i - down_i`)
//! - `UD`: flight time (`down_{i+1} - up_i`)
//! - `DD`: `down_{i+1} - down_i`
//! - `DU`: `up_{i+1} - down_i`
//! - `UU`: `up_{i+1} - up_i`
//!
//! Metrics use the absolute millisecond timestamps and are reported in seconds
//! rounded to 3 decimals. A metric is `null` unless both contributing
//! timestamps are present and non-zero.
//!
//! NOTE: a timestamp of exactly 0 counts as missing. Captures use epoch
//! milliseconds so this never drops real data, but a capture clock starting
//! at 0 would lose its first event's metrics.

use tracing::trace;

use crate::types::{FieldLogs, KeyEvent, ProcessedRow};

/// Decimal places kept for feature table metrics
const METRIC_DECIMALS: u32 = 3;

/// Label used for events whose key is missing
const MISSING_KEY: &str = "null";

/// Round `value` to `decimals` places, halves away from zero
pub fn round_to_decimal(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Build the feature table for all fields, in field insertion order.
///
/// Empty logs contribute nothing; a log of `L` events contributes `L - 1` rows.
/// Never fails: missing timestamps only null out the affected metrics.
pub fn extract_feature_table(logs: &FieldLogs) -> Vec<ProcessedRow> {
    let mut rows = Vec::new();

    for (field, events) in logs.iter() {
        if events.is_empty() {
            continue;
        }
        let field_rows = rows_for_field(events);
        trace!(field, events = events.len(), rows = field_rows.len(), "Field extracted");
        rows.extend(field_rows);
    }

    rows
}

/// Feature rows for a single field's event log
pub fn rows_for_field(events: &[KeyEvent]) -> Vec<ProcessedRow> {
    events
        .windows(2)
        .enumerate()
        .map(|(idx, pair)| {
            let (first, second) = (&pair[0], &pair[1]);
            ProcessedRow {
                keydown_time: interval(first.key_down_timestamp, first.key_up_timestamp),
                ud: interval(first.key_up_timestamp, second.key_down_timestamp),
                dd: interval(first.key_down_timestamp, second.key_down_timestamp),
                du: interval(first.key_down_timestamp, second.key_up_timestamp),
                uu: interval(first.key_up_timestamp, second.key_up_timestamp),
                iteration: idx as u32 + 1,
                key1: key_label(&first.key),
                key2: Some(key_label(&second.key)),
            }
        })
        .collect()
}

/// Seconds from `from` to `to`, if both timestamps are usable
fn interval(from: Option<i64>, to: Option<i64>) -> Option<f64> {
    let (from, to) = (usable(from)?, usable(to)?);
    // Out-of-range differences come from malformed timestamps
    let diff_ms = to.checked_sub(from)?;
    Some(round_to_decimal(diff_ms as f64 * 0.001, METRIC_DECIMALS))
}

fn usable(timestamp: Option<i64>) -> Option<i64> {
    timestamp.filter(|&t| t != 0)
}

fn key_label(key: &str) -> String {
    if key.is_empty() {
        MISSING_KEY.to_string()
    } else {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(key: &str, down: Option<i64>, up: Option<i64>) -> KeyEvent {
        KeyEvent {
            key: key.to_string(),
            key_down_timestamp: down,
            key_up_timestamp: up,
            ..KeyEvent::default()
        }
    }

    #[test]
    fn test_round_to_decimal() {
        assert_eq!(round_to_decimal(1.23456789, 3), 1.235);
        assert_eq!(round_to_decimal(1.23456789, 6), 1.234568);
        assert_eq!(round_to_decimal(-1.23456789, 3), -1.235);
        assert_eq!(round_to_decimal(2.0, 3), 2.0);
    }

    #[test]
    fn test_two_key_digraph() {
        let mut logs = FieldLogs::new();
        logs.insert(
            "password",
            vec![
                event("h", Some(1000), Some(1100)),
                event("i", Some(1150), Some(1250)),
            ],
        );

        let rows = extract_feature_table(&logs);
        assert_eq!(
            rows,
            vec![ProcessedRow {
                keydown_time: Some(0.1),
                ud: Some(0.05),
                dd: Some(0.15),
                du: Some(0.25),
                uu: Some(0.15),
                iteration: 1,
                key1: "h".to_string(),
                key2: Some("i".to_string()),
            }]
        );
    }

    #[test]
    fn test_empty_log_yields_no_rows() {
        let mut logs = FieldLogs::new();
        logs.insert("fieldA", Vec::new());
        assert!(extract_feature_table(&logs).is_empty());

        logs.insert("fieldB", vec![event("a", Some(5), Some(9))]);
        assert!(extract_feature_table(&logs).is_empty());
    }

    #[test]
    fn test_row_count_and_iterations() {
        let events: Vec<KeyEvent> = (0..6)
            .map(|i| event("k", Some(1000 + i * 200), Some(1080 + i * 200)))
            .collect();
        let rows = rows_for_field(&events);

        assert_eq!(rows.len(), 5);
        let iterations: Vec<u32> = rows.iter().map(|r| r.iteration).collect();
        assert_eq!(iterations, vec![1, 2, 3, 4, 5]);
        assert!(rows.iter().all(|r| r.keydown_time == Some(0.08)));
        assert!(rows.iter().all(|r| r.ud == Some(0.12)));
    }

    #[test]
    fn test_fields_in_insertion_order_without_cross_pairing() {
        let mut logs = FieldLogs::new();
        logs.insert(
            "username",
            vec![event("a", Some(100), Some(150)), event("b", Some(300), Some(350))],
        );
        logs.insert(
            "password",
            vec![
                event("x", Some(9000), Some(9040)),
                event("y", Some(9100), Some(9200)),
                event("z", Some(9300), Some(9350)),
            ],
        );

        let rows = extract_feature_table(&logs);
        assert_eq!(rows.len(), 3);
        assert_eq!((rows[0].key1.as_str(), rows[0].iteration), ("a", 1));
        assert_eq!((rows[1].key1.as_str(), rows[1].iteration), ("x", 1));
        assert_eq!((rows[2].key1.as_str(), rows[2].iteration), ("y", 2));
        assert_eq!(rows[0].dd, Some(0.2));
    }

    #[test]
    fn test_missing_and_zero_timestamps_null_out_metrics() {
        let events = vec![
            event("a", Some(1000), None),
            event("b", Some(0), Some(1300)),
        ];
        let rows = rows_for_field(&events);
        let row = &rows[0];

        assert_eq!(row.keydown_time, None);
        assert_eq!(row.ud, None);
        assert_eq!(row.dd, None);
        assert_eq!(row.du, Some(0.3));
        assert_eq!(row.uu, None);
    }

    #[test]
    fn test_overlapping_keys_give_negative_flight_time() {
        let events = vec![
            event("t", Some(1000), Some(1200)),
            event("h", Some(1100), Some(1250)),
        ];
        let row = &rows_for_field(&events)[0];
        assert_eq!(row.ud, Some(-0.1));
        assert_eq!(row.uu, Some(0.05));
    }

    #[test]
    fn test_extreme_timestamps_null_out_overflowing_metrics() {
        let events = vec![
            event("a", Some(i64::MIN), Some(i64::MAX)),
            event("b", Some(5), Some(6)),
        ];
        let row = &rows_for_field(&events)[0];

        assert_eq!(row.keydown_time, None);
        assert_eq!(row.dd, None);
        assert_eq!(row.du, None);
        assert!(row.ud.is_some());
        assert!(row.uu.is_some());
    }

    #[test]
    fn test_missing_key_labelled_null() {
        let events = vec![event("", Some(1), Some(2)), event("", Some(3), Some(4))];
        let row = &rows_for_field(&events)[0];
        assert_eq!(row.key1, "null");
        assert_eq!(row.key2.as_deref(), Some("null"));
    }
}
