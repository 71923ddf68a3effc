//! Keystroke pipeline orchestration
//!
//! This module provides the public API for turning captured key data into a
//! feature table and, through a prediction service, into a consensus identity.
//!
//! Pipeline: FieldLogs JSON → FieldLogs → feature table → Predictor → rankings → consensus label

use serde::Serialize;
use tracing::{debug, info};

use crate::consensus::ConsensusScores;
use crate::error::{KeystrokeError, Result};
use crate::features::extract_feature_table;
use crate::prediction::{Predictor, Rankings};
use crate::types::{FieldLogs, ProcessedRow};

/// Parse captured key data (field → key events) from JSON
pub fn parse_key_data(json: &str) -> Result<FieldLogs> {
    serde_json::from_str(json)
        .map_err(|e| KeystrokeError::ParseError(format!("Failed to parse key data: {}", e)))
}

/// Convert captured key data JSON to feature table JSON (stateless, one-shot).
///
/// # Example
/// ```ignore
/// let table_json = key_data_to_feature_table(key_data_json)?;
/// ```
pub fn key_data_to_feature_table(key_data_json: &str) -> Result<String> {
    // Stage 1: Parse key data
    let logs = parse_key_data(key_data_json)?;

    // Stage 2: Extract digraph features
    let rows = extract_feature_table(&logs);

    // Stage 3: Encode
    Ok(serde_json::to_string(&rows)?)
}

/// Outcome of a verification run
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    /// Feature table sent to the predictor
    pub rows: Vec<ProcessedRow>,
    /// Ranked candidates returned by the predictor
    pub predictions: Rankings,
    /// Per-label consensus scores in first-seen order
    pub scores: ConsensusScores,
    /// Consensus identity, `None` when there was nothing to decide on
    pub label: Option<String>,
}

/// Runs captured key data through feature extraction, prediction and
/// consensus scoring.
pub struct KeystrokeVerifier<P> {
    predictor: P,
}

impl<P: Predictor> KeystrokeVerifier<P> {
    pub fn new(predictor: P) -> Self {
        Self { predictor }
    }

    pub fn predictor(&self) -> &P {
        &self.predictor
    }

    /// Verify frozen field logs.
    ///
    /// An empty feature table skips the prediction call and yields no label.
    pub fn verify(&self, logs: &FieldLogs) -> Result<Verification> {
        // Stage 1: Extract digraph features
        let rows = extract_feature_table(logs);

        if rows.is_empty() {
            debug!(fields = logs.len(), "No digraphs captured, skipping prediction");
            return Ok(Verification {
                rows,
                predictions: Vec::new(),
                scores: ConsensusScores::new(),
                label: None,
            });
        }

        // Stage 2: Ranked predictions from the external service
        let predictions = self.predictor.predict(&rows)?;

        // Stage 3: Consensus
        let scores = ConsensusScores::from_predictions(&predictions);
        let label = scores.winner().map(|w| w.label.clone());

        info!(
            rows = rows.len(),
            samples = predictions.len(),
            label = label.as_deref().unwrap_or("<none>"),
            "Verification complete"
        );

        Ok(Verification {
            rows,
            predictions,
            scores,
            label,
        })
    }

    /// Verify key data given as JSON
    pub fn verify_json(&self, key_data_json: &str) -> Result<Verification> {
        let logs = parse_key_data(key_data_json)?;
        self.verify(&logs)
    }
}

#[cfg(feature = "remote")]
impl KeystrokeVerifier<crate::prediction::HttpPredictor> {
    /// Verifier backed by the configured HTTP prediction service
    pub fn from_config(config: &crate::config::PredictionConfig) -> Result<Self> {
        Ok(Self::new(crate::prediction::HttpPredictor::from_config(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Returns canned rankings and remembers the row counts it was asked about
    struct ScriptedPredictor {
        rankings: Rankings,
        calls: RefCell<Vec<usize>>,
    }

    impl ScriptedPredictor {
        fn new(rankings: Vec<Vec<&str>>) -> Self {
            Self {
                rankings: rankings
                    .into_iter()
                    .map(|list| list.into_iter().map(String::from).collect())
                    .collect(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Predictor for ScriptedPredictor {
        fn predict(&self, rows: &[ProcessedRow]) -> Result<Rankings> {
            self.calls.borrow_mut().push(rows.len());
            Ok(self.rankings.clone())
        }
    }

    struct FailingPredictor;

    impl Predictor for FailingPredictor {
        fn predict(&self, _rows: &[ProcessedRow]) -> Result<Rankings> {
            Err(KeystrokeError::Prediction("HTTP 503".to_string()))
        }
    }

    fn sample_key_data_json() -> &'static str {
        r#"{
            "username": [
                {"key": "h", "keyDownTime": 0, "keyUpTime": 0.1, "keyDownTimestamp": 1000, "keyUpTimestamp": 1100, "durationInSeconds": 0.1},
                {"key": "i", "keyDownTime": 0.15, "keyUpTime": 0.25, "keyDownTimestamp": 1150, "keyUpTimestamp": 1250, "durationInSeconds": 0.1}
            ],
            "password": [
                {"key": "p", "keyDownTimestamp": 5000, "keyUpTimestamp": 5090},
                {"key": "w", "keyDownTimestamp": 5200, "keyUpTimestamp": 5260},
                {"key": "d", "keyDownTimestamp": 5400, "keyUpTimestamp": null}
            ],
            "floatingTextarea1": []
        }"#
    }

    #[test]
    fn test_key_data_to_feature_table_stateless() {
        let json = key_data_to_feature_table(sample_key_data_json()).unwrap();
        let rows: serde_json::Value = serde_json::from_str(&json).unwrap();
        let rows = rows.as_array().unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["keydownTime"], 0.1);
        assert_eq!(rows[0]["UD"], 0.05);
        assert_eq!(rows[0]["DD"], 0.15);
        assert_eq!(rows[0]["DU"], 0.25);
        assert_eq!(rows[0]["UU"], 0.15);
        assert_eq!(rows[0]["key1"], "h");
        assert_eq!(rows[0]["key2"], "i");
        assert_eq!(rows[0]["iteration"], 1);

        assert_eq!(rows[1]["key1"], "p");
        assert_eq!(rows[2]["iteration"], 2);
        assert!(rows[2]["DU"].is_null());
        assert!(rows[2]["UU"].is_null());
    }

    #[test]
    fn test_extreme_timestamps_degrade_to_null_metrics() {
        let json = key_data_to_feature_table(
            r#"{"f": [
                {"key": "a", "keyDownTimestamp": -9223372036854775808, "keyUpTimestamp": 9223372036854775807},
                {"key": "b", "keyDownTimestamp": 5, "keyUpTimestamp": 6}
            ]}"#,
        )
        .unwrap();
        let rows: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert!(rows[0]["keydownTime"].is_null());
        assert!(rows[0]["DD"].is_null());
    }

    #[test]
    fn test_invalid_json() {
        let result = key_data_to_feature_table("not valid json");
        assert!(matches!(result, Err(KeystrokeError::ParseError(_))));
    }

    #[test]
    fn test_verify_runs_consensus() {
        let predictor = ScriptedPredictor::new(vec![vec!["a", "b", "c"], vec!["b", "a", "c"]]);
        let verifier = KeystrokeVerifier::new(predictor);

        let verification = verifier.verify_json(sample_key_data_json()).unwrap();

        assert_eq!(verification.rows.len(), 3);
        assert_eq!(verification.predictions.len(), 2);
        assert_eq!(verification.scores.score("a"), Some(5));
        assert_eq!(verification.label.as_deref(), Some("a"));
        assert_eq!(*verifier.predictor().calls.borrow(), vec![3]);
    }

    #[test]
    fn test_verify_without_digraphs_skips_predictor() {
        let verifier = KeystrokeVerifier::new(ScriptedPredictor::new(vec![vec!["a"]]));
        let verification = verifier
            .verify_json(r#"{"password": [{"key": "a", "keyDownTimestamp": 10}]}"#)
            .unwrap();

        assert!(verification.rows.is_empty());
        assert_eq!(verification.label, None);
        assert!(verifier.predictor().calls.borrow().is_empty());
    }

    #[test]
    fn test_verify_with_empty_predictions() {
        let verifier = KeystrokeVerifier::new(ScriptedPredictor::new(vec![]));
        let verification = verifier.verify_json(sample_key_data_json()).unwrap();
        assert_eq!(verification.label, None);
        assert!(verification.scores.is_empty());
    }

    #[test]
    fn test_predictor_errors_propagate() {
        let verifier = KeystrokeVerifier::new(FailingPredictor);
        let result = verifier.verify_json(sample_key_data_json());
        assert!(matches!(result, Err(KeystrokeError::Prediction(_))));
    }

    #[test]
    fn test_boxed_predictor() {
        let boxed: Box<dyn Predictor> = Box::new(ScriptedPredictor::new(vec![vec!["solo"]]));
        let verifier = KeystrokeVerifier::new(boxed);
        let verification = verifier.verify_json(sample_key_data_json()).unwrap();
        assert_eq!(verification.label.as_deref(), Some("solo"));
    }
}
