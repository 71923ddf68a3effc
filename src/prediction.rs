//! Prediction service boundary
//!
//! The feature table is posted as `{"tables": [...rows]}` to an external
//! prediction service, which answers with one ranked candidate list per
//! sample. Two response shapes are accepted:
//!
//! - `{"predictions": [["u1", "u2", "u3"], ...]}`
//! - `{"body": "{\"predictions\": [...]}"}` (gateway proxy envelope, where
//!   the body is itself a JSON document encoded as a string)

use serde::Serialize;
use serde_json::Value;

use crate::error::{KeystrokeError, Result};
use crate::types::ProcessedRow;

/// Ranked candidate lists, one per feature sample, most likely first
pub type Rankings = Vec<Vec<String>>;

/// Request body sent to the prediction service
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRequest<'a> {
    pub tables: &'a [ProcessedRow],
}

impl<'a> PredictionRequest<'a> {
    pub fn new(tables: &'a [ProcessedRow]) -> Self {
        Self { tables }
    }
}

/// Anything that can turn a feature table into ranked predictions
pub trait Predictor {
    fn predict(&self, rows: &[ProcessedRow]) -> Result<Rankings>;
}

impl<P: Predictor + ?Sized> Predictor for Box<P> {
    fn predict(&self, rows: &[ProcessedRow]) -> Result<Rankings> {
        (**self).predict(rows)
    }
}

/// Decode a prediction service response body
pub fn decode_predictions(json: &str) -> Result<Rankings> {
    let value: Value = serde_json::from_str(json)?;
    predictions_from_value(value, true)
}

fn predictions_from_value(value: Value, allow_envelope: bool) -> Result<Rankings> {
    let Value::Object(mut object) = value else {
        return Err(KeystrokeError::ParseError(
            "prediction response is not a JSON object".to_string(),
        ));
    };

    if let Some(predictions) = object.remove("predictions") {
        return rankings_from_value(predictions);
    }

    match object.remove("body") {
        Some(Value::String(body)) if allow_envelope => {
            let inner: Value = serde_json::from_str(&body)?;
            predictions_from_value(inner, false)
        }
        Some(inner @ Value::Object(_)) if allow_envelope => predictions_from_value(inner, false),
        _ => Err(KeystrokeError::ParseError(
            "prediction response has no predictions".to_string(),
        )),
    }
}

/// Labels may come back as strings or numeric user ids
fn rankings_from_value(value: Value) -> Result<Rankings> {
    let Value::Array(lists) = value else {
        return Err(KeystrokeError::ParseError(
            "predictions must be an array of ranked lists".to_string(),
        ));
    };

    lists
        .into_iter()
        .map(|list| match list {
            Value::Array(labels) => Ok(labels.into_iter().filter_map(label_from_value).collect()),
            other => Err(KeystrokeError::ParseError(format!(
                "ranked list must be an array, got {}",
                other
            ))),
        })
        .collect()
}

fn label_from_value(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(feature = "remote")]
pub use remote::HttpPredictor;

#[cfg(feature = "remote")]
mod remote {
    use std::time::Duration;

    use reqwest::blocking::Client;
    use tracing::{debug, warn};
    use uuid::Uuid;

    use super::{decode_predictions, PredictionRequest, Predictor, Rankings};
    use crate::config::PredictionConfig;
    use crate::error::{KeystrokeError, Result};
    use crate::types::ProcessedRow;

    /// Blocking HTTP client for the prediction service
    #[derive(Debug, Clone)]
    pub struct HttpPredictor {
        endpoint: String,
        client: Client,
    }

    impl HttpPredictor {
        pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| KeystrokeError::Prediction(e.to_string()))?;
            Ok(Self {
                endpoint: endpoint.into(),
                client,
            })
        }

        /// Build from configuration; fails if no endpoint is configured
        pub fn from_config(config: &PredictionConfig) -> Result<Self> {
            let endpoint = config
                .endpoint
                .clone()
                .ok_or(KeystrokeError::MissingEndpoint)?;
            Self::new(endpoint, Duration::from_secs(config.timeout_secs))
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }
    }

    impl Predictor for HttpPredictor {
        fn predict(&self, rows: &[ProcessedRow]) -> Result<Rankings> {
            let request_id = Uuid::new_v4();
            debug!(
                %request_id,
                rows = rows.len(),
                endpoint = %self.endpoint,
                "Requesting predictions"
            );

            let response = self
                .client
                .post(&self.endpoint)
                .header("X-Request-Id", request_id.to_string())
                .json(&PredictionRequest::new(rows))
                .send()
                .map_err(|e| KeystrokeError::Prediction(e.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .map_err(|e| KeystrokeError::Prediction(e.to_string()))?;

            if !status.is_success() {
                warn!(%request_id, %status, "Prediction service returned an error");
                return Err(KeystrokeError::Prediction(format!("HTTP {}: {}", status, body)));
            }

            let rankings = decode_predictions(&body)?;
            debug!(%request_id, samples = rankings.len(), "Predictions received");
            Ok(rankings)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_body_shape() {
        let rows = vec![ProcessedRow {
            keydown_time: Some(0.1),
            ud: None,
            dd: Some(0.2),
            du: Some(0.3),
            uu: None,
            iteration: 1,
            key1: "a".to_string(),
            key2: Some("b".to_string()),
        }];
        let json = serde_json::to_value(PredictionRequest::new(&rows)).unwrap();

        assert!(json["tables"].is_array());
        assert_eq!(json["tables"][0]["key1"], "a");
        assert!(json["tables"][0]["UD"].is_null());
    }

    #[test]
    fn test_decode_plain_predictions() {
        let rankings = decode_predictions(r#"{"predictions": [["a", "b"], ["c"]]}"#).unwrap();
        assert_eq!(rankings, vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn test_decode_gateway_envelope() {
        let json = r#"{"statusCode": 200, "body": "{\"predictions\": [[\"u7\", \"u2\", \"u9\"]]}"}"#;
        let rankings = decode_predictions(json).unwrap();
        assert_eq!(rankings, vec![vec!["u7", "u2", "u9"]]);
    }

    #[test]
    fn test_decode_numeric_labels() {
        let rankings = decode_predictions(r#"{"predictions": [[12, "7", null]]}"#).unwrap();
        assert_eq!(rankings, vec![vec!["12", "7"]]);
    }

    #[test]
    fn test_decode_rejects_missing_predictions() {
        assert!(decode_predictions(r#"{"result": []}"#).is_err());
        assert!(decode_predictions(r#"[["a"]]"#).is_err());
        assert!(decode_predictions(r#"{"predictions": "a"}"#).is_err());
        assert!(decode_predictions(r#"{"body": "{\"body\": \"{}\"}"}"#).is_err());
    }
}
