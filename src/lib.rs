//! Keystroke Flux - keystroke-dynamics capture and identity consensus
//!
//! Flux turns raw key presses and releases into timing features and a
//! consensus identity through a deterministic pipeline: signal capture →
//! per-field key event logs → digraph feature table → external prediction →
//! rank-weighted consensus.
//!
//! ## Modules
//!
//! - **Capture**: Per-field key event logs with noise suppression
//! - **Features**: Digraph timing table (keydownTime, UD, DD, DU, UU)
//! - **Consensus**: Rank-weighted voting over predicted identities
//! - **Prediction**: Request/response boundary to the prediction service

pub mod capture;
pub mod config;
pub mod consensus;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod prediction;
pub mod schema;
pub mod types;

pub use capture::{CaptureConfig, CaptureOutcome, CaptureSession};
pub use config::KeystrokeConfig;
pub use consensus::{calculate_highest_score, ConsensusScores};
pub use error::{KeystrokeError, Result};
pub use features::extract_feature_table;
pub use pipeline::{key_data_to_feature_table, KeystrokeVerifier, Verification};
pub use prediction::{decode_predictions, Predictor, Rankings};
pub use types::{FieldLogs, KeyEvent, ProcessedRow};

#[cfg(feature = "remote")]
pub use prediction::HttpPredictor;

// Schema exports
pub use schema::{KeySignal, KeySignalAdapter, SCHEMA_VERSION};

/// Flux version reported by the CLI and doctor checks
pub const KEYFLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "keystroke-flux";
