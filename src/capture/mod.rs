//! Keystroke event capture
//!
//! Maintains a per-field timeline of key presses and releases that stays
//! consistent under real-world input noise: modifier and navigation keys are
//! excluded, key-repeat presses are suppressed, unmatched releases are
//! ignored, and clearing a field restarts its capture.
//!
//! Pipeline: key signals → CaptureSession → FieldLogs → feature table

pub mod config;
pub mod session;

pub use config::{CaptureConfig, DEFAULT_EXCLUDED_KEYS};
pub use session::{CaptureOutcome, CaptureSession, IgnoreReason};
