//! Unified keystroke.signal.v1 schema
//!
//! This module defines the input schema for raw keyboard interactions: the
//! press/release stream a browser front end delivers, one record per event.

mod adapter;
mod key_signal;

pub use adapter::*;
pub use key_signal::*;
