//! Protocol module for decoding characteristic payloads.
//!
//! This module contains:
//! - Signed 16-bit telemetry field decoding
//! - Raw digit rendering for display-only channels

pub mod codec;

pub use codec::{decode_raw_digits, decode_signed16, TelemetryValue, ValueFormat};
