//! Error types for the disc-gatt-client crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// The BLE adapter was never initialized or is not available.
    #[error("Bluetooth adapter not available or not initialized")]
    AdapterUnavailable,

    /// The peripheral address is empty or malformed.
    #[error("Invalid peripheral address: {address:?}")]
    InvalidAddress {
        /// The address that was rejected.
        address: String,
    },

    /// Operation requires a live link but the session has none.
    #[error("Peripheral not connected")]
    NotConnected,

    /// The session was closed and can no longer be used.
    #[error("Session closed")]
    SessionClosed,

    /// A symbolic attribute name is not part of the schema.
    #[error("Unknown attribute: {name}")]
    UnknownAttribute {
        /// The name that failed to resolve.
        name: String,
    },

    /// A telemetry payload was shorter than its declared format requires.
    #[error("Payload too short: need {needed} bytes, got {actual}")]
    PayloadTooShort {
        /// Minimum number of bytes required.
        needed: usize,
        /// Number of bytes actually received.
        actual: usize,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// The transport refused to issue a request.
    #[error("Transport error: {reason}")]
    Transport {
        /// Description of why the request was refused.
        reason: String,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
