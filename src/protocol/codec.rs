//! Telemetry payload decoding.
//!
//! Pure functions turning raw characteristic values into typed readings.
//! Nothing here touches the transport.

use std::fmt;
use std::fmt::Write as _;

use crate::error::{Error, Result};

/// Decode a signed 16-bit value spanning `bytes[offset]` and `bytes[offset + 1]`.
///
/// The low byte is taken unsigned and the high byte is reinterpreted as
/// signed before being shifted, so the result is `(high << 8) | low`.
///
/// # Errors
///
/// Returns [`Error::PayloadTooShort`] if fewer than `offset + 2` bytes are available.
///
/// # Example
///
/// ```
/// use disc_gatt_client::protocol::decode_signed16;
///
/// assert_eq!(decode_signed16(&[0, 0, 0, 0, 20, 0], 4).unwrap(), 20);
/// assert_eq!(decode_signed16(&[0x18, 0xFC], 0).unwrap(), -1000);
/// ```
pub fn decode_signed16(bytes: &[u8], offset: usize) -> Result<i16> {
    let needed = offset.saturating_add(2);
    if bytes.len() < needed {
        return Err(Error::PayloadTooShort {
            needed,
            actual: bytes.len(),
        });
    }

    let low = bytes[offset];
    let high = bytes[offset + 1] as i8;

    Ok(((high as i16) << 8) | low as i16)
}

/// Render every byte as its decimal value, concatenated without separators.
///
/// Used for display-only channels. An empty payload renders as an empty string.
pub fn decode_raw_digits(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for byte in bytes {
        let _ = write!(out, "{}", byte);
    }
    out
}

/// A decoded characteristic value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TelemetryValue {
    /// A signed 16-bit telemetry field.
    Signed(i16),
    /// Decimal digits of the raw payload.
    Digits(String),
}

impl TelemetryValue {
    /// Get the numeric value, if this is a signed field.
    pub fn as_i16(&self) -> Option<i16> {
        match self {
            Self::Signed(v) => Some(*v),
            Self::Digits(_) => None,
        }
    }
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signed(v) => write!(f, "{}", v),
            Self::Digits(s) => f.write_str(s),
        }
    }
}

/// How a characteristic's payload is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueFormat {
    /// Signed 16-bit field at a fixed byte offset.
    Signed16 {
        /// Offset of the low byte.
        offset: usize,
    },
    /// Raw decimal digits of every byte.
    #[default]
    RawDigits,
}

impl ValueFormat {
    /// Decode a payload according to this format.
    pub fn decode(&self, bytes: &[u8]) -> Result<TelemetryValue> {
        match *self {
            Self::Signed16 { offset } => decode_signed16(bytes, offset).map(TelemetryValue::Signed),
            Self::RawDigits => Ok(TelemetryValue::Digits(decode_raw_digits(bytes))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_decode_signed16_positive() {
        assert_eq!(decode_signed16(&[0x34, 0x12], 0).unwrap(), 0x1234);
        assert_eq!(decode_signed16(&[0, 0, 0, 0, 20, 0], 4).unwrap(), 20);
    }

    #[test]
    fn test_decode_signed16_negative() {
        assert_eq!(decode_signed16(&[0xFF, 0xFF], 0).unwrap(), -1);
        assert_eq!(decode_signed16(&[0x00, 0x80], 0).unwrap(), i16::MIN);
        // High byte signed, low byte unsigned
        assert_eq!(decode_signed16(&[0xF0, 0xFE], 0).unwrap(), -272);
    }

    #[test]
    fn test_decode_signed16_too_short() {
        let err = decode_signed16(&[1, 2, 3, 4, 5], 4).unwrap_err();
        assert!(matches!(
            err,
            Error::PayloadTooShort {
                needed: 6,
                actual: 5
            }
        ));

        assert!(decode_signed16(&[], 0).is_err());
        assert!(decode_signed16(&[1, 2], usize::MAX).is_err());
    }

    #[test]
    fn test_decode_raw_digits() {
        assert_eq!(decode_raw_digits(&[]), "");
        assert_eq!(decode_raw_digits(&[5, 10, 255]), "510255");
        assert_eq!(decode_raw_digits(&[0]), "0");
    }

    #[test]
    fn test_value_format_decode() {
        let format = ValueFormat::Signed16 { offset: 4 };
        let value = format.decode(&[0, 0, 0, 0, 20, 0]).unwrap();
        assert_eq!(value, TelemetryValue::Signed(20));
        assert_eq!(value.to_string(), "20");
        assert_eq!(value.as_i16(), Some(20));

        let value = ValueFormat::RawDigits.decode(&[1, 2]).unwrap();
        assert_eq!(value, TelemetryValue::Digits("12".to_string()));
        assert_eq!(value.as_i16(), None);
    }

    proptest! {
        #[test]
        fn prop_signed16_matches_composition(
            bytes in proptest::collection::vec(any::<u8>(), 2..16),
            offset_seed in any::<usize>(),
        ) {
            let offset = offset_seed % (bytes.len() - 1);
            let expected = ((bytes[offset + 1] as i8 as i16) << 8) | bytes[offset] as i16;
            prop_assert_eq!(decode_signed16(&bytes, offset).unwrap(), expected);
        }

        #[test]
        fn prop_signed16_short_payload_fails(
            bytes in proptest::collection::vec(any::<u8>(), 0..8),
            offset in 0usize..16,
        ) {
            prop_assume!(bytes.len() < offset + 2);
            let is_too_short = matches!(
                decode_signed16(&bytes, offset),
                Err(Error::PayloadTooShort { .. })
            );
            prop_assert!(is_too_short);
        }
    }
}
