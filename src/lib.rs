// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # disc-gatt-client
//!
//! A Bluetooth Low Energy client for the flying-disc peripheral: LED
//! control, speaker control and in-flight telemetry.
//!
//! The crate drives one fixed GATT schema. A [`GattSession`] owns the link
//! to the peripheral, arms notifications on the disc telemetry
//! characteristics one at a time after discovery, and publishes decoded
//! readings as [`SessionEvent`]s.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use disc_gatt_client::{BtleplugTransport, Channel, GattSession, Result, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (transport, transport_events) = BtleplugTransport::new().await;
//!     transport.start_scan().await?;
//!
//!     let session = Arc::new(GattSession::new(Arc::new(transport), SessionConfig::default())?);
//!     session.initialize()?;
//!     let _loop = session.spawn_event_loop(transport_events);
//!
//!     let _tof = session.on_reading(Channel::DiscTimeOfFlight, |reading| {
//!         println!("Flight time: {:?} s", reading.flight_seconds());
//!     });
//!
//!     session.connect("C0:FF:EE:00:00:01")?;
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!
//!     session.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### macOS
//! Requires Bluetooth permission. Peripherals must be seen by a scan before
//! they can be connected by address.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for config and event types

// Public modules
pub mod ble;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod sequencer;
pub mod session;

// Re-exports for convenience
pub use ble::attributes::{names, AttributeDirectory, AttributeId, CharacteristicRef};
pub use ble::btleplug_transport::BtleplugTransport;
pub use ble::connection::SessionState;
pub use ble::transport::{
    GattStatus, GattTransport, TransportEvent, TransportEventKind, TransportHandle,
    TransportOperation,
};
pub use config::{CharacteristicName, SessionConfig};
pub use error::{Error, Result};
pub use events::{CallbackHandle, Channel, SessionEvent, TelemetryReading};
pub use protocol::{decode_raw_digits, decode_signed16, TelemetryValue, ValueFormat};
pub use sequencer::NotificationSequencer;
pub use session::GattSession;
