//! BLE communication module.
//!
//! This module provides the attribute schema, the transport boundary the
//! session drives, and a btleplug-backed transport.

pub mod attributes;
pub mod btleplug_transport;
pub mod connection;
pub mod transport;
pub mod uuids;

pub use attributes::{
    names, AttributeDirectory, AttributeId, CharacteristicRef, CharacteristicSpec, ServiceSpec,
};
pub use btleplug_transport::BtleplugTransport;
pub use connection::SessionState;
pub use transport::{
    GattStatus, GattTransport, TransportEvent, TransportEventKind, TransportHandle,
    TransportOperation,
};
pub use uuids::*;
