//! Transport boundary.
//!
//! A [`GattTransport`] only *requests* operations. Every outcome comes back
//! later as a [`TransportEvent`] on the channel the session consumes, tagged
//! with the handle it belongs to.

use bytes::Bytes;
use std::fmt;

use crate::ble::attributes::CharacteristicRef;
use crate::error::Result;

/// Opaque handle to one transport-level link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportHandle(u64);

impl TransportHandle {
    /// Wrap a raw handle value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw handle value.
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// ATT status reported with an operation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GattStatus {
    /// The operation succeeded.
    Success,
    /// The operation failed with a transport-specific code.
    Failure(u8),
}

impl GattStatus {
    /// Generic failure code used when the transport gives no detail.
    pub const GATT_FAILURE: u8 = 0x85;

    /// Check if the status reports success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure(code) => write!(f, "failure ({:#04x})", code),
        }
    }
}

/// Kind of operation a transport outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransportOperation {
    /// Link establishment.
    Connect,
    /// Attribute discovery.
    DiscoverServices,
    /// Characteristic read.
    ReadCharacteristic,
    /// Characteristic write.
    WriteCharacteristic,
    /// Notification enable/disable (descriptor write).
    SetNotification,
    /// RSSI read.
    ReadRemoteRssi,
}

impl fmt::Display for TransportOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::DiscoverServices => "discover services",
            Self::ReadCharacteristic => "read characteristic",
            Self::WriteCharacteristic => "write characteristic",
            Self::SetNotification => "set notification",
            Self::ReadRemoteRssi => "read remote RSSI",
        };
        f.write_str(name)
    }
}

/// What happened on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// The link is established.
    LinkUp,
    /// The link dropped or was closed by request.
    LinkDown,
    /// Attribute discovery completed.
    ServicesDiscovered {
        /// Discovery status.
        status: GattStatus,
        /// Characteristics found on the peripheral.
        characteristics: Vec<CharacteristicRef>,
    },
    /// A requested read completed.
    CharacteristicRead {
        /// Source characteristic.
        characteristic: CharacteristicRef,
        /// Read status.
        status: GattStatus,
        /// Value read.
        value: Bytes,
    },
    /// The peripheral pushed a new value.
    CharacteristicChanged {
        /// Source characteristic.
        characteristic: CharacteristicRef,
        /// Notified value.
        value: Bytes,
    },
    /// A requested write completed.
    CharacteristicWritten {
        /// Target characteristic.
        characteristic: CharacteristicRef,
        /// Write status.
        status: GattStatus,
    },
    /// A notification-enable descriptor write completed.
    DescriptorWritten {
        /// Characteristic whose descriptor was written.
        characteristic: CharacteristicRef,
        /// Write status.
        status: GattStatus,
    },
    /// A requested RSSI read completed.
    RemoteRssi {
        /// Signal strength in dBm.
        rssi: i16,
        /// Read status.
        status: GattStatus,
    },
}

/// An inbound transport notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Link the event belongs to.
    pub handle: TransportHandle,
    /// What happened.
    pub kind: TransportEventKind,
}

impl TransportEvent {
    /// Create a new event.
    pub fn new(handle: TransportHandle, kind: TransportEventKind) -> Self {
        Self { handle, kind }
    }
}

/// Platform BLE capability driven by a session.
///
/// All methods return as soon as the request is issued. `Err` means the
/// request could not be issued at all; outcomes of issued requests are
/// reported asynchronously as [`TransportEvent`]s.
#[cfg_attr(test, mockall::automock)]
pub trait GattTransport: Send + Sync {
    /// Acquire the local adapter. Returns `false` if none is available.
    fn initialize_adapter(&self) -> bool;

    /// Check whether `address` is a well-formed peripheral address.
    fn is_valid_address(&self, address: &str) -> bool;

    /// Open a new link to `address`.
    fn connect(&self, address: &str) -> Result<TransportHandle>;

    /// Re-establish a link on an existing handle.
    fn reconnect(&self, handle: TransportHandle) -> Result<()>;

    /// Drop the link, keeping the handle for a later reconnect.
    fn disconnect(&self, handle: TransportHandle);

    /// Release the handle and everything attached to it.
    fn close(&self, handle: TransportHandle);

    /// Start attribute discovery.
    fn discover_services(&self, handle: TransportHandle) -> Result<()>;

    /// Request a characteristic read.
    fn read_characteristic(
        &self,
        handle: TransportHandle,
        characteristic: &CharacteristicRef,
    ) -> Result<()>;

    /// Request a characteristic write.
    fn write_characteristic(
        &self,
        handle: TransportHandle,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) -> Result<()>;

    /// Enable or disable notifications, writing the client characteristic
    /// configuration descriptor when enabling.
    fn set_notification(
        &self,
        handle: TransportHandle,
        characteristic: &CharacteristicRef,
        enabled: bool,
    ) -> Result<()>;

    /// Request the current signal strength.
    fn read_remote_rssi(&self, handle: TransportHandle) -> Result<()>;
}
