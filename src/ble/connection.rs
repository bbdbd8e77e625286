//! Link state of a session.

/// Connection state of a session's link.
///
/// Only transport events move the state forward; commands merely request a
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionState {
    /// No link to the peripheral.
    #[default]
    Disconnected,
    /// A link was requested and the transport has not confirmed it yet.
    Connecting,
    /// The transport confirmed the link.
    Connected,
}

impl SessionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}
