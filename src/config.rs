//! Session configuration.

use crate::ble::attributes::{names, AttributeDirectory, CharacteristicRef};
use crate::error::Result;

/// A characteristic named by its service and characteristic names.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicName {
    /// Service name.
    pub service: String,
    /// Characteristic name.
    pub characteristic: String,
}

impl CharacteristicName {
    /// Create a new name pair.
    pub fn new(service: impl Into<String>, characteristic: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            characteristic: characteristic.into(),
        }
    }
}

/// Configuration for a [`GattSession`](crate::GattSession).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// Characteristics to arm after discovery, in hardware bring-up order.
    pub notification_plan: Vec<CharacteristicName>,
    /// Events buffered per subscriber before slow receivers lag.
    pub event_capacity: usize,
}

impl SessionConfig {
    /// Default per-subscriber event buffer.
    pub const DEFAULT_EVENT_CAPACITY: usize = 64;

    /// Replace the notification plan.
    pub fn with_notification_plan(mut self, plan: Vec<CharacteristicName>) -> Self {
        self.notification_plan = plan;
        self
    }

    /// Set the event buffer size.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Resolve the plan against a directory.
    pub fn resolve_plan(&self, directory: &AttributeDirectory) -> Result<Vec<CharacteristicRef>> {
        self.notification_plan
            .iter()
            .map(|n| directory.characteristic(&n.service, &n.characteristic))
            .collect()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            notification_plan: vec![
                CharacteristicName::new(names::DISC_STATS, names::DISC_TOF),
                CharacteristicName::new(names::DISC_STATS, names::DISC_ANG_AVG),
                CharacteristicName::new(names::DISC_STATS, names::DISC_ANG_RT),
            ],
            event_capacity: Self::DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_plan_resolves() {
        let dir = AttributeDirectory::standard();
        let plan = SessionConfig::default().resolve_plan(&dir).unwrap();
        assert_eq!(
            plan,
            vec![
                CharacteristicRef::new(DISC_STATS_SERVICE_UUID, DISC_TOF_UUID),
                CharacteristicRef::new(DISC_STATS_SERVICE_UUID, DISC_ANG_AVG_UUID),
                CharacteristicRef::new(DISC_STATS_SERVICE_UUID, DISC_ANG_RT_UUID),
            ]
        );
    }

    #[test]
    fn test_unknown_plan_entry() {
        let dir = AttributeDirectory::standard();
        let config = SessionConfig::default().with_notification_plan(vec![
            CharacteristicName::new(names::DISC_STATS, "disc_spin"),
        ]);
        assert!(matches!(
            config.resolve_plan(&dir),
            Err(Error::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::default()
            .with_event_capacity(8)
            .with_notification_plan(Vec::new());
        assert_eq!(config.event_capacity, 8);
        assert!(config.notification_plan.is_empty());
    }
}
