//! Attribute directory.
//!
//! Maps symbolic attribute names to their UUIDs, display labels and payload
//! formats so the rest of the crate never handles raw UUID literals.

use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use crate::ble::uuids::*;
use crate::error::{Error, Result};
use crate::events::Channel;
use crate::protocol::ValueFormat;

/// Symbolic names of every attribute in the schema.
pub mod names {
    /// LED Control service.
    pub const LED_CONTROL: &str = "led_control";
    /// LED On/Off characteristic.
    pub const LED_ON_OFF: &str = "led_on_off";
    /// LED Blink Rate characteristic.
    pub const LED_BLINK_RATE: &str = "led_blink_rate";
    /// LED Duration characteristic.
    pub const LED_DURATION: &str = "led_duration";
    /// Speaker Control service.
    pub const SPEAKER_CONTROL: &str = "speaker_control";
    /// Speaker On/Off characteristic.
    pub const SPEAKER_ON_OFF: &str = "speaker_on_off";
    /// Speaker Pitch characteristic.
    pub const SPEAKER_PITCH: &str = "speaker_pitch";
    /// Speaker Volume characteristic.
    pub const SPEAKER_VOLUME: &str = "speaker_volume";
    /// Disc Statistics service.
    pub const DISC_STATS: &str = "disc_stats";
    /// Real-time angular velocity characteristic.
    pub const DISC_ANG_RT: &str = "disc_ang_rt";
    /// Average angular velocity characteristic.
    pub const DISC_ANG_AVG: &str = "disc_ang_avg";
    /// Time of flight characteristic.
    pub const DISC_TOF: &str = "disc_tof";
    /// Client Characteristic Configuration descriptor.
    pub const CLIENT_CHARACTERISTIC_CONFIG: &str = "client_characteristic_config";
}

/// Offset of the signed 16-bit field in disc statistics payloads.
pub const DISC_STATS_VALUE_OFFSET: usize = 4;

/// A 128-bit attribute identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeId(Uuid);

impl AttributeId {
    /// Wrap a UUID.
    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub const fn uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for AttributeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A characteristic addressed by its (service, characteristic) UUID pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicRef {
    /// The owning service.
    pub service: AttributeId,
    /// The characteristic itself.
    pub characteristic: AttributeId,
}

impl CharacteristicRef {
    /// Create a reference from raw UUIDs.
    pub const fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service: AttributeId::new(service),
            characteristic: AttributeId::new(characteristic),
        }
    }
}

impl fmt::Display for CharacteristicRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

/// Static description of one characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicSpec {
    /// Symbolic name.
    pub name: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Characteristic UUID.
    pub id: AttributeId,
    /// Payload encoding.
    pub format: ValueFormat,
    /// Event channel inbound values are published on.
    pub channel: Channel,
    /// Whether the characteristic carries a notification-enable descriptor.
    pub notifiable: bool,
}

/// Static description of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Symbolic name.
    pub name: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Service UUID.
    pub id: AttributeId,
    /// Characteristics exposed by the service.
    pub characteristics: &'static [CharacteristicSpec],
}

const fn characteristic(
    name: &'static str,
    label: &'static str,
    uuid: Uuid,
    format: ValueFormat,
    channel: Channel,
    notifiable: bool,
) -> CharacteristicSpec {
    CharacteristicSpec {
        name,
        label,
        id: AttributeId::new(uuid),
        format,
        channel,
        notifiable,
    }
}

const DISC_STATS_FORMAT: ValueFormat = ValueFormat::Signed16 {
    offset: DISC_STATS_VALUE_OFFSET,
};

/// The peripheral firmware's GATT table.
pub const DISC_SCHEMA: &[ServiceSpec] = &[
    ServiceSpec {
        name: names::LED_CONTROL,
        label: "LED Control",
        id: AttributeId::new(LED_CONTROL_SERVICE_UUID),
        characteristics: &[
            characteristic(
                names::LED_ON_OFF,
                "LED On/Off",
                LED_ON_OFF_UUID,
                ValueFormat::RawDigits,
                Channel::DataAvailable,
                false,
            ),
            characteristic(
                names::LED_BLINK_RATE,
                "LED Blink Rate",
                LED_BLINK_RATE_UUID,
                ValueFormat::RawDigits,
                Channel::LedBlinkRate,
                false,
            ),
            characteristic(
                names::LED_DURATION,
                "LED Duration",
                LED_DURATION_UUID,
                ValueFormat::RawDigits,
                Channel::LedDuration,
                false,
            ),
        ],
    },
    ServiceSpec {
        name: names::SPEAKER_CONTROL,
        label: "Speaker Control",
        id: AttributeId::new(SPEAKER_CONTROL_SERVICE_UUID),
        characteristics: &[
            characteristic(
                names::SPEAKER_ON_OFF,
                "Speaker On/Off",
                SPEAKER_ON_OFF_UUID,
                ValueFormat::RawDigits,
                Channel::DataAvailable,
                false,
            ),
            characteristic(
                names::SPEAKER_PITCH,
                "Speaker Pitch",
                SPEAKER_PITCH_UUID,
                ValueFormat::RawDigits,
                Channel::SpeakerPitch,
                false,
            ),
            characteristic(
                names::SPEAKER_VOLUME,
                "Speaker Volume",
                SPEAKER_VOLUME_UUID,
                ValueFormat::RawDigits,
                Channel::SpeakerVolume,
                false,
            ),
        ],
    },
    ServiceSpec {
        name: names::DISC_STATS,
        label: "Disc Statistics",
        id: AttributeId::new(DISC_STATS_SERVICE_UUID),
        characteristics: &[
            characteristic(
                names::DISC_ANG_RT,
                "Disc Angular vel. real-time",
                DISC_ANG_RT_UUID,
                DISC_STATS_FORMAT,
                Channel::DiscAngularVelocityRealTime,
                true,
            ),
            characteristic(
                names::DISC_ANG_AVG,
                "Disc Angular vel. average",
                DISC_ANG_AVG_UUID,
                DISC_STATS_FORMAT,
                Channel::DiscAngularVelocityAverage,
                true,
            ),
            characteristic(
                names::DISC_TOF,
                "Disc Time of Flight",
                DISC_TOF_UUID,
                DISC_STATS_FORMAT,
                Channel::DiscTimeOfFlight,
                true,
            ),
        ],
    },
];

/// Labels for standard attributes that are not part of the schema proper.
const STANDARD_LABELS: &[(Uuid, &str)] = &[
    (HEART_RATE_SERVICE_UUID, "Heart Rate Service"),
    (DEVICE_INFO_SERVICE_UUID, "Device Information Service"),
    (HEART_RATE_MEASUREMENT_UUID, "Heart Rate Measurement"),
    (MANUFACTURER_NAME_UUID, "Manufacturer Name String"),
];

/// Immutable lookup table over a fixed schema.
///
/// Build it once at startup (usually with [`AttributeDirectory::standard`])
/// and share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AttributeDirectory {
    services: &'static [ServiceSpec],
    by_name: HashMap<&'static str, AttributeId>,
    labels: HashMap<AttributeId, &'static str>,
}

impl AttributeDirectory {
    /// Build a directory over the given schema.
    pub fn new(services: &'static [ServiceSpec]) -> Self {
        let mut by_name = HashMap::new();
        let mut labels = HashMap::new();

        by_name.insert(
            names::CLIENT_CHARACTERISTIC_CONFIG,
            AttributeId::new(CLIENT_CHARACTERISTIC_CONFIG_UUID),
        );

        for (uuid, label) in STANDARD_LABELS {
            labels.insert(AttributeId::new(*uuid), *label);
        }

        for service in services {
            by_name.insert(service.name, service.id);
            labels.insert(service.id, service.label);
            for c in service.characteristics {
                by_name.insert(c.name, c.id);
                labels.insert(c.id, c.label);
            }
        }

        Self {
            services,
            by_name,
            labels,
        }
    }

    /// Build the directory for the disc peripheral.
    pub fn standard() -> Self {
        Self::new(DISC_SCHEMA)
    }

    /// Resolve a symbolic name to its attribute id.
    pub fn resolve(&self, name: &str) -> Result<AttributeId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownAttribute {
                name: name.to_string(),
            })
    }

    /// Get the display label for an attribute, or `fallback` if it is unknown.
    pub fn label<'a>(&self, id: &AttributeId, fallback: &'a str) -> &'a str {
        self.labels.get(id).copied().unwrap_or(fallback)
    }

    /// All services in the schema.
    pub fn services(&self) -> &'static [ServiceSpec] {
        self.services
    }

    /// Look up a characteristic's description by service and characteristic name.
    pub fn spec(&self, service_name: &str, char_name: &str) -> Result<&'static CharacteristicSpec> {
        let service = self
            .services
            .iter()
            .find(|s| s.name == service_name)
            .ok_or_else(|| Error::UnknownAttribute {
                name: service_name.to_string(),
            })?;

        service
            .characteristics
            .iter()
            .find(|c| c.name == char_name)
            .ok_or_else(|| Error::UnknownAttribute {
                name: format!("{}.{}", service_name, char_name),
            })
    }

    /// Resolve a service/characteristic name pair.
    pub fn characteristic(&self, service_name: &str, char_name: &str) -> Result<CharacteristicRef> {
        let spec = self.spec(service_name, char_name)?;
        let service = self.resolve(service_name)?;
        Ok(CharacteristicRef {
            service,
            characteristic: spec.id,
        })
    }

    /// Identify a characteristic by UUID value equality.
    pub fn identify(&self, reference: &CharacteristicRef) -> Option<&'static CharacteristicSpec> {
        self.services
            .iter()
            .find(|s| s.id == reference.service)?
            .characteristics
            .iter()
            .find(|c| c.id == reference.characteristic)
    }
}

impl Default for AttributeDirectory {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_known_names() {
        let dir = AttributeDirectory::standard();
        assert_eq!(
            dir.resolve(names::DISC_TOF).unwrap(),
            AttributeId::new(DISC_TOF_UUID)
        );
        assert_eq!(
            dir.resolve(names::LED_CONTROL).unwrap(),
            AttributeId::new(LED_CONTROL_SERVICE_UUID)
        );
        assert_eq!(
            dir.resolve(names::CLIENT_CHARACTERISTIC_CONFIG).unwrap(),
            AttributeId::new(CLIENT_CHARACTERISTIC_CONFIG_UUID)
        );
    }

    #[test]
    fn test_resolve_unknown_name() {
        let dir = AttributeDirectory::standard();
        let err = dir.resolve("led_strobe").unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute { name } if name == "led_strobe"));
    }

    #[test]
    fn test_label_with_fallback() {
        let dir = AttributeDirectory::standard();
        assert_eq!(
            dir.label(&AttributeId::new(DISC_ANG_AVG_UUID), "Unknown"),
            "Disc Angular vel. average"
        );
        assert_eq!(
            dir.label(&AttributeId::new(HEART_RATE_SERVICE_UUID), "Unknown"),
            "Heart Rate Service"
        );
        assert_eq!(
            dir.label(&AttributeId::new(Uuid::nil()), "Unknown service"),
            "Unknown service"
        );
    }

    #[test]
    fn test_characteristic_requires_matching_service() {
        let dir = AttributeDirectory::standard();
        let reference = dir
            .characteristic(names::SPEAKER_CONTROL, names::SPEAKER_PITCH)
            .unwrap();
        assert_eq!(
            reference,
            CharacteristicRef::new(SPEAKER_CONTROL_SERVICE_UUID, SPEAKER_PITCH_UUID)
        );

        assert!(dir
            .characteristic(names::LED_CONTROL, names::SPEAKER_PITCH)
            .is_err());
        assert!(dir.characteristic("nope", names::SPEAKER_PITCH).is_err());
    }

    #[test]
    fn test_identify_by_value() {
        let dir = AttributeDirectory::standard();

        // A freshly built reference must match the table entry.
        let reference = CharacteristicRef::new(DISC_STATS_SERVICE_UUID, DISC_TOF_UUID);
        let spec = dir.identify(&reference).unwrap();
        assert_eq!(spec.name, names::DISC_TOF);
        assert_eq!(spec.channel, Channel::DiscTimeOfFlight);

        // Right characteristic, wrong service.
        let reference = CharacteristicRef::new(LED_CONTROL_SERVICE_UUID, DISC_TOF_UUID);
        assert!(dir.identify(&reference).is_none());
    }

    #[test]
    fn test_names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for service in DISC_SCHEMA {
            assert!(seen.insert(service.name));
            for c in service.characteristics {
                assert!(seen.insert(c.name), "duplicate name {}", c.name);
            }
        }
    }
}
