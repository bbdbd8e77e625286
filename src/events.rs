//! Consumer-facing session events.
//!
//! The session publishes every lifecycle change and every decoded reading
//! on a broadcast channel. Consumers either hold a receiver or register a
//! callback.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

use crate::ble::attributes::CharacteristicRef;
use crate::ble::transport::{GattStatus, TransportOperation};
use crate::protocol::TelemetryValue;

/// Named channel a reading is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    /// Value from a characteristic without a dedicated channel.
    DataAvailable,
    /// LED blink rate.
    LedBlinkRate,
    /// LED on duration.
    LedDuration,
    /// Speaker pitch.
    SpeakerPitch,
    /// Speaker volume.
    SpeakerVolume,
    /// Real-time angular velocity of the disc.
    DiscAngularVelocityRealTime,
    /// Average angular velocity of the disc.
    DiscAngularVelocityAverage,
    /// Time of flight, in half-second ticks.
    DiscTimeOfFlight,
}

impl Channel {
    /// Stable event name for this channel.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DataAvailable => "data_available",
            Self::LedBlinkRate => "led_blink_rate",
            Self::LedDuration => "led_duration",
            Self::SpeakerPitch => "speaker_pitch",
            Self::SpeakerVolume => "speaker_volume",
            Self::DiscAngularVelocityRealTime => "disc_ang_rt",
            Self::DiscAngularVelocityAverage => "disc_ang_avg",
            Self::DiscTimeOfFlight => "disc_tof",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded characteristic value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetryReading {
    /// Channel the reading is published on.
    pub channel: Channel,
    /// Characteristic the value came from.
    pub characteristic: CharacteristicRef,
    /// Decoded value.
    pub value: TelemetryValue,
    /// Per-channel sample counter, starting at 0.
    pub sample_index: u64,
    /// When the session decoded the value.
    pub received_at: DateTime<Utc>,
}

impl TelemetryReading {
    /// Value rendered for display (`"20"`, `"510255"`).
    pub fn display_value(&self) -> String {
        self.value.to_string()
    }

    /// Time of flight in seconds, for time-of-flight readings.
    ///
    /// The firmware counts flight time in half-second ticks.
    pub fn flight_seconds(&self) -> Option<f64> {
        if self.channel != Channel::DiscTimeOfFlight {
            return None;
        }
        self.value.as_i16().map(|ticks| ticks as f64 / 2.0)
    }
}

/// Event published by a session.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionEvent {
    /// The link to the peripheral is up.
    Connected,
    /// The link to the peripheral went down.
    Disconnected,
    /// Attribute discovery completed successfully.
    ServicesDiscovered,
    /// A characteristic value was decoded.
    Reading(TelemetryReading),
    /// Signal strength reported by the transport, in dBm.
    RemoteRssi(i16),
    /// The transport reported a failed operation.
    TransportError {
        /// The operation that failed.
        operation: TransportOperation,
        /// Status reported by the transport.
        status: GattStatus,
    },
}

impl SessionEvent {
    /// Stable event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::ServicesDiscovered => "services_discovered",
            Self::Reading(reading) => reading.channel.name(),
            Self::RemoteRssi(_) => "remote_rssi",
            Self::TransportError { .. } => "transport_error",
        }
    }

    /// Get the reading carried by this event, if any.
    pub fn reading(&self) -> Option<&TelemetryReading> {
        match self {
            Self::Reading(reading) => Some(reading),
            _ => None,
        }
    }
}

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Broadcast surface for session events.
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    callback_counter: AtomicU64,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            callback_counter: AtomicU64::new(0),
        }
    }

    /// Publish an event to every subscriber.
    pub fn publish(&self, event: SessionEvent) {
        trace!("Publishing event {}", event.name());
        let _ = self.tx.send(event);
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Register a callback for every event.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        trace!("Event callback lagged by {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    /// Register a callback for readings on one channel.
    pub fn on_reading<F>(&self, channel: Channel, callback: F) -> CallbackHandle
    where
        F: Fn(&TelemetryReading) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let Some(reading) = event.reading() {
                if reading.channel == channel {
                    callback(reading);
                }
            }
        })
    }
}
