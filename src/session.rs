//! GATT session.
//!
//! Owns the transport handle for one peripheral, applies inbound transport
//! events in order, drives notification bring-up and publishes decoded
//! readings.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::ble::attributes::{names, AttributeDirectory, CharacteristicRef};
use crate::ble::connection::SessionState;
use crate::ble::transport::{
    GattStatus, GattTransport, TransportEvent, TransportEventKind, TransportHandle,
    TransportOperation,
};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::events::{CallbackHandle, Channel, EventBus, SessionEvent, TelemetryReading};
use crate::protocol::ValueFormat;
use crate::sequencer::NotificationSequencer;

/// Mutable session state. Every transition happens under one lock.
struct SessionInner {
    /// Link state.
    state: SessionState,
    /// Address owned by the current handle.
    address: Option<String>,
    /// Current transport handle.
    handle: Option<TransportHandle>,
    /// Whether the adapter was initialized.
    adapter_ready: bool,
    /// Whether the session was torn down.
    closed: bool,
    /// Notification bring-up.
    sequencer: NotificationSequencer,
    /// Characteristics reported by the last successful discovery.
    discovered: BTreeSet<CharacteristicRef>,
    /// Next sample index per channel.
    sample_counters: HashMap<Channel, u64>,
}

/// A session with one BLE peripheral.
pub struct GattSession {
    /// Platform transport.
    transport: Arc<dyn GattTransport>,
    /// Attribute schema.
    directory: Arc<AttributeDirectory>,
    /// Session state.
    inner: Mutex<SessionInner>,
    /// Outbound events.
    events: EventBus,
}

impl GattSession {
    /// Create a session over the standard disc schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAttribute`] if the notification plan names an
    /// attribute outside the schema.
    pub fn new(transport: Arc<dyn GattTransport>, config: SessionConfig) -> Result<Self> {
        Self::with_directory(transport, Arc::new(AttributeDirectory::standard()), config)
    }

    /// Create a session over a custom directory.
    pub fn with_directory(
        transport: Arc<dyn GattTransport>,
        directory: Arc<AttributeDirectory>,
        config: SessionConfig,
    ) -> Result<Self> {
        let plan = config.resolve_plan(&directory)?;

        Ok(Self {
            transport,
            directory,
            inner: Mutex::new(SessionInner {
                state: SessionState::Disconnected,
                address: None,
                handle: None,
                adapter_ready: false,
                closed: false,
                sequencer: NotificationSequencer::new(plan),
                discovered: BTreeSet::new(),
                sample_counters: HashMap::new(),
            }),
            events: EventBus::new(config.event_capacity),
        })
    }

    /// Initialize the local adapter.
    pub fn initialize(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Error::SessionClosed);
        }

        inner.adapter_ready = self.transport.initialize_adapter();
        if !inner.adapter_ready {
            warn!("Unable to initialize Bluetooth adapter");
            return Err(Error::AdapterUnavailable);
        }

        debug!("Bluetooth adapter initialized");
        Ok(())
    }

    // === Accessors ===

    /// Get the current link state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Check if the session was closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Address of the peripheral the session currently owns.
    pub fn address(&self) -> Option<String> {
        self.inner.lock().address.clone()
    }

    /// The attribute directory.
    pub fn directory(&self) -> &AttributeDirectory {
        &self.directory
    }

    /// Position in the notification plan.
    pub fn notification_cursor(&self) -> usize {
        self.inner.lock().sequencer.cursor()
    }

    /// Check if every planned notification is armed.
    pub fn notifications_armed(&self) -> bool {
        self.inner.lock().sequencer.is_complete()
    }

    /// Characteristics found by the last successful discovery.
    pub fn discovered_characteristics(&self) -> Vec<CharacteristicRef> {
        self.inner.lock().discovered.iter().copied().collect()
    }

    // === Events ===

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Register a callback for every session event.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.events.on_event(callback)
    }

    /// Register a callback for readings on one channel.
    pub fn on_reading<F>(&self, channel: Channel, callback: F) -> CallbackHandle
    where
        F: Fn(&TelemetryReading) + Send + Sync + 'static,
    {
        self.events.on_reading(channel, callback)
    }

    // === Connection ===

    /// Request a link to `address`.
    ///
    /// Reconnecting to the owned address reuses the existing handle. A
    /// different address closes the current handle first. The state becomes
    /// `Connected` only once the transport confirms the link.
    pub fn connect(&self, address: &str) -> Result<()> {
        let mut inner = self.inner.lock();

        if inner.closed {
            return Err(Error::SessionClosed);
        }
        if !inner.adapter_ready {
            warn!("Bluetooth adapter not initialized");
            return Err(Error::AdapterUnavailable);
        }
        if address.trim().is_empty() || !self.transport.is_valid_address(address) {
            return Err(Error::InvalidAddress {
                address: address.to_string(),
            });
        }

        if let Some(handle) = inner.handle {
            let same_peripheral = inner
                .address
                .as_deref()
                .is_some_and(|owned| owned.eq_ignore_ascii_case(address));
            if same_peripheral {
                match inner.state {
                    SessionState::Connected => {
                        debug!("Already connected to {}", address);
                    }
                    SessionState::Connecting => {
                        debug!("Connection to {} already in progress", address);
                    }
                    SessionState::Disconnected => {
                        debug!("Reusing existing handle {} for {}", handle, address);
                        self.transport.reconnect(handle)?;
                        Self::set_state(&mut inner, SessionState::Connecting);
                    }
                }
                return Ok(());
            }

            info!(
                "Switching peripheral from {} to {}",
                inner.address.as_deref().unwrap_or("?"),
                address
            );
            self.release_link(&mut inner);
        }

        let handle = self.transport.connect(address)?;
        debug!("Opened handle {} for {}", handle, address);

        inner.handle = Some(handle);
        inner.address = Some(address.to_string());
        Self::set_state(&mut inner, SessionState::Connecting);

        Ok(())
    }

    /// Request the link to be dropped.
    ///
    /// The state becomes `Disconnected` once the transport confirms.
    pub fn disconnect(&self) -> Result<()> {
        let inner = self.inner.lock();

        if inner.closed {
            return Err(Error::SessionClosed);
        }
        let Some(handle) = inner.handle else {
            return Err(Error::NotConnected);
        };

        if inner.state == SessionState::Disconnected {
            debug!("Already disconnected");
            return Ok(());
        }

        info!(
            "Disconnecting from {}",
            inner.address.as_deref().unwrap_or("?")
        );
        self.transport.disconnect(handle);

        Ok(())
    }

    /// Tear the session down and release the transport handle.
    ///
    /// Repeated calls are no-ops. Later operations fail with
    /// [`Error::SessionClosed`].
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }

        self.release_link(&mut inner);
        inner.closed = true;
        info!("Session closed");
    }

    // === Commands ===

    /// Request a characteristic read. The value arrives as an event.
    pub fn read_characteristic(&self, service: &str, characteristic: &str) -> Result<()> {
        let inner = self.inner.lock();
        Self::ensure_open(&inner)?;
        let target = self.directory.characteristic(service, characteristic)?;
        let handle = Self::live_handle(&inner)?;

        trace!("Reading {}", target);
        self.transport.read_characteristic(handle, &target)
    }

    /// Request a characteristic write.
    pub fn write_characteristic(
        &self,
        service: &str,
        characteristic: &str,
        value: &[u8],
    ) -> Result<()> {
        let inner = self.inner.lock();
        Self::ensure_open(&inner)?;
        let target = self.directory.characteristic(service, characteristic)?;
        let handle = Self::live_handle(&inner)?;

        trace!("Writing {:02X?} to {}", value, target);
        self.transport.write_characteristic(handle, &target, value)
    }

    /// Parse a signed byte from user input and write it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `text` is not a number in
    /// `-128..=127`.
    pub fn write_characteristic_from_text(
        &self,
        service: &str,
        characteristic: &str,
        text: &str,
    ) -> Result<()> {
        let byte: i8 = text.trim().parse().map_err(|_| Error::InvalidParameter {
            name: characteristic.to_string(),
            value: text.to_string(),
        })?;

        self.write_characteristic(service, characteristic, &[byte as u8])
    }

    /// Switch the LED on.
    pub fn led_enable(&self) -> Result<()> {
        self.write_characteristic(names::LED_CONTROL, names::LED_ON_OFF, &[1])
    }

    /// Switch the speaker on.
    pub fn speaker_enable(&self) -> Result<()> {
        self.write_characteristic(names::SPEAKER_CONTROL, names::SPEAKER_ON_OFF, &[1])
    }

    /// Enable or disable notifications on a characteristic outside the
    /// bring-up plan.
    pub fn set_characteristic_notification(
        &self,
        service: &str,
        characteristic: &str,
        enabled: bool,
    ) -> Result<()> {
        let inner = self.inner.lock();
        Self::ensure_open(&inner)?;
        let target = self.directory.characteristic(service, characteristic)?;
        let handle = Self::live_handle(&inner)?;

        debug!(
            "{} notifications on {}",
            if enabled { "Enabling" } else { "Disabling" },
            target
        );
        self.transport.set_notification(handle, &target, enabled)
    }

    /// Request the current signal strength.
    pub fn read_remote_rssi(&self) -> Result<()> {
        let inner = self.inner.lock();
        let handle = Self::live_handle(&inner)?;
        self.transport.read_remote_rssi(handle)
    }

    // === Inbound events ===

    /// Process transport events until the channel closes or the session is
    /// closed.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        debug!("Session event loop started");

        while let Some(event) = events.recv().await {
            self.handle_transport_event(event);
            if self.is_closed() {
                break;
            }
        }

        debug!("Session event loop stopped");
    }

    /// Spawn [`run`](Self::run) on the current tokio runtime.
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.run(events).await })
    }

    /// Apply one transport event.
    pub fn handle_transport_event(&self, event: TransportEvent) {
        let mut inner = self.inner.lock();

        if inner.closed {
            trace!("Ignoring event on closed session: {:?}", event.kind);
            return;
        }
        if inner.handle != Some(event.handle) {
            debug!("Ignoring event for stale handle {}", event.handle);
            return;
        }

        match event.kind {
            TransportEventKind::LinkUp => {
                Self::set_state(&mut inner, SessionState::Connected);
                info!("Connected to GATT server");
                self.events.publish(SessionEvent::Connected);

                if let Err(e) = self.transport.discover_services(event.handle) {
                    warn!("Failed to start service discovery: {}", e);
                    self.report_failure(
                        TransportOperation::DiscoverServices,
                        GattStatus::Failure(GattStatus::GATT_FAILURE),
                    );
                }
            }
            TransportEventKind::LinkDown => {
                let previous = inner.state;
                if previous == SessionState::Disconnected {
                    debug!("Link already down");
                    return;
                }
                Self::set_state(&mut inner, SessionState::Disconnected);
                inner.sequencer.on_disconnected();
                inner.discovered.clear();

                if previous == SessionState::Connecting {
                    warn!(
                        "Connection to {} failed",
                        inner.address.as_deref().unwrap_or("?")
                    );
                    self.report_failure(
                        TransportOperation::Connect,
                        GattStatus::Failure(GattStatus::GATT_FAILURE),
                    );
                } else {
                    info!("Disconnected from GATT server");
                    self.events.publish(SessionEvent::Disconnected);
                }
            }
            TransportEventKind::ServicesDiscovered {
                status,
                characteristics,
            } => {
                if !status.is_success() {
                    warn!("Service discovery failed: {}", status);
                    self.report_failure(TransportOperation::DiscoverServices, status);
                    return;
                }

                debug!("Discovered {} characteristics", characteristics.len());
                inner.discovered = characteristics.into_iter().collect();
                self.events.publish(SessionEvent::ServicesDiscovered);

                if let Some(first) = inner.sequencer.on_services_discovered() {
                    self.enable_notification(event.handle, &first);
                }
            }
            TransportEventKind::DescriptorWritten {
                characteristic,
                status,
            } => {
                if !status.is_success() {
                    warn!(
                        "Enabling notifications on {} failed: {}",
                        characteristic, status
                    );
                    self.report_failure(TransportOperation::SetNotification, status);
                }

                if let Some(next) = inner.sequencer.on_enable_acknowledged(&characteristic) {
                    self.enable_notification(event.handle, &next);
                }
            }
            TransportEventKind::CharacteristicRead {
                characteristic,
                status,
                value,
            } => {
                if status.is_success() {
                    self.dispatch(&mut inner, characteristic, &value);
                } else {
                    warn!("Read of {} failed: {}", characteristic, status);
                    self.report_failure(TransportOperation::ReadCharacteristic, status);
                }
            }
            TransportEventKind::CharacteristicChanged {
                characteristic,
                value,
            } => {
                self.dispatch(&mut inner, characteristic, &value);
            }
            TransportEventKind::CharacteristicWritten {
                characteristic,
                status,
            } => {
                if status.is_success() {
                    trace!("Write to {} acknowledged", characteristic);
                } else {
                    warn!("Write to {} failed: {}", characteristic, status);
                    self.report_failure(TransportOperation::WriteCharacteristic, status);
                }
            }
            TransportEventKind::RemoteRssi { rssi, status } => {
                if status.is_success() {
                    debug!("RSSI: {} dBm", rssi);
                    self.events.publish(SessionEvent::RemoteRssi(rssi));
                } else {
                    warn!("RSSI read failed: {}", status);
                    self.report_failure(TransportOperation::ReadRemoteRssi, status);
                }
            }
        }
    }

    // === Internals ===

    fn ensure_open(inner: &SessionInner) -> Result<()> {
        if inner.closed {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    fn live_handle(inner: &SessionInner) -> Result<TransportHandle> {
        Self::ensure_open(inner)?;
        match inner.handle {
            Some(handle) if inner.state.is_connected() => Ok(handle),
            _ => Err(Error::NotConnected),
        }
    }

    /// Close the current handle and forget everything attached to it.
    fn release_link(&self, inner: &mut SessionInner) {
        if let Some(handle) = inner.handle.take() {
            debug!("Closing handle {}", handle);
            self.transport.close(handle);
        }
        inner.address = None;
        inner.sequencer.on_disconnected();
        inner.discovered.clear();

        let was_connected = inner.state.is_connected();
        Self::set_state(inner, SessionState::Disconnected);
        if was_connected {
            self.events.publish(SessionEvent::Disconnected);
        }
    }

    fn enable_notification(&self, handle: TransportHandle, characteristic: &CharacteristicRef) {
        debug!("Enabling notifications on {}", characteristic);

        // A refused request stalls the plan until the next discovery.
        if let Err(e) = self.transport.set_notification(handle, characteristic, true) {
            warn!(
                "Failed to request notifications on {}: {}",
                characteristic, e
            );
            self.report_failure(
                TransportOperation::SetNotification,
                GattStatus::Failure(GattStatus::GATT_FAILURE),
            );
        }
    }

    fn dispatch(&self, inner: &mut SessionInner, characteristic: CharacteristicRef, value: &[u8]) {
        trace!(
            "Value from {}: {} bytes, data: {:02X?}",
            characteristic,
            value.len(),
            value
        );

        let (channel, format) = match self.directory.identify(&characteristic) {
            Some(spec) => (spec.channel, spec.format),
            None => (Channel::DataAvailable, ValueFormat::RawDigits),
        };

        let value = match format.decode(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("Dropping reading from {}: {}", characteristic, e);
                return;
            }
        };

        let counter = inner.sample_counters.entry(channel).or_insert(0);
        let sample_index = *counter;
        *counter += 1;

        self.events.publish(SessionEvent::Reading(TelemetryReading {
            channel,
            characteristic,
            value,
            sample_index,
            received_at: Utc::now(),
        }));
    }

    fn report_failure(&self, operation: TransportOperation, status: GattStatus) {
        self.events
            .publish(SessionEvent::TransportError { operation, status });
    }

    fn set_state(inner: &mut SessionInner, new_state: SessionState) {
        let old_state = inner.state;
        inner.state = new_state;

        if old_state != new_state {
            debug!("Session state changed: {} -> {}", old_state, new_state);
        }
    }
}

impl Drop for GattSession {
    fn drop(&mut self) {
        self.close();
    }
}
