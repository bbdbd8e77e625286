//! [`GattTransport`] over btleplug.
//!
//! Every request is spawned on the tokio runtime the transport was created
//! on, and its outcome is sent back as a [`TransportEvent`].

use btleplug::api::{
    BDAddr, Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use bytes::Bytes;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::ble::attributes::CharacteristicRef;
use crate::ble::transport::{
    GattStatus, GattTransport, TransportEvent, TransportEventKind, TransportHandle,
};
use crate::error::{Error, Result};

type EventSender = mpsc::UnboundedSender<TransportEvent>;

const FAILURE: GattStatus = GattStatus::Failure(GattStatus::GATT_FAILURE);

/// One link opened through the transport.
struct Link {
    /// Peripheral address.
    address: BDAddr,
    /// Resolved peripheral, once found.
    peripheral: Option<Peripheral>,
    /// Whether notifications are being forwarded.
    forwarding: bool,
    /// Background tasks owned by the link.
    tasks: Vec<JoinHandle<()>>,
}

impl Link {
    fn new(address: BDAddr) -> Self {
        Self {
            address,
            peripheral: None,
            forwarding: false,
            tasks: Vec::new(),
        }
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Stop the disconnect watcher and the notification forwarder.
    ///
    /// After this the caller is the only source of `LinkDown` for the link.
    fn stop(&mut self) {
        self.abort_tasks();
        self.forwarding = false;
    }
}

/// BLE transport backed by the platform adapter through btleplug.
pub struct BtleplugTransport {
    /// The adapter, if one was found.
    adapter: Option<Adapter>,
    /// Runtime requests are spawned on.
    runtime: Handle,
    /// Outbound transport events.
    events_tx: EventSender,
    /// Open links by handle.
    links: Arc<RwLock<HashMap<TransportHandle, Link>>>,
    /// Handle counter.
    next_handle: AtomicU64,
}

impl BtleplugTransport {
    /// Create a transport on the first available adapter.
    ///
    /// Returns the receiver the session should consume. A missing adapter is
    /// not an error here; it surfaces through `initialize_adapter`.
    pub async fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let adapter = match Manager::new().await {
            Ok(manager) => match manager.adapters().await {
                Ok(adapters) => adapters.into_iter().next(),
                Err(e) => {
                    warn!("Failed to list Bluetooth adapters: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Bluetooth manager unavailable: {}", e);
                None
            }
        };

        if let Some(ref adapter) = adapter {
            info!(
                "Using Bluetooth adapter: {:?}",
                adapter.adapter_info().await.ok()
            );
        }

        Self::build(adapter)
    }

    /// Create a transport on a specific adapter.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_adapter(adapter: Adapter) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        Self::build(Some(adapter))
    }

    fn build(adapter: Option<Adapter>) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let transport = Self {
            adapter,
            runtime: Handle::current(),
            events_tx,
            links: Arc::new(RwLock::new(HashMap::new())),
            next_handle: AtomicU64::new(1),
        };

        (transport, events_rx)
    }

    /// Start scanning so peripherals become connectable by address.
    pub async fn start_scan(&self) -> Result<()> {
        let adapter = self.adapter.as_ref().ok_or(Error::AdapterUnavailable)?;
        adapter.start_scan(ScanFilter::default()).await?;
        debug!("Scan started");
        Ok(())
    }

    /// Stop scanning.
    pub async fn stop_scan(&self) -> Result<()> {
        let adapter = self.adapter.as_ref().ok_or(Error::AdapterUnavailable)?;
        adapter.stop_scan().await?;
        debug!("Scan stopped");
        Ok(())
    }

    fn peripheral(&self, handle: TransportHandle) -> Result<Peripheral> {
        self.links
            .read()
            .get(&handle)
            .and_then(|link| link.peripheral.clone())
            .ok_or(Error::NotConnected)
    }

    fn track(&self, handle: TransportHandle, task: JoinHandle<()>) {
        match self.links.write().get_mut(&handle) {
            Some(link) => {
                link.tasks.retain(|t| !t.is_finished());
                link.tasks.push(task);
            }
            None => task.abort(),
        }
    }

    /// Resolve the peripheral and bring the link up.
    fn spawn_link(&self, handle: TransportHandle, address: BDAddr) -> Result<()> {
        let adapter = self.adapter.clone().ok_or(Error::AdapterUnavailable)?;
        let links = self.links.clone();
        let tx = self.events_tx.clone();

        let task = self.runtime.spawn(async move {
            let Some(peripheral) = find_peripheral(&adapter, address).await else {
                warn!("Peripheral {} not found. Unable to connect.", address);
                let _ = tx.send(TransportEvent::new(handle, TransportEventKind::LinkDown));
                return;
            };

            let still_open = {
                let mut links = links.write();
                match links.get_mut(&handle) {
                    Some(link) => {
                        link.peripheral = Some(peripheral.clone());
                        true
                    }
                    None => false,
                }
            };
            if !still_open {
                return;
            }

            let central_events = adapter.events().await;

            match peripheral.connect().await {
                Ok(()) => {
                    info!("Connected to {}", address);
                    let _ = tx.send(TransportEvent::new(handle, TransportEventKind::LinkUp));
                }
                Err(e) => {
                    warn!("Connection to {} failed: {}", address, e);
                    let _ = tx.send(TransportEvent::new(handle, TransportEventKind::LinkDown));
                    return;
                }
            }

            match central_events {
                Ok(events) => watch_disconnect(events, peripheral.id(), handle, tx).await,
                Err(e) => warn!("Cannot watch for disconnection: {}", e),
            }
        });

        self.track(handle, task);
        Ok(())
    }

    /// Forward value notifications from the peripheral, once per link.
    fn ensure_forwarding(&self, handle: TransportHandle, peripheral: Peripheral) {
        {
            let mut links = self.links.write();
            match links.get_mut(&handle) {
                Some(link) if !link.forwarding => link.forwarding = true,
                _ => return,
            }
        }

        let tx = self.events_tx.clone();
        let task = self.runtime.spawn(async move {
            let mut notifications = match peripheral.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    error!("Failed to get notifications stream: {}", e);
                    return;
                }
            };

            debug!("Notification forwarder started");
            while let Some(notification) = notifications.next().await {
                let service = peripheral
                    .characteristics()
                    .iter()
                    .find(|c| c.uuid == notification.uuid)
                    .map(|c| c.service_uuid);
                let Some(service) = service else {
                    trace!("Notification from undiscovered {}", notification.uuid);
                    continue;
                };

                let _ = tx.send(TransportEvent::new(
                    handle,
                    TransportEventKind::CharacteristicChanged {
                        characteristic: CharacteristicRef::new(service, notification.uuid),
                        value: Bytes::from(notification.value),
                    },
                ));
            }
            debug!("Notification forwarder stopped");
        });

        self.track(handle, task);
    }

    fn send(&self, handle: TransportHandle, kind: TransportEventKind) {
        let _ = self.events_tx.send(TransportEvent::new(handle, kind));
    }
}

impl GattTransport for BtleplugTransport {
    fn initialize_adapter(&self) -> bool {
        if self.adapter.is_none() {
            error!("Unable to obtain a Bluetooth adapter.");
        }
        self.adapter.is_some()
    }

    fn is_valid_address(&self, address: &str) -> bool {
        BDAddr::from_str(address).is_ok()
    }

    fn connect(&self, address: &str) -> Result<TransportHandle> {
        let address = BDAddr::from_str(address).map_err(|_| Error::InvalidAddress {
            address: address.to_string(),
        })?;
        let handle = TransportHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst));

        self.links.write().insert(handle, Link::new(address));

        debug!("Trying to create a new connection to {}", address);
        self.spawn_link(handle, address)?;
        Ok(handle)
    }

    fn reconnect(&self, handle: TransportHandle) -> Result<()> {
        let address = {
            let mut links = self.links.write();
            let link = links.get_mut(&handle).ok_or(Error::NotConnected)?;
            link.stop();
            link.address
        };

        debug!("Reconnecting handle {} to {}", handle, address);
        self.spawn_link(handle, address)
    }

    fn disconnect(&self, handle: TransportHandle) {
        let peripheral = self.links.write().get_mut(&handle).and_then(|link| {
            link.stop();
            link.peripheral.clone()
        });
        let Some(peripheral) = peripheral else {
            self.send(handle, TransportEventKind::LinkDown);
            return;
        };

        let tx = self.events_tx.clone();
        let task = self.runtime.spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                error!("Failed to disconnect: {}", e);
            }
            let _ = tx.send(TransportEvent::new(handle, TransportEventKind::LinkDown));
        });
        self.track(handle, task);
    }

    fn close(&self, handle: TransportHandle) {
        let Some(mut link) = self.links.write().remove(&handle) else {
            return;
        };
        link.abort_tasks();

        if let Some(peripheral) = link.peripheral {
            self.runtime.spawn(async move {
                if peripheral.is_connected().await.unwrap_or(false) {
                    let _ = peripheral.disconnect().await;
                }
            });
        }
        debug!("Closed handle {}", handle);
    }

    fn discover_services(&self, handle: TransportHandle) -> Result<()> {
        let peripheral = self.peripheral(handle)?;
        let tx = self.events_tx.clone();

        let discovered = peripheral.clone();
        let task = self.runtime.spawn(async move {
            let (status, characteristics) = match discovered.discover_services().await {
                Ok(()) => {
                    let chars: Vec<_> = discovered
                        .characteristics()
                        .iter()
                        .map(|c| CharacteristicRef::new(c.service_uuid, c.uuid))
                        .collect();
                    (GattStatus::Success, chars)
                }
                Err(e) => {
                    warn!("Failed to discover services: {}", e);
                    (FAILURE, Vec::new())
                }
            };

            let _ = tx.send(TransportEvent::new(
                handle,
                TransportEventKind::ServicesDiscovered {
                    status,
                    characteristics,
                },
            ));
        });
        self.track(handle, task);

        self.ensure_forwarding(handle, peripheral);
        Ok(())
    }

    fn read_characteristic(
        &self,
        handle: TransportHandle,
        characteristic: &CharacteristicRef,
    ) -> Result<()> {
        let peripheral = self.peripheral(handle)?;
        let target = *characteristic;
        let tx = self.events_tx.clone();

        let task = self.runtime.spawn(async move {
            let (status, value) = match find_characteristic(&peripheral, &target) {
                Some(c) => match peripheral.read(&c).await {
                    Ok(data) => (GattStatus::Success, Bytes::from(data)),
                    Err(e) => {
                        debug!("Read of {} failed: {}", target, e);
                        (FAILURE, Bytes::new())
                    }
                },
                None => (FAILURE, Bytes::new()),
            };

            let _ = tx.send(TransportEvent::new(
                handle,
                TransportEventKind::CharacteristicRead {
                    characteristic: target,
                    status,
                    value,
                },
            ));
        });
        self.track(handle, task);
        Ok(())
    }

    fn write_characteristic(
        &self,
        handle: TransportHandle,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) -> Result<()> {
        let peripheral = self.peripheral(handle)?;
        let target = *characteristic;
        let data = value.to_vec();
        let tx = self.events_tx.clone();

        let task = self.runtime.spawn(async move {
            let status = match find_characteristic(&peripheral, &target) {
                Some(c) => match peripheral.write(&c, &data, WriteType::WithResponse).await {
                    Ok(()) => GattStatus::Success,
                    Err(e) => {
                        debug!("Write to {} failed: {}", target, e);
                        FAILURE
                    }
                },
                None => FAILURE,
            };

            let _ = tx.send(TransportEvent::new(
                handle,
                TransportEventKind::CharacteristicWritten {
                    characteristic: target,
                    status,
                },
            ));
        });
        self.track(handle, task);
        Ok(())
    }

    fn set_notification(
        &self,
        handle: TransportHandle,
        characteristic: &CharacteristicRef,
        enabled: bool,
    ) -> Result<()> {
        let peripheral = self.peripheral(handle)?;
        let target = *characteristic;
        let tx = self.events_tx.clone();

        let task = self.runtime.spawn(async move {
            // subscribe() writes the client characteristic configuration descriptor.
            let status = match find_characteristic(&peripheral, &target) {
                Some(c) => {
                    let result = if enabled {
                        peripheral.subscribe(&c).await
                    } else {
                        peripheral.unsubscribe(&c).await
                    };
                    match result {
                        Ok(()) => GattStatus::Success,
                        Err(e) => {
                            debug!("Failed to set notifications on {}: {:?}", target, e);
                            FAILURE
                        }
                    }
                }
                None => FAILURE,
            };

            let _ = tx.send(TransportEvent::new(
                handle,
                TransportEventKind::DescriptorWritten {
                    characteristic: target,
                    status,
                },
            ));
        });
        self.track(handle, task);
        Ok(())
    }

    fn read_remote_rssi(&self, handle: TransportHandle) -> Result<()> {
        let peripheral = self.peripheral(handle)?;
        let tx = self.events_tx.clone();

        let task = self.runtime.spawn(async move {
            let rssi = peripheral
                .properties()
                .await
                .ok()
                .flatten()
                .and_then(|p| p.rssi);

            let kind = match rssi {
                Some(rssi) => TransportEventKind::RemoteRssi {
                    rssi,
                    status: GattStatus::Success,
                },
                None => TransportEventKind::RemoteRssi {
                    rssi: 0,
                    status: FAILURE,
                },
            };
            let _ = tx.send(TransportEvent::new(handle, kind));
        });
        self.track(handle, task);
        Ok(())
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        for link in self.links.write().values_mut() {
            link.abort_tasks();
        }
    }
}

async fn find_peripheral(adapter: &Adapter, address: BDAddr) -> Option<Peripheral> {
    let peripherals = match adapter.peripherals().await {
        Ok(p) => p,
        Err(e) => {
            warn!("Failed to list peripherals: {}", e);
            return None;
        }
    };

    peripherals.into_iter().find(|p| p.address() == address)
}

fn find_characteristic(peripheral: &Peripheral, target: &CharacteristicRef) -> Option<Characteristic> {
    let found = peripheral.characteristics().into_iter().find(|c| {
        c.service_uuid == target.service.uuid() && c.uuid == target.characteristic.uuid()
    });

    if found.is_none() {
        debug!("Characteristic {} not found in discovered characteristics", target);
    }
    found
}

async fn watch_disconnect(
    mut events: std::pin::Pin<Box<dyn futures::Stream<Item = CentralEvent> + Send>>,
    id: PeripheralId,
    handle: TransportHandle,
    tx: EventSender,
) {
    while let Some(event) = events.next().await {
        if let CentralEvent::DeviceDisconnected(peripheral_id) = event {
            if peripheral_id == id {
                info!("Peripheral disconnected");
                let _ = tx.send(TransportEvent::new(handle, TransportEventKind::LinkDown));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_link_stop_aborts_watchers() {
        let address = BDAddr::from_str("C0:FF:EE:00:00:01").unwrap();
        let mut link = Link::new(address);
        link.forwarding = true;
        link.tasks
            .push(tokio::spawn(futures::future::pending::<()>()));
        link.tasks
            .push(tokio::spawn(futures::future::pending::<()>()));
        let watchers: Vec<_> = link.tasks.iter().map(|t| t.abort_handle()).collect();

        link.stop();
        assert!(link.tasks.is_empty());
        assert!(!link.forwarding);

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while !watchers.iter().all(|w| w.is_finished()) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_bdaddr_validation() {
        assert!(BDAddr::from_str("C0:FF:EE:00:00:01").is_ok());
        assert!(BDAddr::from_str("").is_err());
        assert!(BDAddr::from_str("C0:FF:EE").is_err());
    }
}
