//! End-to-end session behavior against a recording transport.

use bytes::Bytes;
use disc_gatt_client::ble::uuids::*;
use disc_gatt_client::{
    names, CharacteristicName, CharacteristicRef, Channel, Error, GattSession, GattStatus,
    GattTransport, Result, SessionConfig, SessionEvent, SessionState, TelemetryValue,
    TransportEvent, TransportEventKind, TransportHandle,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

const ADDRESS: &str = "C0:FF:EE:00:00:01";
const OTHER_ADDRESS: &str = "C0:FF:EE:00:00:02";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Connect(String),
    Reconnect(TransportHandle),
    Disconnect(TransportHandle),
    Close(TransportHandle),
    DiscoverServices(TransportHandle),
    Read(CharacteristicRef),
    Write(CharacteristicRef, Vec<u8>),
    SetNotification(CharacteristicRef, bool),
    ReadRssi,
}

#[derive(Default)]
struct RecordingTransport {
    commands: Mutex<Vec<Command>>,
    next_handle: AtomicU64,
}

impl RecordingTransport {
    fn commands(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    fn enables(&self) -> Vec<CharacteristicRef> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                Command::SetNotification(c, true) => Some(c),
                _ => None,
            })
            .collect()
    }

    fn record(&self, command: Command) {
        self.commands.lock().push(command);
    }
}

impl GattTransport for RecordingTransport {
    fn initialize_adapter(&self) -> bool {
        true
    }

    fn is_valid_address(&self, address: &str) -> bool {
        address.split(':').count() == 6
    }

    fn connect(&self, address: &str) -> Result<TransportHandle> {
        self.record(Command::Connect(address.to_string()));
        Ok(TransportHandle::new(
            self.next_handle.fetch_add(1, Ordering::SeqCst) + 1,
        ))
    }

    fn reconnect(&self, handle: TransportHandle) -> Result<()> {
        self.record(Command::Reconnect(handle));
        Ok(())
    }

    fn disconnect(&self, handle: TransportHandle) {
        self.record(Command::Disconnect(handle));
    }

    fn close(&self, handle: TransportHandle) {
        self.record(Command::Close(handle));
    }

    fn discover_services(&self, handle: TransportHandle) -> Result<()> {
        self.record(Command::DiscoverServices(handle));
        Ok(())
    }

    fn read_characteristic(
        &self,
        _handle: TransportHandle,
        characteristic: &CharacteristicRef,
    ) -> Result<()> {
        self.record(Command::Read(*characteristic));
        Ok(())
    }

    fn write_characteristic(
        &self,
        _handle: TransportHandle,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) -> Result<()> {
        self.record(Command::Write(*characteristic, value.to_vec()));
        Ok(())
    }

    fn set_notification(
        &self,
        _handle: TransportHandle,
        characteristic: &CharacteristicRef,
        enabled: bool,
    ) -> Result<()> {
        self.record(Command::SetNotification(*characteristic, enabled));
        Ok(())
    }

    fn read_remote_rssi(&self, _handle: TransportHandle) -> Result<()> {
        self.record(Command::ReadRssi);
        Ok(())
    }
}

fn tof() -> CharacteristicRef {
    CharacteristicRef::new(DISC_STATS_SERVICE_UUID, DISC_TOF_UUID)
}

fn ang_avg() -> CharacteristicRef {
    CharacteristicRef::new(DISC_STATS_SERVICE_UUID, DISC_ANG_AVG_UUID)
}

fn ang_rt() -> CharacteristicRef {
    CharacteristicRef::new(DISC_STATS_SERVICE_UUID, DISC_ANG_RT_UUID)
}

fn new_session() -> (Arc<RecordingTransport>, GattSession) {
    let transport = Arc::new(RecordingTransport::default());
    let session = GattSession::new(transport.clone(), SessionConfig::default()).unwrap();
    session.initialize().unwrap();
    (transport, session)
}

fn event(handle: TransportHandle, kind: TransportEventKind) -> TransportEvent {
    TransportEvent::new(handle, kind)
}

fn discovered(handle: TransportHandle) -> TransportEvent {
    event(
        handle,
        TransportEventKind::ServicesDiscovered {
            status: GattStatus::Success,
            characteristics: vec![tof(), ang_avg(), ang_rt()],
        },
    )
}

fn acked(handle: TransportHandle, characteristic: CharacteristicRef) -> TransportEvent {
    event(
        handle,
        TransportEventKind::DescriptorWritten {
            characteristic,
            status: GattStatus::Success,
        },
    )
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[test]
fn connect_discover_and_decode_time_of_flight() {
    let (transport, session) = new_session();
    let mut rx = session.subscribe();
    let h = TransportHandle::new(1);

    session.connect(ADDRESS).unwrap();
    assert_eq!(session.state(), SessionState::Connecting);

    session.handle_transport_event(event(h, TransportEventKind::LinkUp));
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(
        transport.commands(),
        vec![
            Command::Connect(ADDRESS.to_string()),
            Command::DiscoverServices(h)
        ]
    );

    session.handle_transport_event(discovered(h));
    assert_eq!(transport.enables(), vec![tof()]);

    session.handle_transport_event(acked(h, tof()));
    assert_eq!(transport.enables(), vec![tof(), ang_avg()]);

    session.handle_transport_event(event(
        h,
        TransportEventKind::CharacteristicChanged {
            characteristic: tof(),
            value: Bytes::from_static(&[0, 0, 0, 0, 20, 0]),
        },
    ));

    let events = drain(&mut rx);
    assert_eq!(events[0], SessionEvent::Connected);
    assert_eq!(events[1], SessionEvent::ServicesDiscovered);

    let reading = events[2].reading().expect("time-of-flight reading");
    assert_eq!(events[2].name(), "disc_tof");
    assert_eq!(reading.channel, Channel::DiscTimeOfFlight);
    assert_eq!(reading.characteristic, tof());
    assert_eq!(reading.value, TelemetryValue::Signed(20));
    assert_eq!(reading.display_value(), "20");
    assert_eq!(reading.flight_seconds(), Some(10.0));
    assert_eq!(events.len(), 3);
}

#[test]
fn notification_plan_is_serialized_and_restarts() {
    let (transport, session) = new_session();
    let h = TransportHandle::new(1);

    session.connect(ADDRESS).unwrap();
    session.handle_transport_event(event(h, TransportEventKind::LinkUp));
    session.handle_transport_event(discovered(h));

    // Duplicate ack for the first entry after it was passed is ignored.
    session.handle_transport_event(acked(h, tof()));
    session.handle_transport_event(acked(h, tof()));
    session.handle_transport_event(acked(h, ang_avg()));
    session.handle_transport_event(acked(h, ang_rt()));
    session.handle_transport_event(acked(h, ang_rt()));

    assert_eq!(transport.enables(), vec![tof(), ang_avg(), ang_rt()]);
    assert!(session.notifications_armed());
    assert_eq!(session.notification_cursor(), 3);

    // Link drops mid-flight, then comes back.
    session.handle_transport_event(event(h, TransportEventKind::LinkDown));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.notification_cursor(), 0);
    assert!(session.discovered_characteristics().is_empty());

    session.connect(ADDRESS).unwrap();
    session.handle_transport_event(event(h, TransportEventKind::LinkUp));
    session.handle_transport_event(discovered(h));

    assert_eq!(
        transport.enables(),
        vec![tof(), ang_avg(), ang_rt(), tof()]
    );
    assert!(transport.commands().contains(&Command::Reconnect(h)));
}

#[test]
fn failed_enable_ack_still_advances() {
    let (transport, session) = new_session();
    let mut rx = session.subscribe();
    let h = TransportHandle::new(1);

    session.connect(ADDRESS).unwrap();
    session.handle_transport_event(event(h, TransportEventKind::LinkUp));
    session.handle_transport_event(discovered(h));
    session.handle_transport_event(event(
        h,
        TransportEventKind::DescriptorWritten {
            characteristic: tof(),
            status: GattStatus::Failure(0x03),
        },
    ));

    assert_eq!(transport.enables(), vec![tof(), ang_avg()]);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| e.name() == "transport_error"));
}

#[test]
fn switching_address_never_reuses_old_handle() {
    let (transport, session) = new_session();
    let first = TransportHandle::new(1);
    let second = TransportHandle::new(2);

    session.connect(ADDRESS).unwrap();
    session.handle_transport_event(event(first, TransportEventKind::LinkUp));

    session.connect(OTHER_ADDRESS).unwrap();
    assert_eq!(session.address().as_deref(), Some(OTHER_ADDRESS));

    let commands = transport.commands();
    let close_at = commands
        .iter()
        .position(|c| *c == Command::Close(first))
        .expect("old handle closed");
    let connect_at = commands
        .iter()
        .position(|c| *c == Command::Connect(OTHER_ADDRESS.to_string()))
        .expect("new connection opened");
    assert!(close_at < connect_at);
    assert!(!commands.contains(&Command::Reconnect(first)));

    // Events from the old link no longer affect the session.
    session.handle_transport_event(event(first, TransportEventKind::LinkUp));
    assert_eq!(session.state(), SessionState::Connecting);

    session.handle_transport_event(event(second, TransportEventKind::LinkUp));
    assert_eq!(session.state(), SessionState::Connected);
}

#[test]
fn commands_without_link_make_no_transport_call() {
    let (transport, session) = new_session();

    assert!(matches!(
        session.read_characteristic(names::LED_CONTROL, names::LED_DURATION),
        Err(Error::NotConnected)
    ));
    assert!(matches!(
        session.write_characteristic(names::LED_CONTROL, names::LED_DURATION, &[4]),
        Err(Error::NotConnected)
    ));
    assert!(matches!(session.speaker_enable(), Err(Error::NotConnected)));
    assert!(transport.commands().is_empty());
}

#[test]
fn outbound_commands_resolve_names() {
    let (transport, session) = new_session();
    let h = TransportHandle::new(1);

    session.connect(ADDRESS).unwrap();
    session.handle_transport_event(event(h, TransportEventKind::LinkUp));

    session.led_enable().unwrap();
    session
        .read_characteristic(names::SPEAKER_CONTROL, names::SPEAKER_PITCH)
        .unwrap();
    session
        .set_characteristic_notification(names::LED_CONTROL, names::LED_BLINK_RATE, false)
        .unwrap();
    session.read_remote_rssi().unwrap();

    let commands = transport.commands();
    assert_eq!(
        &commands[2..],
        &[
            Command::Write(
                CharacteristicRef::new(LED_CONTROL_SERVICE_UUID, LED_ON_OFF_UUID),
                vec![1]
            ),
            Command::Read(CharacteristicRef::new(
                SPEAKER_CONTROL_SERVICE_UUID,
                SPEAKER_PITCH_UUID
            )),
            Command::SetNotification(
                CharacteristicRef::new(LED_CONTROL_SERVICE_UUID, LED_BLINK_RATE_UUID),
                false
            ),
            Command::ReadRssi,
        ]
    );
}

#[test]
fn close_releases_handle_once() {
    let (transport, session) = new_session();
    let mut rx = session.subscribe();
    let h = TransportHandle::new(1);

    session.connect(ADDRESS).unwrap();
    session.handle_transport_event(event(h, TransportEventKind::LinkUp));

    session.close();
    session.close();
    drop(session);

    let closes = transport
        .commands()
        .into_iter()
        .filter(|c| matches!(c, Command::Close(_)))
        .count();
    assert_eq!(closes, 1);
    assert_eq!(
        drain(&mut rx),
        vec![SessionEvent::Connected, SessionEvent::Disconnected]
    );
}

#[test]
fn custom_plan_order_is_preserved() {
    let transport = Arc::new(RecordingTransport::default());
    let config = SessionConfig::default().with_notification_plan(vec![
        CharacteristicName::new(names::DISC_STATS, names::DISC_ANG_RT),
        CharacteristicName::new(names::DISC_STATS, names::DISC_TOF),
    ]);
    let session = GattSession::new(transport.clone(), config).unwrap();
    session.initialize().unwrap();
    let h = TransportHandle::new(1);

    session.connect(ADDRESS).unwrap();
    session.handle_transport_event(event(h, TransportEventKind::LinkUp));
    session.handle_transport_event(discovered(h));
    session.handle_transport_event(acked(h, ang_rt()));
    session.handle_transport_event(acked(h, tof()));

    assert_eq!(transport.enables(), vec![ang_rt(), tof()]);
    assert!(session.notifications_armed());
}

#[tokio::test]
async fn event_loop_applies_events_in_order() {
    let transport = Arc::new(RecordingTransport::default());
    let session = Arc::new(GattSession::new(transport.clone(), SessionConfig::default()).unwrap());
    session.initialize().unwrap();
    let mut rx = session.subscribe();

    let (tx, events) = mpsc::unbounded_channel();
    let task = session.spawn_event_loop(events);
    let h = TransportHandle::new(1);

    session.connect(ADDRESS).unwrap();
    tx.send(event(h, TransportEventKind::LinkUp)).unwrap();
    tx.send(discovered(h)).unwrap();
    tx.send(acked(h, tof())).unwrap();
    for raw in [[0u8, 0, 0, 0, 0x10, 0x00], [0, 0, 0, 0, 0xF0, 0xFF]] {
        tx.send(event(
            h,
            TransportEventKind::CharacteristicChanged {
                characteristic: ang_rt(),
                value: Bytes::copy_from_slice(&raw),
            },
        ))
        .unwrap();
    }

    let mut readings = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), async {
        while readings.len() < 2 {
            if let SessionEvent::Reading(r) = rx.recv().await.unwrap() {
                readings.push((r.value.as_i16(), r.sample_index));
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(readings, vec![(Some(16), 0), (Some(-16), 1)]);
    assert_eq!(transport.enables(), vec![tof(), ang_avg()]);

    session.close();
    drop(tx);
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}
