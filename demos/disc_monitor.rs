//! Disc telemetry monitor example
//!
//! Connects to a disc, turns on its LED, and prints the flight telemetry
//! as the notifications arrive.
//!
//! Run with: cargo run --example disc_monitor -- --address C0:FF:EE:00:00:01
//!
//! The address can also be given through the `DISC_ADDRESS` environment
//! variable.

use disc_gatt_client::{
    BtleplugTransport, Channel, Error, GattSession, Result, SessionConfig, SessionEvent,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("disc_gatt_client=debug".parse().unwrap()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let address = args
        .iter()
        .position(|arg| arg == "--address")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .or_else(|| std::env::var("DISC_ADDRESS").ok())
        .ok_or_else(|| Error::InvalidParameter {
            name: "address".to_string(),
            value: "pass --address or set DISC_ADDRESS".to_string(),
        })?;

    println!("Disc Monitor");
    println!("============\n");

    let (transport, transport_events) = BtleplugTransport::new().await;
    transport.start_scan().await?;

    // The peripheral must be seen by a scan before connecting on some platforms
    println!("Scanning for {}...", address);
    tokio::time::sleep(Duration::from_secs(5)).await;
    transport.stop_scan().await?;

    let session = Arc::new(GattSession::new(
        Arc::new(transport),
        SessionConfig::default(),
    )?);
    session.initialize()?;
    let event_loop = session.spawn_event_loop(transport_events);

    let _lifecycle = session.on_event(|event| match event {
        SessionEvent::Connected => println!("Connected"),
        SessionEvent::Disconnected => println!("Disconnected"),
        SessionEvent::ServicesDiscovered => println!("Services discovered, arming telemetry"),
        SessionEvent::RemoteRssi(rssi) => println!("RSSI: {} dBm", rssi),
        SessionEvent::TransportError { operation, status } => {
            eprintln!("Transport error during {}: {}", operation, status)
        }
        SessionEvent::Reading(_) => {}
    });

    let _tof = session.on_reading(Channel::DiscTimeOfFlight, |reading| {
        match reading.flight_seconds() {
            Some(seconds) => println!("Flight time: {:.1} s", seconds),
            None => println!("Flight time: {}", reading.display_value()),
        }
    });
    let _rt = session.on_reading(Channel::DiscAngularVelocityRealTime, |reading| {
        println!("Spin (real time): {}", reading.display_value());
    });
    let _avg = session.on_reading(Channel::DiscAngularVelocityAverage, |reading| {
        println!("Spin (average):   {}", reading.display_value());
    });

    session.connect(&address)?;

    // The link takes one attribute write at a time; wait for the telemetry
    // notifications to be armed before writing the LED.
    let armed = tokio::time::timeout(Duration::from_secs(20), async {
        while !session.notifications_armed() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    match armed {
        Ok(()) => session.led_enable()?,
        Err(_) => eprintln!("Telemetry not armed yet, leaving the LED off"),
    }

    println!("Monitoring for 60 seconds. Press Ctrl+C to stop.\n");
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(60)) => {}
        _ = tokio::signal::ctrl_c() => println!("\nStopping..."),
    }

    if session.is_connected() {
        session.read_remote_rssi()?;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    session.close();
    event_loop.abort();
    Ok(())
}
