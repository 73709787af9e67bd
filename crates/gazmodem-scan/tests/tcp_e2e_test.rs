//! End-to-end scan over TCP against the bus simulator
//!
//! Runs in real time with short timeouts.

use std::sync::Arc;
use std::time::Duration;

use gazmodem_scan::{
    DiscoveryPhase, ErrorKind, RawValue, ScanConfig, ScanEvent, ScanSession, SessionPhase,
    TcpConfig, TransportConfig,
};
use gazmodem_sim::{serve, ServerOptions, SimDevice, SimParameter, SimulatedBus};
use pretty_assertions::assert_eq;
use tokio::net::TcpListener;

async fn start_bridge(bus: SimulatedBus, options: ServerOptions) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(serve(listener, Arc::new(bus), options));
    port
}

fn config(port: u16) -> ScanConfig {
    ScanConfig {
        transport: TransportConfig::Tcp(TcpConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_ms: 2000,
        }),
        sniff_duration_ms: 600,
        read_timeout_ms: 100,
        request_timeout_ms: 150,
        request_gap_ms: 0,
        empty_skip_threshold: 5,
        max_index: 100,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_discover_and_scan_demo_installation() {
    let port = start_bridge(
        SimulatedBus::demo(),
        ServerOptions {
            chatter_interval: Some(Duration::from_millis(100)),
            response_delay: Duration::ZERO,
        },
    )
    .await;

    let session = ScanSession::new(config(port)).unwrap();
    let mut rx = session.subscribe();
    let report = session.run().await;

    assert_eq!(report.outcome, SessionPhase::Complete);

    let sniffed: Vec<u16> = report
        .devices
        .iter()
        .filter(|d| d.discovered_phase == DiscoveryPhase::Sniffed)
        .map(|d| d.address)
        .collect();
    assert!(sniffed.contains(&1), "sniffed {:?}", sniffed);
    assert!(sniffed.contains(&32), "sniffed {:?}", sniffed);

    // boiler block is 0..=13; index 30 lies beyond a gap wider than the threshold
    let boiler: Vec<_> = report.parameters_for(1).collect();
    assert_eq!(boiler.len(), 14);
    assert_eq!(boiler[0].name, "Soft");
    assert_eq!(boiler[0].raw_value, RawValue::Text("v1.20.41".to_string()));
    let tzadco = boiler.iter().find(|r| r.name == "TzadCO").unwrap();
    assert_eq!(tzadco.final_value, Some(65.0));
    assert!(tzadco.read_write);
    assert!(boiler.iter().any(|r| r.warning.is_some()));

    let mixer: Vec<_> = report.parameters_for(32).collect();
    assert_eq!(mixer.len(), 4);
    assert_eq!(mixer[1].unit, "°C");

    let mut saw_unknown_type = false;
    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        if let ScanEvent::Error {
            kind: ErrorKind::UnknownType,
            ..
        } = &event
        {
            saw_unknown_type = true;
        }
        last = Some(event);
    }
    assert!(saw_unknown_type);
    assert!(matches!(last, Some(ScanEvent::SessionEnded { .. })));
}

#[tokio::test]
async fn test_silent_bridge_falls_back() {
    let bus = SimulatedBus::new().with_device(
        SimDevice::new(100, "thermostat").with(0, SimParameter::float("Tpok", "°C", 0, 21.5)),
    );
    let port = start_bridge(
        bus,
        ServerOptions {
            chatter_interval: None,
            response_delay: Duration::ZERO,
        },
    )
    .await;

    let config = ScanConfig {
        sniff_duration_ms: 200,
        ..config(port)
    };
    let report = ScanSession::new(config).unwrap().run().await;

    assert!(report.is_complete());
    assert_eq!(
        report.devices.iter().map(|d| d.address).collect::<Vec<_>>(),
        vec![1, 100]
    );
    assert_eq!(report.parameters.len(), 1);
    assert_eq!(report.parameters[0].final_value, Some(21.5));
}

#[tokio::test]
async fn test_slow_bridge_answers_keep_their_index() {
    let bus = SimulatedBus::new().with_device(
        SimDevice::new(1, "boiler")
            .with(0, SimParameter::text("AAA", "x"))
            .with(1, SimParameter::text("BBB", "y"))
            .with(2, SimParameter::text("CCC", "z")),
    );
    let port = start_bridge(
        bus,
        ServerOptions {
            chatter_interval: None,
            response_delay: Duration::from_millis(150),
        },
    )
    .await;

    let config = ScanConfig {
        sniff_duration_ms: 0,
        addresses: vec![1],
        request_timeout_ms: 100,
        read_timeout_ms: 100,
        request_gap_ms: 10,
        max_index: 3,
        ..config(port)
    };
    let report = ScanSession::new(config).unwrap().run().await;

    assert!(report.is_complete());
    for record in &report.parameters {
        let expected = ["AAA", "BBB", "CCC"][record.index as usize];
        assert_eq!(record.name, expected, "index {}", record.index);
    }
    assert_eq!(report.parameters.len(), 3);
}
