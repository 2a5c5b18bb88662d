//! Integration tests for graceful shutdown behavior.

use cpc_daq::config::Profile;
use cpc_daq::data::{ForwardSink, RowSink};
use cpc_daq::error::DaqError;
use cpc_daq::transport::{MockConnector, MockReply};
use cpc_daq::DaqApp;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Two polled channels on a fast tick, CSV output off.
fn create_test_profile() -> Profile {
    let yaml = r#"
        interval_secs: 0.05
        output:
          enabled: false
        channels:
          - name: mock1
            serial: { port: MOCK1, timeout_secs: 0.2 }
            poll_commands: ["RALL"]
            fields: [cpc_name, datetime, concentration, "1 second counts"]
            flow_rate: 100.0
            interval_secs: 0.05
          - name: mock2
            serial: { port: MOCK2, timeout_secs: 0.2 }
            poll_commands: ["RD"]
            fields: [cpc_name, datetime, concentration]
            default_flow: true
            interval_secs: 0.05
    "#;
    Profile::from_yaml_str(yaml).expect("Failed to parse test profile")
}

fn healthy_connector() -> Arc<MockConnector> {
    let mut connector = MockConnector::new();
    connector
        .add("mock1")
        .set_fallback(MockReply::Line("0,450".into()));
    connector.add("mock2").set_fallback(MockReply::Line("12.5".into()));
    Arc::new(connector)
}

fn no_sinks() -> Vec<Box<dyn RowSink>> {
    Vec::new()
}

#[test]
fn test_shutdown_signal_sent() {
    let mut app = DaqApp::new(create_test_profile()).expect("Failed to create app");
    app.start(healthy_connector(), no_sinks())
        .expect("Failed to start acquisition");
    assert!(app.is_running());

    std::thread::sleep(Duration::from_millis(200));

    let rows = app.shutdown().expect("Shutdown reported errors");
    assert!(rows > 0);
    assert!(!app.is_running());
}

#[test]
fn test_shutdown_timeout() {
    let mut app = DaqApp::new(create_test_profile()).expect("Failed to create app");
    let connector = healthy_connector();
    // reads take as long as the port timeout
    connector
        .handle("mock1")
        .unwrap()
        .set_read_delay(Duration::from_millis(200));
    app.start(connector, no_sinks()).expect("Failed to start acquisition");

    std::thread::sleep(Duration::from_millis(100));

    let start = Instant::now();
    app.shutdown().expect("Shutdown reported errors");
    let elapsed = start.elapsed();

    // one read timeout plus scheduling margin
    assert!(elapsed < Duration::from_secs(1), "Shutdown took too long: {:?}", elapsed);
}

#[test]
fn test_multiple_shutdown_calls() {
    let mut app = DaqApp::new(create_test_profile()).expect("Failed to create app");
    app.start(healthy_connector(), no_sinks())
        .expect("Failed to start acquisition");

    std::thread::sleep(Duration::from_millis(100));

    let first = app.shutdown().expect("Shutdown reported errors");
    // Second shutdown should be a no-op
    let second = app.shutdown().expect("Second shutdown failed");
    assert_eq!(first, second);
}

#[test]
fn test_shutdown_before_start() {
    let mut app = DaqApp::new(create_test_profile()).expect("Failed to create app");
    assert_eq!(app.shutdown().unwrap(), 0);
}

#[test]
fn test_start_after_shutdown_is_ignored() {
    let mut app = DaqApp::new(create_test_profile()).expect("Failed to create app");
    app.start(healthy_connector(), no_sinks()).unwrap();
    app.shutdown().unwrap();
    assert!(app.start(healthy_connector(), no_sinks()).is_ok());
    assert!(!app.is_running());
}

#[test]
fn test_drop_without_shutdown_does_not_hang() {
    let start = Instant::now();
    {
        let mut app = DaqApp::new(create_test_profile()).expect("Failed to create app");
        app.start(healthy_connector(), no_sinks()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_failed_channel_reported_at_shutdown() {
    let mut connector = MockConnector::new();
    connector
        .add("mock1")
        .set_fallback(MockReply::Line("0,450".into()));
    connector.refuse("mock2");

    let (sink, rows) = ForwardSink::channel(256);
    let mut app = DaqApp::new(create_test_profile()).expect("Failed to create app");
    app.start(Arc::new(connector), vec![Box::new(sink)]).unwrap();
    std::thread::sleep(Duration::from_millis(400));

    match app.shutdown() {
        Err(DaqError::ShutdownFailed(errors)) => {
            let names: Vec<_> = errors.iter().filter_map(|e| e.channel()).collect();
            assert_eq!(names, vec!["mock2"]);
        }
        other => panic!("expected a failed channel, got {:?}", other),
    }

    // the healthy channel kept logging; the failed one is all placeholders
    let rows: Vec<_> = rows.try_iter().collect();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| r.len() == 2));
    assert!(rows.iter().all(|r| r.records()[1].is_placeholder()));
    assert!(rows.iter().any(|r| !r.records()[0].is_placeholder()));
}
