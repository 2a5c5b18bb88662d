//! Whole-pipeline runs: profile -> workers -> synchronizer -> sinks.

use cpc_daq::config::Profile;
use cpc_daq::data::{ForwardSink, RowSink};
use cpc_daq::error::DaqError;
use cpc_daq::record::Value;
use cpc_daq::transport::{MockConnector, MockReply, SimulatedConnector};
use cpc_daq::DaqApp;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn profile(output_dir: Option<&Path>) -> Profile {
    let yaml = r#"
        interval_secs: 0.05
        queue_capacity: 4
        output:
          enabled: false
          file_prefix: TEST
        channels:
          - name: good
            serial: { port: MOCK1, timeout_secs: 0.2 }
            poll_commands: ["RALL"]
            fields: [cpc_name, datetime, concentration, "1 second counts"]
            flow_rate: 100.0
            interval_secs: 0.05
          - name: bad
            serial: { port: MOCK2, timeout_secs: 0.2 }
            poll_commands: ["RD"]
            fields: [cpc_name, datetime, bad_concentration]
            default_flow: true
            interval_secs: 0.05
    "#;
    let mut profile = Profile::from_yaml_str(yaml).expect("Failed to parse test profile");
    if let Some(dir) = output_dir {
        profile.output.enabled = true;
        profile.output.directory = dir.to_path_buf();
    }
    profile
}

fn connector() -> Arc<MockConnector> {
    let mut connector = MockConnector::new();
    connector
        .add("good")
        .set_fallback(MockReply::Line("0,450".into()));
    connector.refuse("bad");
    Arc::new(connector)
}

fn csv_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                dirs.push(path);
            } else if path.extension().is_some_and(|e| e == "csv") {
                files.push(path);
            }
        }
    }
    files
}

#[test]
fn rows_carry_normalized_values_and_placeholders() {
    let (sink, rows) = ForwardSink::channel(256);
    let sinks: Vec<Box<dyn RowSink>> = vec![Box::new(sink)];
    let mut app = DaqApp::new(profile(None)).unwrap();
    app.start(connector(), sinks).unwrap();
    std::thread::sleep(Duration::from_millis(500));

    let err = app.shutdown().unwrap_err();
    match err {
        DaqError::ShutdownFailed(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].channel(), Some("bad"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let rows: Vec<_> = rows.try_iter().collect();
    assert!(rows.len() >= 3, "only {} rows", rows.len());
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.tick(), i as u64);
        assert_eq!(row.values().count(), 7);
        assert!(row.get("bad").unwrap().is_placeholder());
    }
    let filled = rows
        .iter()
        .filter_map(|r| r.get("good"))
        .find(|r| !r.is_placeholder())
        .expect("good channel never produced a record");
    assert_eq!(filled.get("concentration"), Some(&Value::Text("4.50".into())));
    assert_eq!(filled.get("1 second counts"), Some(&Value::Text("450".into())));
}

#[cfg(feature = "storage_csv")]
#[test]
fn csv_log_has_header_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = DaqApp::new(profile(Some(dir.path()))).unwrap();
    let sinks = app.default_sinks();
    app.start(connector(), sinks).unwrap();
    std::thread::sleep(Duration::from_millis(400));
    let _ = app.shutdown();

    let files = csv_files(dir.path());
    assert_eq!(files.len(), 1, "files: {:?}", files);
    let name = files[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("TEST_"), "unexpected file name {name}");

    let content = std::fs::read_to_string(&files[0]).unwrap();
    let mut lines = content.lines();
    assert_eq!(
        lines.next(),
        Some("cpc_name,datetime,concentration,1 second counts,cpc_name,datetime,bad_concentration")
    );
    let data: Vec<_> = lines.collect();
    assert!(!data.is_empty());
    for line in &data {
        let cells: Vec<_> = line.split(',').collect();
        assert_eq!(cells.len(), 7);
        assert_eq!(&cells[4..], &["nan", "nan", "nan"]);
    }
    assert!(data.iter().any(|l| l.starts_with("good,") && l.contains(",4.50,450,")));
}

#[test]
fn simulated_instruments_fill_every_channel() {
    let yaml = r#"
        interval_secs: 0.05
        output:
          enabled: false
        channels:
          - name: sim1
            serial: { port: SIM1 }
            poll_commands: ["RALL"]
            fields: [cpc_name, datetime, concentration, "1 second counts"]
            flow_rate: 16.67
            interval_secs: 0.05
          - name: sim2
            serial: { port: SIM2 }
            fields: [cpc_name, datetime, sim2_concentration]
            default_flow: true
            interval_secs: 0.05
    "#;
    let profile = Profile::from_yaml_str(yaml).unwrap();
    let (sink, rows) = ForwardSink::channel(256);
    let mut app = DaqApp::new(profile).unwrap();
    let connector = Arc::new(SimulatedConnector::new().with_latency(Duration::from_millis(1)));
    app.start(connector, vec![Box::new(sink)]).unwrap();
    std::thread::sleep(Duration::from_millis(600));
    assert!(app.shutdown().unwrap() > 0);

    let rows: Vec<_> = rows.try_iter().collect();
    for name in ["sim1", "sim2"] {
        assert!(
            rows.iter().any(|r| !r.get(name).unwrap().is_placeholder()),
            "{name} never reported"
        );
    }
}
