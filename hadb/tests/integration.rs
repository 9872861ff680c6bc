//! Integration tests for the hadb CLI.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chrono::{DateTime, Local, TimeZone};
use rusqlite::{params, Connection};
use tempfile::TempDir;

const SCHEMA: &str = "
CREATE TABLE schema_changes (change_id INTEGER PRIMARY KEY, schema_version INTEGER, changed TEXT);
CREATE TABLE state_attributes (attributes_id INTEGER PRIMARY KEY, hash INTEGER, shared_attrs TEXT);
CREATE TABLE states (
    state_id INTEGER PRIMARY KEY,
    entity_id TEXT,
    state TEXT,
    attributes TEXT,
    last_updated_ts REAL,
    old_state_id INTEGER,
    attributes_id INTEGER
);
CREATE TABLE event_data (data_id INTEGER PRIMARY KEY, hash INTEGER, shared_data TEXT);
CREATE TABLE events (
    event_id INTEGER PRIMARY KEY,
    event_type TEXT,
    event_data TEXT,
    time_fired_ts REAL,
    data_id INTEGER
);
INSERT INTO schema_changes (schema_version) VALUES (43);
";

fn at(hour: u32, minute: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2024, 1, 15, hour, minute, 0)
        .single()
        .unwrap()
}

fn epoch(ts: DateTime<Local>) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}

/// A seeded recorder database in a temp dir.
struct TestDb {
    tmp: TempDir,
    path: PathBuf,
}

impl TestDb {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("home-assistant_v2.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let add_state = |entity_id: &str, state: &str, ts: DateTime<Local>, attrs: &str, old: Option<i64>| {
            conn.execute(
                "INSERT INTO state_attributes (shared_attrs) VALUES (?1)",
                [attrs],
            )
            .unwrap();
            let attributes_id = conn.last_insert_rowid();
            conn.execute(
                "INSERT INTO states (entity_id, state, last_updated_ts, old_state_id, attributes_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![entity_id, state, epoch(ts), old, attributes_id],
            )
            .unwrap();
            conn.last_insert_rowid()
        };
        let first = add_state("sensor.x", "19.5", at(9, 0), r#"{"unit_of_measurement": "C"}"#, None);
        let second = add_state("sensor.x", "21.5", at(10, 30), r#"{"unit_of_measurement": "C"}"#, Some(first));
        add_state("sensor.x", "21.5", at(10, 45), r#"{"unit_of_measurement": "C"}"#, Some(second));
        add_state("light.kitchen", "on", at(10, 40), r#"{"brightness": 200}"#, None);

        for (event_type, ts) in [
            ("homeassistant_stop", at(8, 0)),
            ("homeassistant_start", at(8, 1)),
            ("call_service", at(10, 35)),
        ] {
            conn.execute(
                "INSERT INTO events (event_type, time_fired_ts) VALUES (?1, ?2)",
                params![event_type, epoch(ts)],
            )
            .unwrap();
        }

        Self { tmp, path }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn hadb(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_hadb"))
            .env("HADB_CONFIG", self.tmp.path().join("no-config.toml"))
            .env_remove("HADB_DATABASE")
            .env_remove("HADB_LOG")
            .arg("-d")
            .arg(self.path())
            .arg("--no-color")
            .args(args)
            .output()
            .expect("failed to run hadb")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const WINDOW: [&str; 4] = ["-S", "2024-01-15 10:00", "-E", "2024-01-15 12:00"];

#[test]
fn test_states_in_window() {
    let db = TestDb::new();
    let mut args = vec!["-s", "sensor.x"];
    args.extend(WINDOW);
    let output = db.hadb(&args);

    assert!(output.status.success(), "hadb failed: {:?}", output);
    let text = stdout(&output);
    assert!(text.contains("Schema version: 43"));
    assert!(text.contains("Showing from 2024-01-15 10:00:00.000000 to 2024-01-15 12:00:00.000000"));
    assert!(text.contains("entity_id / event_type"));
    // Previous state, then the first change; the unchanged repeat is suppressed.
    assert!(text.contains("2024-01-15 09:00:00.000000"));
    assert!(text.contains("2024-01-15 10:30:00.000000"));
    assert!(!text.contains("2024-01-15 10:45:00.000000"));
    assert!(!text.contains("light.kitchen"));
}

#[test]
fn test_repeated_state_flags() {
    let db = TestDb::new();
    let mut args = vec!["-s", "sensor.x", "unit_of_measurement", "-s", "light.kitchen"];
    args.extend(WINDOW);
    let output = db.hadb(&args);

    assert!(output.status.success(), "hadb failed: {:?}", output);
    let text = stdout(&output);
    assert!(text.contains("sensor.x"));
    assert!(text.contains("light.kitchen"));
    assert!(text.contains("unit_of_measurement"));
}

#[test]
fn test_huge_window_is_usage_error() {
    let db = TestDb::new();
    let output = db.hadb(&["-s", "sensor.x", "-W", "1e9"]);
    assert_eq!(output.status.code(), Some(2));

    let output = db.hadb(&["-s", "sensor.x", "--start-days", "4000000000"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("time window out of range"));
}

#[test]
fn test_all_states_shows_repeats() {
    let db = TestDb::new();
    let mut args = vec!["-A", "-s", "sensor.x"];
    args.extend(WINDOW);
    let output = db.hadb(&args);
    assert!(output.status.success());
    assert!(stdout(&output).contains("2024-01-15 10:45:00.000000"));
}

#[test]
fn test_attribute_columns() {
    let db = TestDb::new();
    let mut args = vec!["-s", "%.*", "-a", "unit_of_measurement"];
    args.extend(WINDOW);
    let output = db.hadb(&args);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("unit_of_measurement"));
    assert!(text.contains("light.kitchen"));
    assert!(text.contains("¿¿¿"));
}

#[test]
fn test_events_with_core_flag() {
    let db = TestDb::new();
    let output = db.hadb(&["-c", "-e", "call_service", "--start-beginning"]);
    assert!(output.status.success(), "hadb failed: {:?}", output);
    let text = stdout(&output);
    assert!(text.contains("Showing from beginning (2024-01-15 08:00:00.000000) to end (now)"));
    assert!(text.contains("## homeassistant_stop ##"));
    assert!(text.contains(" homeassistant_start "));
    assert!(text.contains(" call_service "));
}

#[test]
fn test_start_stops() {
    let db = TestDb::new();
    let output = db.hadb(&["-s", "sensor.x", "--start-stops", "1"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Showing from 2024-01-15 08:00:00.000000"));
}

#[test]
fn test_missing_stop_fails() {
    let db = TestDb::new();
    let output = db.hadb(&["-s", "sensor.x", "--start-stops", "3"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("--start-stops: could not find 3 stops"));
}

#[test]
fn test_over_specified_window_is_usage_error() {
    let db = TestDb::new();
    let mut args = vec!["-s", "sensor.x", "-W", "1"];
    args.extend(WINDOW);
    let output = db.hadb(&args);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("at most 2 of start, end & window"));
}

#[test]
fn test_conflicting_start_options() {
    let db = TestDb::new();
    let output = db.hadb(&["--start-days", "1", "--start-beginning"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_start_after_end_is_usage_error() {
    let db = TestDb::new();
    let output = db.hadb(&["-S", "2024-01-15 12:00", "-E", "2024-01-15 10:00"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("must not be after end"));
}

#[test]
fn test_bad_expressions_are_usage_errors() {
    let db = TestDb::new();

    let output = db.hadb(&["-s", "%("]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("-s argument: id: invalid regex"));

    let output = db.hadb(&["-e", "call_service=x"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("-e argument: id: filter not allowed"));

    let output = db.hadb(&["-a", "%unit.*"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("-a argument: name may not be a regex"));
}

#[test]
fn test_missing_database() {
    let tmp = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_hadb"))
        .env("HADB_CONFIG", tmp.path().join("no-config.toml"))
        .arg("-d")
        .arg(tmp.path().join("missing.db"))
        .output()
        .expect("failed to run hadb");
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Database not found"));
}

#[test]
fn test_config_file_sets_database() {
    let db = TestDb::new();
    let config = db.tmp.path().join("config.toml");
    std::fs::write(&config, format!("database = {:?}\n", db.path().display().to_string())).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_hadb"))
        .env_remove("HADB_DATABASE")
        .arg("--config")
        .arg(&config)
        .args(["--no-color", "-s", "sensor.x", "--start-beginning"])
        .output()
        .expect("failed to run hadb");
    assert!(output.status.success(), "hadb failed: {:?}", output);
    assert!(stdout(&output).contains("sensor.x"));
}
