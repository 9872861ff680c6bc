//! Recorder database fixture for tests.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use rusqlite::{params, Connection, OptionalExtension};
use tempfile::TempDir;

use super::{to_epoch, Recorder};

const SCHEMA: &str = "
CREATE TABLE schema_changes (
    change_id INTEGER PRIMARY KEY,
    schema_version INTEGER,
    changed TEXT
);
CREATE TABLE state_attributes (
    attributes_id INTEGER PRIMARY KEY,
    hash INTEGER,
    shared_attrs TEXT
);
CREATE TABLE states (
    state_id INTEGER PRIMARY KEY,
    entity_id TEXT,
    state TEXT,
    attributes TEXT,
    last_updated_ts REAL,
    old_state_id INTEGER,
    attributes_id INTEGER
);
CREATE TABLE event_data (
    data_id INTEGER PRIMARY KEY,
    hash INTEGER,
    shared_data TEXT
);
CREATE TABLE events (
    event_id INTEGER PRIMARY KEY,
    event_type TEXT,
    event_data TEXT,
    time_fired_ts REAL,
    data_id INTEGER
);
INSERT INTO schema_changes (schema_version) VALUES (43);
";

/// Local time on a fixed test day.
pub fn at(hour: u32, minute: u32) -> DateTime<Local> {
    on(15, hour, minute)
}

/// Local time on a given day of the test month.
pub fn on(day: u32, hour: u32, minute: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2024, 1, day, hour, minute, 0)
        .single()
        .unwrap()
}

/// A recorder database in a temp dir, seeded through a writable connection.
pub struct RecorderFixture {
    _tmp: TempDir,
    path: PathBuf,
    conn: Connection,
}

impl RecorderFixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("home-assistant_v2.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        Self {
            _tmp: tmp,
            path,
            conn,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn recorder(&self) -> Recorder {
        Recorder::open(&self.path).unwrap()
    }

    /// Insert a state linked to the entity's previous row; returns its state_id.
    pub fn add_state(
        &self,
        entity_id: &str,
        state: &str,
        ts: DateTime<Local>,
        attrs: Option<&str>,
    ) -> i64 {
        let old_state_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT MAX(state_id) FROM states WHERE entity_id = ?1",
                [entity_id],
                |row| row.get(0),
            )
            .optional()
            .unwrap()
            .flatten();
        let attributes_id = attrs.map(|attrs| {
            self.conn
                .execute(
                    "INSERT INTO state_attributes (shared_attrs) VALUES (?1)",
                    [attrs],
                )
                .unwrap();
            self.conn.last_insert_rowid()
        });
        self.conn
            .execute(
                "INSERT INTO states (entity_id, state, last_updated_ts, old_state_id, attributes_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![entity_id, state, to_epoch(ts), old_state_id, attributes_id],
            )
            .unwrap();
        self.conn.last_insert_rowid()
    }

    /// Insert `count` entities named `{prefix}{i}`, each with a row at
    /// `before` and a linked row at `after`, in one transaction.
    pub fn add_linked_entities(
        &self,
        prefix: &str,
        count: usize,
        before: DateTime<Local>,
        after: DateTime<Local>,
    ) {
        let tx = self.conn.unchecked_transaction().unwrap();
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO states (entity_id, state, last_updated_ts, old_state_id) \
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .unwrap();
            for i in 0..count {
                let entity_id = format!("{prefix}{i}");
                stmt.execute(params![entity_id, "old", to_epoch(before), None::<i64>])
                    .unwrap();
                let old_state_id = tx.last_insert_rowid();
                stmt.execute(params![entity_id, "new", to_epoch(after), old_state_id])
                    .unwrap();
            }
        }
        tx.commit().unwrap();
    }

    /// Insert one event for each of `count` types named `{prefix}{i}`, in one transaction.
    pub fn add_event_types(&self, prefix: &str, count: usize, ts: DateTime<Local>) {
        let tx = self.conn.unchecked_transaction().unwrap();
        {
            let mut stmt = tx
                .prepare("INSERT INTO events (event_type, time_fired_ts) VALUES (?1, ?2)")
                .unwrap();
            for i in 0..count {
                stmt.execute(params![format!("{prefix}{i}"), to_epoch(ts)])
                    .unwrap();
            }
        }
        tx.commit().unwrap();
    }

    /// Clear a state's back-reference to its predecessor.
    pub fn unlink(&self, state_id: i64) {
        self.conn
            .execute(
                "UPDATE states SET old_state_id = NULL WHERE state_id = ?1",
                [state_id],
            )
            .unwrap();
    }

    pub fn add_event(&self, event_type: &str, ts: DateTime<Local>, data: Option<&str>) {
        let data_id = data.map(|data| {
            self.conn
                .execute("INSERT INTO event_data (shared_data) VALUES (?1)", [data])
                .unwrap();
            self.conn.last_insert_rowid()
        });
        self.conn
            .execute(
                "INSERT INTO events (event_type, time_fired_ts, data_id) VALUES (?1, ?2, ?3)",
                params![event_type, to_epoch(ts), data_id],
            )
            .unwrap();
    }
}
