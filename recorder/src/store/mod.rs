//! Recorder - read-only access to the Home Assistant recorder database.
//!
//! Uses a single SQLite connection opened read-only. Row-level queries live
//! in the `states` and `events` submodules.

mod events;
mod states;

use std::path::Path;

use chrono::{DateTime, Local};
use rusqlite::{types::Value as SqlValue, Connection, OpenFlags, OptionalExtension};

use crate::schema::{RawItems, STOP_EVENT};
use crate::window::LogAnchors;
use crate::{Error, Result};

pub use events::EventFilters;
pub use states::{StateFilters, StateQuery};

/// A read-only session on the recorder database.
pub struct Recorder {
    conn: Connection,
}

impl Recorder {
    /// Open the database at `path` read-only.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        tracing::debug!(path = %path.display(), "opened recorder database");
        Ok(Self { conn })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Close the connection, reporting any error.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Sqlite(e))
    }

    /// Latest schema version recorded in `schema_changes`.
    pub fn schema_version(&self) -> Result<Option<i64>> {
        let version = self
            .conn
            .query_row(
                "SELECT schema_version FROM schema_changes ORDER BY schema_version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    /// All distinct non-null values of a text column.
    fn distinct(&self, column: &str, table: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {column} FROM {table} WHERE {column} IS NOT NULL ORDER BY {column}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let values = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(values)
    }

    /// Oldest value of a timestamp column.
    fn oldest_ts(&self, column: &str, table: &str) -> Result<Option<DateTime<Local>>> {
        let sql = format!(
            "SELECT {column} FROM {table} WHERE {column} IS NOT NULL ORDER BY {column} LIMIT 1"
        );
        let ts: Option<f64> = self.conn.query_row(&sql, [], |row| row.get(0)).optional()?;
        Ok(ts.and_then(from_epoch))
    }

    /// Oldest state update or event in the whole log.
    pub fn find_oldest(&self) -> Result<Option<DateTime<Local>>> {
        let oldest_state = self.oldest_ts("last_updated_ts", "states")?;
        let oldest_event = self.oldest_ts("time_fired_ts", "events")?;
        Ok(match (oldest_state, oldest_event) {
            (Some(s), Some(e)) => Some(s.min(e)),
            (s, e) => s.or(e),
        })
    }

    /// When Home Assistant stopped `stops` times ago.
    pub fn find_stop(&self, stops: u32) -> Result<Option<DateTime<Local>>> {
        let mut stmt = self.conn.prepare(
            "SELECT time_fired_ts FROM events WHERE event_type = ?1 \
             ORDER BY time_fired_ts DESC LIMIT ?2",
        )?;
        let times = stmt
            .query_map(rusqlite::params![STOP_EVENT, stops], |row| row.get::<_, f64>(0))?
            .collect::<rusqlite::Result<Vec<f64>>>()?;
        if times.len() != stops as usize {
            return Ok(None);
        }
        Ok(times.last().copied().and_then(from_epoch))
    }
}

impl LogAnchors for Recorder {
    type Error = Error;

    fn nth_stop(&self, stops: u32) -> Result<Option<DateTime<Local>>> {
        self.find_stop(stops)
    }

    fn oldest(&self) -> Result<Option<DateTime<Local>>> {
        self.find_oldest()
    }
}

/// Convert a recorder epoch timestamp to local time.
pub(crate) fn from_epoch(ts: f64) -> Option<DateTime<Local>> {
    DateTime::from_timestamp_micros((ts * 1_000_000.0).round() as i64)
        .map(|dt| dt.with_timezone(&Local))
}

/// Convert local time to a recorder epoch timestamp.
pub(crate) fn to_epoch(dt: DateTime<Local>) -> f64 {
    dt.timestamp_micros() as f64 / 1_000_000.0
}

/// Read a timestamp column, failing the row if it is out of range.
pub(crate) fn get_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Local>> {
    let ts: f64 = row.get(idx)?;
    from_epoch(ts).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ts as i64))
}

/// Decode a JSON items column. Unparseable data is logged and treated as empty.
pub(crate) fn parse_items(text: Option<String>) -> RawItems {
    let Some(text) = text else {
        return RawItems::new();
    };
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(serde_json::Value::Object(items)) => items,
        Ok(other) => {
            tracing::warn!(data = %other, "items are not a JSON object, ignoring");
            RawItems::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not parse items JSON, ignoring");
            RawItems::new()
        }
    }
}

/// Most keys bound in one statement; SQLite caps bound parameters at 32766.
pub(crate) const MAX_KEYS_PER_QUERY: usize = 30_000;

/// A WHERE clause with its bound parameters.
#[derive(Debug, Default)]
pub(crate) struct WhereClause {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl WhereClause {
    /// Build `WHERE key IN (...) AND ts >= start AND ts < end`, skipping empty parts.
    pub fn new(
        key_col: &str,
        keys: Vec<SqlValue>,
        ts_col: &str,
        start: Option<DateTime<Local>>,
        end: Option<DateTime<Local>>,
    ) -> Self {
        let mut exprs = Vec::new();
        let mut params = Vec::new();
        match keys.len() {
            0 => {}
            1 => exprs.push(format!("{key_col} = ?")),
            n => exprs.push(format!("{key_col} IN ({})", vec!["?"; n].join(", "))),
        }
        params.extend(keys);
        if let Some(start) = start {
            exprs.push(format!("{ts_col} >= ?"));
            params.push(SqlValue::Real(to_epoch(start)));
        }
        if let Some(end) = end {
            exprs.push(format!("{ts_col} < ?"));
            params.push(SqlValue::Real(to_epoch(end)));
        }
        let sql = if exprs.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", exprs.join(" AND "))
        };
        Self { sql, params }
    }

    /// One clause per chunk of at most [`MAX_KEYS_PER_QUERY`] keys.
    pub fn chunked(
        key_col: &str,
        keys: Vec<SqlValue>,
        ts_col: &str,
        start: Option<DateTime<Local>>,
        end: Option<DateTime<Local>>,
    ) -> Vec<Self> {
        Self::chunked_by(MAX_KEYS_PER_QUERY, key_col, keys, ts_col, start, end)
    }

    fn chunked_by(
        size: usize,
        key_col: &str,
        keys: Vec<SqlValue>,
        ts_col: &str,
        start: Option<DateTime<Local>>,
        end: Option<DateTime<Local>>,
    ) -> Vec<Self> {
        if keys.is_empty() {
            return vec![Self::new(key_col, keys, ts_col, start, end)];
        }
        keys.chunks(size)
            .map(|chunk| Self::new(key_col, chunk.to_vec(), ts_col, start, end))
            .collect()
    }
}

/// Text keys as SQL values.
pub(crate) fn text_keys<'a, I: IntoIterator<Item = &'a String>>(keys: I) -> Vec<SqlValue> {
    keys.into_iter().map(|k| SqlValue::Text(k.clone())).collect()
}

#[cfg(test)]
pub(crate) mod testing;
