//! Event queries.

use rusqlite::params_from_iter;

use super::{get_ts, parse_items, text_keys, Recorder, WhereClause};
use crate::query::{union_into, IdItemsExprs, NameValueExprs};
use crate::schema::{Event, EventRow, CORE_EVENTS};
use crate::window::ResolvedWindow;
use crate::Result;

/// Which events to report.
#[derive(Debug, Clone, Default)]
pub struct EventFilters {
    pub event_exprs: IdItemsExprs,
    /// Include the core lifecycle event types.
    pub core: bool,
    /// Include every all-uppercase event type.
    pub uppercase: bool,
    /// Include every all-lowercase event type.
    pub lowercase: bool,
}

impl EventFilters {
    /// Event types included by the family flags alone.
    pub fn family_types(&self, all_types: &[String]) -> Vec<String> {
        let mut types = Vec::new();
        if self.core {
            union_into(&mut types, CORE_EVENTS.iter().map(|t| t.to_string()));
        }
        if self.uppercase {
            union_into(&mut types, all_types.iter().filter(|t| is_upper(t)).cloned());
        }
        if self.lowercase {
            union_into(&mut types, all_types.iter().filter(|t| is_lower(t)).cloned());
        }
        types
    }
}

/// At least one cased character and no lowercase ones.
fn is_upper(s: &str) -> bool {
    s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase)
}

/// At least one cased character and no uppercase ones.
fn is_lower(s: &str) -> bool {
    s.chars().any(char::is_lowercase) && !s.chars().any(char::is_uppercase)
}

impl Recorder {
    /// Find the events matching `filters` within `window`.
    ///
    /// Events of a type included by a family flag are always kept; other
    /// events must satisfy one of the selectors.
    pub fn query_events(&self, filters: &EventFilters, window: &ResolvedWindow) -> Result<Vec<Event>> {
        let all_types = self.distinct("event_type", "events")?;
        let family_types = filters.family_types(&all_types);
        let mut event_types = filters
            .event_exprs
            .matching_ids(all_types.iter().map(String::as_str));
        union_into(&mut event_types, family_types.iter().cloned());
        if event_types.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(count = event_types.len(), "selected event types");

        let (data, join) = if filters.event_exprs.has_items() {
            (
                "COALESCE(d.shared_data, e.event_data)",
                "LEFT JOIN event_data AS d ON e.data_id = d.data_id",
            )
        } else {
            ("NULL", "")
        };
        let where_clauses = WhereClause::chunked(
            "e.event_type",
            text_keys(&event_types),
            "e.time_fired_ts",
            window.start,
            window.end,
        );
        let chunks = where_clauses.len();
        let mut rows = Vec::new();
        for where_clause in where_clauses {
            let sql = format!(
                "SELECT e.event_type, e.time_fired_ts, {data} FROM events AS e {join} {} \
                 ORDER BY e.time_fired_ts",
                where_clause.sql
            );
            let mut stmt = self.conn.prepare(&sql)?;
            rows.extend(
                stmt.query_map(params_from_iter(where_clause.params), |row| {
                    Ok(EventRow {
                        event_type: row.get(0)?,
                        time_fired: get_ts(row, 1)?,
                        data: parse_items(row.get(2)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            );
        }
        if chunks > 1 {
            rows.sort_by_key(|row: &EventRow| row.time_fired);
        }

        let no_globals = NameValueExprs::new();
        let events: Vec<Event> = rows
            .into_iter()
            .filter_map(|row| {
                let row_match = filters.event_exprs.filter_row(&row, &no_globals);
                (row_match.matches || family_types.contains(&row.event_type)).then(|| Event {
                    event_type: row.event_type,
                    time_fired: row.time_fired,
                    data: row_match.own_items,
                })
            })
            .collect();
        tracing::debug!(events = events.len(), "queried events");
        Ok(events)
    }
}
