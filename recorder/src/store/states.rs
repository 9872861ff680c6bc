//! State history queries.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use rusqlite::{params_from_iter, types::Value as SqlValue};

use super::{get_ts, parse_items, text_keys, Recorder, WhereClause};
use crate::query::{IdItemsExprs, NameValueExprs};
use crate::schema::{ItemMap, ItemValue, LogRow, State, StateRow};
use crate::window::ResolvedWindow;
use crate::Result;

/// Which states to report: entity selectors plus global attribute expressions.
#[derive(Debug, Clone, Default)]
pub struct StateFilters {
    pub state_exprs: IdItemsExprs,
    pub global_attr_exprs: NameValueExprs,
}

impl StateFilters {
    fn needs_attributes(&self) -> bool {
        self.state_exprs.has_items() || !self.global_attr_exprs.is_empty()
    }
}

/// Result of a state query.
#[derive(Debug, Clone, Default)]
pub struct StateQuery {
    /// Entities selected by the filters, in selection order.
    pub entity_ids: Vec<String>,
    /// Literal names of the global attributes.
    pub global_attr_names: Vec<String>,
    /// Last state before the window for entities with nothing filtered out.
    pub prev_states: Vec<State>,
    /// Matching states inside the window, oldest first.
    pub states: Vec<State>,
}

impl Recorder {
    /// Find the states matching `filters` within `window`.
    pub fn query_states(
        &self,
        filters: &StateFilters,
        window: &ResolvedWindow,
    ) -> Result<StateQuery> {
        let global_attr_names = filters.global_attr_exprs.all_str_names();
        if filters.state_exprs.is_empty() {
            return Ok(StateQuery {
                global_attr_names,
                ..Default::default()
            });
        }

        let all_ids = self.distinct("entity_id", "states")?;
        let entity_ids = filters
            .state_exprs
            .matching_ids(all_ids.iter().map(String::as_str));
        tracing::debug!(count = entity_ids.len(), "selected entities");
        if entity_ids.is_empty() {
            return Ok(StateQuery {
                global_attr_names,
                ..Default::default()
            });
        }

        let with_attrs = filters.needs_attributes();
        let where_clauses = WhereClause::chunked(
            "s.entity_id",
            text_keys(&entity_ids),
            "s.last_updated_ts",
            window.start,
            window.end,
        );
        let raw_states = self.fetch_states(with_attrs, where_clauses)?;

        let mut raw_counts: HashMap<&str, usize> = HashMap::new();
        let mut kept_counts: HashMap<&str, usize> = HashMap::new();
        let mut first_back_refs: HashMap<&str, Option<i64>> = HashMap::new();
        let mut states = Vec::new();
        for raw in &raw_states {
            *raw_counts.entry(raw.id()).or_default() += 1;
            first_back_refs.entry(raw.id()).or_insert(raw.old_state_id);
            let row_match = filters
                .state_exprs
                .filter_row(raw, &filters.global_attr_exprs);
            if row_match.matches {
                *kept_counts.entry(raw.id()).or_default() += 1;
                states.push(State {
                    entity_id: raw.entity_id.clone(),
                    last_updated: raw.last_updated,
                    state: raw.state.clone(),
                    attributes: row_match.own_items,
                    global_attrs: row_match.global_items,
                });
            }
        }

        let prev_states = match window.start {
            Some(start) => {
                // Only entities whose in-window rows all survived filtering.
                let eligible: Vec<&str> = entity_ids
                    .iter()
                    .map(String::as_str)
                    .filter(|id| raw_counts.get(id) == kept_counts.get(id))
                    .collect();
                let prev_raw =
                    self.fetch_prev_states(with_attrs, &eligible, &first_back_refs, start)?;
                let mut prev_states: Vec<State> = prev_raw
                    .iter()
                    .map(|raw| prev_state(raw, filters, &global_attr_names))
                    .collect();
                prev_states.sort_by_key(|s| s.last_updated);
                prev_states
            }
            None => Vec::new(),
        };

        debug_assert!(prev_states
            .iter()
            .all(|p| window.start.is_some_and(|s| p.last_updated < s)));
        tracing::debug!(
            states = states.len(),
            prev_states = prev_states.len(),
            "queried states"
        );

        Ok(StateQuery {
            entity_ids,
            global_attr_names,
            prev_states,
            states,
        })
    }

    /// Last row before `start` for each eligible entity.
    ///
    /// Entities whose first in-window row carries a back-reference are looked
    /// up by that reference; the rest by the most recent row before `start`.
    fn fetch_prev_states(
        &self,
        with_attrs: bool,
        eligible: &[&str],
        first_back_refs: &HashMap<&str, Option<i64>>,
        start: DateTime<Local>,
    ) -> Result<Vec<StateRow>> {
        let mut back_refs = Vec::new();
        let mut unlinked = Vec::new();
        for id in eligible {
            match first_back_refs.get(id) {
                Some(Some(state_id)) => back_refs.push(SqlValue::Integer(*state_id)),
                _ => unlinked.push(*id),
            }
        }

        let mut prev = Vec::new();
        if !back_refs.is_empty() {
            let where_clauses = WhereClause::chunked("s.state_id", back_refs, "", None, None);
            prev.extend(
                self.fetch_states(with_attrs, where_clauses)?
                    .into_iter()
                    .filter(|raw| raw.last_updated < start),
            );
        }
        for id in unlinked {
            let where_clause = WhereClause::new(
                "s.entity_id",
                vec![SqlValue::Text(id.to_string())],
                "s.last_updated_ts",
                None,
                Some(start),
            );
            let sql = state_sql(with_attrs, &where_clause.sql, "DESC LIMIT 1");
            prev.extend(self.run_state_query(&sql, where_clause.params)?);
        }
        Ok(prev)
    }

    /// Rows matching any of the clauses, in time order.
    fn fetch_states(
        &self,
        with_attrs: bool,
        where_clauses: Vec<WhereClause>,
    ) -> Result<Vec<StateRow>> {
        let chunks = where_clauses.len();
        let mut rows = Vec::new();
        for where_clause in where_clauses {
            let sql = state_sql(with_attrs, &where_clause.sql, "");
            rows.extend(self.run_state_query(&sql, where_clause.params)?);
        }
        if chunks > 1 {
            rows.sort_by_key(|row| row.last_updated);
        }
        Ok(rows)
    }

    fn run_state_query(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<StateRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| {
                Ok(StateRow {
                    entity_id: row.get(0)?,
                    last_updated: get_ts(row, 1)?,
                    attributes: parse_items(row.get(2)?),
                    state: row.get(3)?,
                    old_state_id: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn state_sql(with_attrs: bool, where_sql: &str, order_suffix: &str) -> String {
    let (attrs, join) = if with_attrs {
        (
            "COALESCE(a.shared_attrs, s.attributes)",
            "LEFT JOIN state_attributes AS a ON s.attributes_id = a.attributes_id",
        )
    } else {
        ("NULL", "")
    };
    format!(
        "SELECT s.entity_id, s.last_updated_ts, {attrs}, s.state, s.old_state_id \
         FROM states AS s {join} {where_sql} ORDER BY s.last_updated_ts {order_suffix}"
    )
}

/// Build a previous state showing the same item names a matching row would.
fn prev_state(raw: &StateRow, filters: &StateFilters, global_attr_names: &[String]) -> State {
    let attributes: ItemMap = filters
        .state_exprs
        .matching_item_names(raw.id(), raw.attributes.keys().map(String::as_str))
        .into_iter()
        .filter(|name| !global_attr_names.contains(name))
        .map(|name| {
            let value = ItemValue::lookup(&raw.attributes, &name);
            (name, value)
        })
        .collect();
    let global_attrs: ItemMap = global_attr_names
        .iter()
        .map(|name| (name.clone(), ItemValue::lookup(&raw.attributes, name)))
        .collect();
    State {
        entity_id: raw.entity_id.clone(),
        last_updated: raw.last_updated,
        state: raw.state.clone(),
        attributes,
        global_attrs,
    }
}
