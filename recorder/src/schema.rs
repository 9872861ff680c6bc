//! Row types read from the recorder database and produced for reports.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Local};
use serde_json::{Map, Value};

/// Event types fired by Home Assistant itself over its lifecycle.
pub const CORE_EVENTS: [&str; 4] = [
    "homeassistant_start",
    "homeassistant_started",
    "homeassistant_stop",
    "core_config_updated",
];

/// Event type marking a shutdown (used as a time anchor).
pub const STOP_EVENT: &str = "homeassistant_stop";

/// Display text of an expected item that was absent.
pub const MISSING: &str = "¿¿¿";

/// Raw attribute or event data bag as decoded from JSON.
pub type RawItems = Map<String, Value>;

/// A named value from a row's attribute/data bag.
///
/// `Missing` stands for an item that was asked for but not present. It never
/// compares equal to any stored value, including `null`, `""` or `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValue {
    Value(Value),
    Missing,
}

impl ItemValue {
    /// Look up `name` in a raw bag, substituting `Missing` when absent.
    pub fn lookup(items: &RawItems, name: &str) -> Self {
        items
            .get(name)
            .map(|v| ItemValue::Value(v.clone()))
            .unwrap_or(ItemValue::Missing)
    }

    /// Numeric view, when the value is a number or a string holding one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ItemValue::Value(Value::Number(n)) => n.as_f64(),
            ItemValue::Value(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<Value> for ItemValue {
    fn from(value: Value) -> Self {
        ItemValue::Value(value)
    }
}

impl From<&str> for ItemValue {
    fn from(value: &str) -> Self {
        ItemValue::Value(Value::String(value.to_string()))
    }
}

impl fmt::Display for ItemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Strings print bare, everything else as JSON text.
            ItemValue::Value(Value::String(s)) => f.write_str(s),
            ItemValue::Value(v) => write!(f, "{}", v),
            ItemValue::Missing => f.write_str(MISSING),
        }
    }
}

/// Items selected for display, keyed by name.
pub type ItemMap = BTreeMap<String, ItemValue>;

/// Render items as `name=value, name=value`.
pub fn join_items(items: &ItemMap) -> String {
    items
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Text of a state stored as NULL.
pub const NULL_STATE: &str = "None";

/// A timestamped log row with an identifier, items and an optional value.
pub trait LogRow {
    /// Entity ID for states, event type for events.
    fn id(&self) -> &str;

    fn ts(&self) -> DateTime<Local>;

    fn items(&self) -> &RawItems;

    /// Scalar value (the state text, `None` for NULL); events have none.
    fn value(&self) -> Option<&str> {
        None
    }
}

/// A row of the `states` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRow {
    pub entity_id: String,
    pub last_updated: DateTime<Local>,
    pub attributes: RawItems,
    pub state: Option<String>,
    /// `state_id` of the preceding row for the same entity. A lookup key only.
    pub old_state_id: Option<i64>,
}

impl LogRow for StateRow {
    fn id(&self) -> &str {
        &self.entity_id
    }

    fn ts(&self) -> DateTime<Local> {
        self.last_updated
    }

    fn items(&self) -> &RawItems {
        &self.attributes
    }

    fn value(&self) -> Option<&str> {
        Some(self.state.as_deref().unwrap_or(NULL_STATE))
    }
}

/// A row of the `events` table.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub event_type: String,
    pub time_fired: DateTime<Local>,
    pub data: RawItems,
}

impl LogRow for EventRow {
    fn id(&self) -> &str {
        &self.event_type
    }

    fn ts(&self) -> DateTime<Local> {
        self.time_fired
    }

    fn items(&self) -> &RawItems {
        &self.data
    }
}

/// A state selected for the report.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub entity_id: String,
    pub last_updated: DateTime<Local>,
    pub state: Option<String>,
    /// Items requested by the entity's own selector, minus global ones.
    pub attributes: ItemMap,
    /// Items requested by the global attribute expressions.
    pub global_attrs: ItemMap,
}

impl State {
    /// State text as shown in the report.
    pub fn state_str(&self) -> &str {
        self.state.as_deref().unwrap_or(NULL_STATE)
    }
}

/// An event selected for the report.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub time_fired: DateTime<Local>,
    pub data: ItemMap,
}

impl Event {
    pub fn is_core(&self) -> bool {
        CORE_EVENTS.contains(&self.event_type.as_str())
    }
}

/// A row of the merged chronological report.
#[derive(Debug, Clone, Copy)]
pub enum ReportRow<'a> {
    State(&'a State),
    Event(&'a Event),
}

impl ReportRow<'_> {
    pub fn ts(&self) -> DateTime<Local> {
        match self {
            ReportRow::State(s) => s.last_updated,
            ReportRow::Event(e) => e.time_fired,
        }
    }
}
