//! Tabular report of states and events.
//!
//! One header row, a separator, the previous-state block (followed by another
//! separator) and then states and events merged in time order. Repeated
//! states are suppressed per entity unless `all_states` is set.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};

use chrono::{DateTime, Local, NaiveDate};
use crossterm::style::{Color, ContentStyle};

use crate::schema::{join_items, Event, ReportRow, State, MISSING, STOP_EVENT};
use crate::window::ResolvedWindow;

/// Timestamp format used throughout the report.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
pub const TS_WIDTH: usize = 26;

const COL1_HEADER: &str = "entity_id / event_type";
const TS_HEADER: &str = "last_updated / time_fired";
const STATE_HEADER: &str = "state";
const ATTRS_HEADER: &str = "attributes";
const COL_SEP: &str = " | ";
const HDR_SEP: &str = "-|-";

const STATE_PALETTE: [Color; 11] = [
    Color::Magenta,
    Color::Blue,
    Color::Green,
    Color::Cyan,
    Color::Red,
    Color::Yellow,
    Color::DarkMagenta,
    Color::DarkGreen,
    Color::DarkCyan,
    Color::DarkRed,
    Color::DarkYellow,
];
const TS_TONES: [Color; 2] = [Color::Grey, Color::White];
const BANNER_COLOR: Color = Color::Green;

/// Banner style of an event row: fill character and colors.
struct EventStyle {
    fill: char,
    fg: Color,
    bg: Color,
}

static STOP_STYLE: EventStyle = EventStyle {
    fill: '#',
    fg: Color::White,
    bg: Color::DarkRed,
};
static CORE_STYLE: EventStyle = EventStyle {
    fill: '=',
    fg: Color::Black,
    bg: Color::DarkCyan,
};
static USER_STYLE: EventStyle = EventStyle {
    fill: '-',
    fg: Color::Black,
    bg: Color::DarkYellow,
};

fn event_style(event: &Event) -> &'static EventStyle {
    if event.event_type == STOP_EVENT {
        &STOP_STYLE
    } else if event.is_core() {
        &CORE_STYLE
    } else {
        &USER_STYLE
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    /// Print every state, even when unchanged.
    pub all_states: bool,
    /// Emit ANSI colors.
    pub color: bool,
    /// Terminal width, used to extend the separator row.
    pub width: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            all_states: false,
            color: false,
            width: 80,
        }
    }
}

/// Wrap `text` in colors when enabled.
fn paint(color: bool, text: &str, fg: Color, bg: Option<Color>) -> String {
    if !color {
        return text.to_string();
    }
    let style = ContentStyle {
        foreground_color: Some(fg),
        background_color: bg,
        ..Default::default()
    };
    style.apply(text).to_string()
}

/// Center `text` in `width` columns, extra padding going where Python puts it.
pub fn center(text: &str, width: usize, fill: char) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let margin = width - len;
    let left = margin / 2 + (margin & width & 1);
    let right = margin - left;
    let mut out = String::with_capacity(width);
    out.extend(std::iter::repeat(fill).take(left));
    out.push_str(text);
    out.extend(std::iter::repeat(fill).take(right));
    out
}

fn ljust(text: &str, width: usize) -> String {
    format!("{text:<width$}")
}

fn width_of(text: &str) -> usize {
    text.chars().count()
}

/// Print the schema version and the window being shown.
pub fn write_banner<W: Write>(
    out: &mut W,
    schema_version: Option<i64>,
    window: &ResolvedWindow,
    oldest: Option<DateTime<Local>>,
    color: bool,
) -> io::Result<()> {
    let version = schema_version.map_or_else(|| "unknown".to_string(), |v| v.to_string());
    let start = match (window.start, oldest) {
        (Some(start), _) => start.format(TS_FORMAT).to_string(),
        (None, Some(oldest)) => format!("beginning ({})", oldest.format(TS_FORMAT)),
        (None, None) => "beginning".to_string(),
    };
    let end = match window.end {
        Some(end) => end.format(TS_FORMAT).to_string(),
        None => "end (now)".to_string(),
    };
    let lines = [
        format!("Schema version: {version}"),
        format!("Showing from {start} to {end}"),
    ];
    for line in lines {
        writeln!(out, "{}", paint(color, &line, BANNER_COLOR, None))?;
    }
    Ok(())
}

/// Query results ready to render.
pub struct Report<'a> {
    entity_ids: &'a [String],
    global_attr_names: &'a [String],
    prev_states: &'a [State],
    states: &'a [State],
    events: &'a [Event],
}

impl<'a> Report<'a> {
    pub fn new(
        entity_ids: &'a [String],
        global_attr_names: &'a [String],
        prev_states: &'a [State],
        states: &'a [State],
        events: &'a [Event],
    ) -> Self {
        if let Some(last_prev) = prev_states.last() {
            let ts = last_prev.last_updated;
            debug_assert!(states.first().map_or(true, |s| ts < s.last_updated));
            debug_assert!(events.first().map_or(true, |e| ts < e.time_fired));
        }
        Self {
            entity_ids,
            global_attr_names,
            prev_states,
            states,
            events,
        }
    }

    fn all_states(&self) -> impl Iterator<Item = &'a State> {
        self.prev_states.iter().chain(self.states.iter())
    }

    fn layout(&self, options: &ReportOptions) -> Layout<'a> {
        let has_states = !self.prev_states.is_empty() || !self.states.is_empty();
        let col1_width = self
            .all_states()
            .map(|s| width_of(&s.entity_id))
            .chain(self.events.iter().map(|e| width_of(&e.event_type) + 6))
            .chain([width_of(COL1_HEADER)])
            .max()
            .unwrap_or_default();
        let state_width = has_states.then(|| {
            self.all_states()
                .map(|s| width_of(s.state_str()))
                .chain([width_of(STATE_HEADER)])
                .max()
                .unwrap_or_default()
        });
        let attr_fields = self
            .global_attr_names
            .iter()
            .map(|name| {
                let width = self
                    .all_states()
                    .map(|s| global_attr_str(s, name).chars().count())
                    .chain([width_of(name)])
                    .max()
                    .unwrap_or_default();
                (name.as_str(), width)
            })
            .collect::<Vec<_>>();
        let other_attrs = self.all_states().any(|s| !s.attributes.is_empty());

        let mut sep_parts = vec!["-".repeat(col1_width), "-".repeat(TS_WIDTH)];
        sep_parts.extend(state_width.map(|w| "-".repeat(w)));
        sep_parts.extend(attr_fields.iter().map(|(_, w)| "-".repeat(*w)));
        let mut row_sep = sep_parts.join(HDR_SEP);
        if other_attrs {
            row_sep.push_str(HDR_SEP);
            let fill = options.width.saturating_sub(width_of(&row_sep));
            row_sep.push_str(&"-".repeat(fill));
        }

        Layout {
            col1_width,
            state_width,
            attr_fields,
            other_attrs,
            row_sep,
        }
    }

    /// Render the report.
    pub fn write<W: Write>(&self, out: &mut W, options: &ReportOptions) -> io::Result<()> {
        let layout = self.layout(options);
        let mut printer = Printer {
            out,
            options,
            layout,
            colors: HashMap::new(),
            last_shown: HashMap::new(),
            prev_label: None,
            ts_tone: None,
            ts_last_date: None,
        };
        printer.header()?;
        printer.separator()?;

        if self.prev_states.is_empty() && self.states.is_empty() && self.events.is_empty() {
            return Ok(());
        }

        let seen: HashSet<&str> = self.all_states().map(|s| s.entity_id.as_str()).collect();
        printer.colors = self
            .entity_ids
            .iter()
            .map(String::as_str)
            .filter(|id| seen.contains(id))
            .zip(STATE_PALETTE.iter().cycle().copied())
            .collect();

        if !self.prev_states.is_empty() {
            for state in self.prev_states {
                printer.state_row(state)?;
            }
            printer.separator()?;
            printer.prev_label = None;
        }

        let mut rows: Vec<ReportRow<'a>> = self
            .states
            .iter()
            .map(ReportRow::State)
            .chain(self.events.iter().map(ReportRow::Event))
            .collect();
        rows.sort_by_key(|row| row.ts());
        for row in rows {
            match row {
                ReportRow::State(state) => printer.state_row(state)?,
                ReportRow::Event(event) => printer.event_row(event)?,
            }
        }
        Ok(())
    }
}

fn global_attr_str(state: &State, name: &str) -> String {
    state
        .global_attrs
        .get(name)
        .map_or_else(|| MISSING.to_string(), |v| v.to_string())
}

struct Layout<'a> {
    col1_width: usize,
    /// `None` when there are no states at all.
    state_width: Option<usize>,
    attr_fields: Vec<(&'a str, usize)>,
    other_attrs: bool,
    row_sep: String,
}

struct Printer<'a, 'o, W: Write> {
    out: &'o mut W,
    options: &'o ReportOptions,
    layout: Layout<'a>,
    colors: HashMap<&'a str, Color>,
    last_shown: HashMap<&'a str, &'a State>,
    prev_label: Option<&'a str>,
    ts_tone: Option<usize>,
    ts_last_date: Option<NaiveDate>,
}

impl<'a, W: Write> Printer<'a, '_, W> {
    fn header(&mut self) -> io::Result<()> {
        let layout = &self.layout;
        let mut cols = vec![
            center(COL1_HEADER, layout.col1_width, ' '),
            center(TS_HEADER, TS_WIDTH, ' '),
        ];
        cols.extend(layout.state_width.map(|w| center(STATE_HEADER, w, ' ')));
        cols.extend(
            layout
                .attr_fields
                .iter()
                .map(|(name, w)| center(name, *w, ' ')),
        );
        if layout.other_attrs {
            cols.push(ATTRS_HEADER.to_string());
        }
        writeln!(self.out, "{}", cols.join(COL_SEP))
    }

    fn separator(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", self.layout.row_sep)
    }

    /// Timestamp and column separator, toned by date.
    fn ts_and_sep(&mut self, ts: DateTime<Local>) -> (String, String) {
        let date = ts.date_naive();
        if self.ts_last_date != Some(date) {
            self.ts_tone = Some(self.ts_tone.map_or(0, |i| i + 1));
            self.ts_last_date = Some(date);
            self.prev_label = None;
        }
        let tone = TS_TONES[self.ts_tone.unwrap_or_default() % TS_TONES.len()];
        let color = self.options.color;
        (
            paint(color, &ts.format(TS_FORMAT).to_string(), tone, None),
            paint(color, COL_SEP, tone, None),
        )
    }

    fn state_row(&mut self, state: &'a State) -> io::Result<()> {
        let entity_id = state.entity_id.as_str();
        if !self.options.all_states {
            if let Some(last) = self.last_shown.get(entity_id) {
                if last.state == state.state
                    && last.global_attrs == state.global_attrs
                    && last.attributes == state.attributes
                {
                    return Ok(());
                }
            }
        }

        let (ts, sep) = self.ts_and_sep(state.last_updated);
        let label = if self.prev_label == Some(entity_id) {
            ""
        } else {
            entity_id
        };
        let color = self.options.color;
        let fg = self
            .colors
            .get(entity_id)
            .copied()
            .unwrap_or(STATE_PALETTE[0]);
        let layout = &self.layout;

        let mut cols = vec![
            paint(color, &ljust(label, layout.col1_width), fg, None),
            ts,
            paint(
                color,
                &ljust(state.state_str(), layout.state_width.unwrap_or_default()),
                fg,
                None,
            ),
        ];
        cols.extend(layout.attr_fields.iter().map(|(name, width)| {
            paint(color, &ljust(&global_attr_str(state, name), *width), fg, None)
        }));
        if layout.other_attrs {
            cols.push(paint(color, &join_items(&state.attributes), fg, None));
        }
        writeln!(self.out, "{}", cols.join(sep.as_str()))?;

        if !self.options.all_states {
            self.last_shown.insert(entity_id, state);
        }
        self.prev_label = Some(entity_id);
        Ok(())
    }

    fn event_row(&mut self, event: &'a Event) -> io::Result<()> {
        let style = event_style(event);
        let banner = center(
            &format!(" {} ", event.event_type),
            self.layout.col1_width,
            style.fill,
        );
        let (ts, sep) = self.ts_and_sep(event.time_fired);
        let cols = [
            paint(self.options.color, &banner, style.fg, Some(style.bg)),
            ts,
            join_items(&event.data),
        ];
        writeln!(self.out, "{}", cols.join(sep.as_str()))?;
        self.prev_label = None;
        Ok(())
    }
}
