//! Time window resolution.
//!
//! Turns start/end/window specifications into a concrete `[start, end)`
//! interval. Relative anchors ("N stops ago", "from the beginning") are
//! looked up through [`LogAnchors`].

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Days, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone,
};

/// Errors resolving a time window.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WindowError {
    #[error("can only specify at most 2 of start, end & window")]
    OverSpecified,

    #[error("{flag}: could not find {stops} stops")]
    StopNotFound { flag: &'static str, stops: u32 },

    #[error("start ({start}) must not be after end ({end})")]
    StartAfterEnd {
        start: DateTime<Local>,
        end: DateTime<Local>,
    },

    #[error("{0} does not exist in the local time zone")]
    NonexistentLocalTime(NaiveDateTime),

    #[error("invalid date/time {input:?}: expected DATETIME, DATE or TIME")]
    InvalidTime { input: String },

    #[error("time window out of range")]
    OutOfRange,
}

/// Source of anchor points in the log.
pub trait LogAnchors {
    type Error: From<WindowError>;

    /// Time of the `stops`-th most recent stop event, if that many exist.
    fn nth_stop(&self, stops: u32) -> Result<Option<DateTime<Local>>, Self::Error>;

    /// Time of the oldest state update or event, if any.
    fn oldest(&self) -> Result<Option<DateTime<Local>>, Self::Error>;
}

/// A user supplied point in time: full datetime, date, or time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeArg {
    DateTime(NaiveDateTime),
    /// Datetime with an explicit UTC offset.
    Zoned(DateTime<FixedOffset>),
    /// Midnight at the start of the date.
    Date(NaiveDate),
    /// Today at the given time.
    Time(NaiveTime),
}

const TIME_FORMATS: [&str; 3] = ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];
const ZONED_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%dT%H:%M%:z",
];
const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

impl FromStr for TimeArg {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(t) = bare_hour(s) {
            return Ok(TimeArg::Time(t));
        }
        for fmt in TIME_FORMATS {
            if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
                return Ok(TimeArg::Time(t));
            }
        }
        for fmt in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(TimeArg::DateTime(dt));
            }
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(TimeArg::Zoned(dt));
        }
        for fmt in ZONED_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Ok(TimeArg::Zoned(dt));
            }
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(TimeArg::Date)
            .map_err(|_| WindowError::InvalidTime {
                input: s.to_string(),
            })
    }
}

/// An hour of the day on its own, e.g. `7` or `07`.
fn bare_hour(s: &str) -> Option<NaiveTime> {
    if s.is_empty() || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveTime::from_hms_opt(s.parse().ok()?, 0, 0)
}

impl TimeArg {
    /// Local datetime this argument denotes, given the current time.
    pub fn resolve(&self, now: DateTime<Local>) -> Result<DateTime<Local>, WindowError> {
        let naive = match *self {
            TimeArg::Zoned(dt) => return Ok(dt.with_timezone(&Local)),
            TimeArg::DateTime(dt) => dt,
            TimeArg::Date(d) => d.and_time(NaiveTime::MIN),
            TimeArg::Time(t) => now.date_naive().and_time(t),
        };
        local(naive)
    }
}

/// How the window start is given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartSpec {
    At(TimeArg),
    DaysAgo(u32),
    StopsAgo(u32),
    Beginning,
}

/// How the window end is given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EndSpec {
    At(TimeArg),
    DaysAgo(u32),
    StopsAgo(u32),
}

/// A resolved `[start, end)` window; `None` means open ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedWindow {
    pub start: Option<DateTime<Local>>,
    pub end: Option<DateTime<Local>>,
}

impl fmt::Display for ResolvedWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start {
            Some(start) => write!(f, "{}", start.format(crate::report::TS_FORMAT))?,
            None => write!(f, "beginning")?,
        }
        match self.end {
            Some(end) => write!(f, " to {}", end.format(crate::report::TS_FORMAT)),
            None => write!(f, " to end (now)"),
        }
    }
}

/// Start, end and window as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowSpec {
    pub start: Option<StartSpec>,
    pub end: Option<EndSpec>,
    pub window: Option<TimeDelta>,
}

/// Convert a floating number of days into a duration.
pub fn days(days: f64) -> TimeDelta {
    TimeDelta::microseconds((days * 86_400_000_000.0).round() as i64)
}

fn local(naive: NaiveDateTime) -> Result<DateTime<Local>, WindowError> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or(WindowError::NonexistentLocalTime(naive))
}

/// Midnight at the start of the day `days` days before `now`.
fn days_ago(now: DateTime<Local>, days: u32) -> Result<DateTime<Local>, WindowError> {
    let date = now
        .date_naive()
        .checked_sub_days(Days::new(u64::from(days)))
        .ok_or(WindowError::OutOfRange)?;
    local(date.and_time(NaiveTime::MIN))
}

fn shift(t: DateTime<Local>, by: TimeDelta) -> Result<DateTime<Local>, WindowError> {
    t.checked_add_signed(by).ok_or(WindowError::OutOfRange)
}

impl WindowSpec {
    /// Reject more than two of start, end and window.
    pub fn validate(&self) -> Result<(), WindowError> {
        let given = [
            self.start.is_some(),
            self.end.is_some(),
            self.window.is_some(),
        ];
        if given.iter().filter(|g| **g).count() > 2 {
            return Err(WindowError::OverSpecified);
        }
        Ok(())
    }

    /// Resolve to concrete bounds, consulting the log for anchors.
    pub fn resolve<A: LogAnchors>(
        &self,
        anchors: &A,
        now: DateTime<Local>,
    ) -> Result<ResolvedWindow, A::Error> {
        self.validate()?;

        let mut start = match self.start {
            None | Some(StartSpec::Beginning) => None,
            Some(StartSpec::At(t)) => Some(t.resolve(now)?),
            Some(StartSpec::DaysAgo(n)) => Some(days_ago(now, n)?),
            Some(StartSpec::StopsAgo(n)) => Some(anchors.nth_stop(n)?.ok_or(
                WindowError::StopNotFound {
                    flag: "--start-stops",
                    stops: n,
                },
            )?),
        };

        let mut end = match self.end {
            None => None,
            Some(EndSpec::At(t)) => Some(t.resolve(now)?),
            Some(EndSpec::DaysAgo(n)) => Some(days_ago(now, n)?),
            Some(EndSpec::StopsAgo(n)) => Some(anchors.nth_stop(n)?.ok_or(
                WindowError::StopNotFound {
                    flag: "--end-stops",
                    stops: n,
                },
            )?),
        };

        if let Some(window) = self.window {
            if self.start.is_some() && start.is_none() {
                start = anchors.oldest()?;
            }
            match (start, end) {
                (Some(s), _) => end = Some(shift(s, window)?),
                (None, Some(e)) => start = Some(shift(e, -window)?),
                (None, None) => {
                    start = Some(shift(now, -window)?);
                    end = Some(now);
                }
            }
        } else if self.start.is_none() && self.end.is_none() {
            start = Some(days_ago(now, 0)?);
        }

        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(WindowError::StartAfterEnd { start: s, end: e }.into());
            }
        }

        tracing::debug!(?start, ?end, "resolved time window");
        Ok(ResolvedWindow { start, end })
    }
}
