//! hadb: show Home Assistant states and events from the recorder database.

use std::io;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{ArgAction, ArgGroup, ArgMatches, CommandFactory, FromArgMatches, Parser};
use crossterm::tty::IsTty;
use recorder::window::{days, EndSpec, StartSpec, TimeArg, WindowSpec};

mod commands;

use commands::{CommandError, ShowArgs};

#[derive(Parser)]
#[command(name = "hadb")]
#[command(about = "Retrieve states and/or events from the Home Assistant recorder database")]
#[command(version)]
#[command(group(ArgGroup::new("start_spec").args(["start", "start_days", "start_stops", "start_beginning"])))]
#[command(group(ArgGroup::new("end_spec").args(["end", "end_days", "end_stops"])))]
struct Cli {
    /// Database path (default: from config, else ~/homeassistant/production/config/home-assistant_v2.db)
    #[arg(short = 'd', long = "database", value_name = "PATH")]
    database: Option<PathBuf>,

    /// Config file (default: $HADB_CONFIG or the user config dir)
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Entity ID/state & optional attribute expressions ([%]NAME[=[%]VALUE])
    #[arg(
        short = 's',
        value_names = ["ID_STATE_EXPR", "ATTR_EXPR"],
        num_args = 1..,
        action = ArgAction::Append,
        help_heading = "States"
    )]
    states: Vec<String>,

    /// Attribute expressions shown in their own columns for every entity (NAME[=[%]VALUE])
    #[arg(
        short = 'a',
        value_name = "ATTR_EXPR",
        num_args = 1..,
        action = ArgAction::Append,
        help_heading = "States"
    )]
    global_attrs: Vec<String>,

    /// Print all states, even when unchanged
    #[arg(short = 'A', long = "all-states", help_heading = "States")]
    all_states: bool,

    /// Event type & optional data expressions ([%]NAME[=[%]VALUE])
    #[arg(
        short = 'e',
        value_names = ["EVENT_TYPE_EXPR", "DATA_EXPR"],
        num_args = 1..,
        action = ArgAction::Append,
        help_heading = "Events"
    )]
    events: Vec<String>,

    /// Include core lifecycle events
    #[arg(short = 'c', long = "core-events", help_heading = "Events")]
    core_events: bool,

    /// Include all lowercase event types
    #[arg(short = 'l', long = "lowercase-events", help_heading = "Events")]
    lowercase_events: bool,

    /// Include all uppercase event types
    #[arg(short = 'u', long = "uppercase-events", help_heading = "Events")]
    uppercase_events: bool,

    /// Start at DATETIME[+HH:MM], DATE, TIME or HOUR (today)
    #[arg(short = 'S', long = "start", value_name = "DATETIME", help_heading = "Time window")]
    start: Option<TimeArg>,

    /// Start at midnight DAYS days ago
    #[arg(long = "start-days", value_name = "DAYS", help_heading = "Time window")]
    start_days: Option<u32>,

    /// Start at the STOPS-th most recent shutdown
    #[arg(
        long = "start-stops",
        value_name = "STOPS",
        value_parser = clap::value_parser!(u32).range(1..),
        help_heading = "Time window"
    )]
    start_stops: Option<u32>,

    /// Start at the beginning of the log
    #[arg(long = "start-beginning", help_heading = "Time window")]
    start_beginning: bool,

    /// End at DATETIME[+HH:MM], DATE, TIME or HOUR (today)
    #[arg(short = 'E', long = "end", value_name = "DATETIME", help_heading = "Time window")]
    end: Option<TimeArg>,

    /// End at midnight DAYS days ago
    #[arg(long = "end-days", value_name = "DAYS", help_heading = "Time window")]
    end_days: Option<u32>,

    /// End at the STOPS-th most recent shutdown
    #[arg(
        long = "end-stops",
        value_name = "STOPS",
        value_parser = clap::value_parser!(u32).range(1..),
        help_heading = "Time window"
    )]
    end_stops: Option<u32>,

    /// Window length in (possibly fractional) days
    #[arg(short = 'W', long = "window", value_name = "DAYS", value_parser = positive_days, help_heading = "Time window")]
    window: Option<f64>,

    /// Disable colored output
    #[arg(long = "no-color")]
    no_color: bool,
}

impl Cli {
    fn window_spec(&self) -> WindowSpec {
        let start = if let Some(t) = self.start {
            Some(StartSpec::At(t))
        } else if let Some(n) = self.start_days {
            Some(StartSpec::DaysAgo(n))
        } else if let Some(n) = self.start_stops {
            Some(StartSpec::StopsAgo(n))
        } else if self.start_beginning {
            Some(StartSpec::Beginning)
        } else {
            None
        };
        let end = if let Some(t) = self.end {
            Some(EndSpec::At(t))
        } else if let Some(n) = self.end_days {
            Some(EndSpec::DaysAgo(n))
        } else {
            self.end_stops.map(EndSpec::StopsAgo)
        };
        WindowSpec {
            start,
            end,
            window: self.window.map(days),
        }
    }

    /// `-s` and `-e` groups come from `matches`, one per flag occurrence.
    fn into_show_args(self, matches: &ArgMatches) -> ShowArgs {
        let window = self.window_spec();
        ShowArgs {
            database: self.database,
            config: self.config,
            states: occurrences(matches, "states"),
            global_attrs: self.global_attrs,
            all_states: self.all_states,
            events: occurrences(matches, "events"),
            core_events: self.core_events,
            lowercase_events: self.lowercase_events,
            uppercase_events: self.uppercase_events,
            window,
            no_color: self.no_color,
        }
    }
}

/// Values of each occurrence of a multi-value flag, kept apart.
fn occurrences(matches: &ArgMatches, id: &str) -> Vec<Vec<String>> {
    matches
        .get_occurrences::<String>(id)
        .map(|occ| occ.map(|values| values.cloned().collect()).collect())
        .unwrap_or_default()
}

const MAX_WINDOW_DAYS: f64 = 100_000.0;

fn positive_days(s: &str) -> Result<f64, String> {
    let days: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !(days.is_finite() && days > 0.0) {
        Err("must be a positive number of days".to_string())
    } else if days > MAX_WINDOW_DAYS {
        Err(format!("must be at most {MAX_WINDOW_DAYS} days"))
    } else {
        Ok(days)
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_env("HADB_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_tty())
        .with_target(false)
        .compact()
        .init();
}

fn main() {
    init_tracing();
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    match commands::show(&cli.into_show_args(&matches)) {
        Ok(()) => {}
        Err(CommandError::Usage(msg)) => {
            Cli::command().error(ErrorKind::ValueValidation, msg).exit();
        }
        Err(CommandError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe => {}
        Err(e) => {
            eprintln!("hadb: error: {}", e);
            std::process::exit(1);
        }
    }
}
