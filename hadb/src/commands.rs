//! Command implementation for hadb.

use std::io::{self, Write};
use std::path::PathBuf;

use chrono::Local;
use crossterm::tty::IsTty;
use recorder::{
    write_banner, Config, EventFilters, ExprError, IdItemsExpr, IdItemsExprs, NameValueExprs,
    ParseOptions, Recorder, Report, ReportOptions, StateFilters, WindowError, WindowSpec,
};

/// Errors reported by the CLI.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Bad command line; reported with usage and exit status 2.
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Recorder(#[from] recorder::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Everything `show` needs from the command line.
pub struct ShowArgs {
    pub database: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub states: Vec<Vec<String>>,
    pub global_attrs: Vec<String>,
    pub all_states: bool,
    pub events: Vec<Vec<String>>,
    pub core_events: bool,
    pub lowercase_events: bool,
    pub uppercase_events: bool,
    pub window: WindowSpec,
    pub no_color: bool,
}

fn expr_usage(flag: &str, e: ExprError) -> CommandError {
    CommandError::Usage(format!("{flag} argument: {e}"))
}

fn parse_groups(
    flag: &str,
    groups: &[Vec<String>],
    id_filter_ok: bool,
    options: ParseOptions,
) -> Result<IdItemsExprs, CommandError> {
    groups
        .iter()
        .map(|group| IdItemsExpr::parse(group, id_filter_ok, options))
        .collect::<Result<IdItemsExprs, _>>()
        .map_err(|e| expr_usage(flag, e))
}

fn load_config(args: &ShowArgs) -> Result<Config, CommandError> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env();
            config
        }
        None => Config::load()?,
    };
    if let Some(database) = &args.database {
        config.database = database.clone();
    }
    Ok(config)
}

/// Window problems the user can fix on the command line are usage errors.
fn window_error(e: recorder::Error) -> CommandError {
    match e {
        recorder::Error::Window(
            e @ (WindowError::OverSpecified
            | WindowError::StartAfterEnd { .. }
            | WindowError::OutOfRange),
        ) => CommandError::Usage(e.to_string()),
        e => CommandError::Recorder(e),
    }
}

fn use_color(args: &ShowArgs) -> bool {
    !args.no_color && std::env::var_os("NO_COLOR").is_none() && io::stdout().is_tty()
}

fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(cols, _)| usize::from(cols))
        .unwrap_or(80)
}

/// Print the banner and report for the requested states and events.
pub fn show(args: &ShowArgs) -> Result<(), CommandError> {
    let config = load_config(args)?;
    let options = config.parse_options();

    let state_filters = StateFilters {
        state_exprs: parse_groups("-s", &args.states, true, options)?,
        global_attr_exprs: NameValueExprs::parse(&args.global_attrs, options.name_regex_ok(false))
            .map_err(|e| expr_usage("-a", e))?,
    };
    let event_filters = EventFilters {
        event_exprs: parse_groups("-e", &args.events, false, options)?,
        core: args.core_events,
        uppercase: args.uppercase_events,
        lowercase: args.lowercase_events,
    };
    args.window
        .validate()
        .map_err(|e| CommandError::Usage(e.to_string()))?;

    let color = use_color(args);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let database = config.database_path();
    tracing::debug!(database = %database.display(), color, "starting query");
    let recorder = Recorder::open(&database)?;
    let window = args
        .window
        .resolve(&recorder, Local::now())
        .map_err(window_error)?;

    let oldest = match window.start {
        Some(_) => None,
        None => recorder.find_oldest()?,
    };
    write_banner(&mut out, recorder.schema_version()?, &window, oldest, color)?;

    let states = recorder.query_states(&state_filters, &window)?;
    let events = recorder.query_events(&event_filters, &window)?;
    recorder.close()?;

    let report = Report::new(
        &states.entity_ids,
        &states.global_attr_names,
        &states.prev_states,
        &states.states,
        &events,
    );
    let report_options = ReportOptions {
        all_states: args.all_states,
        color,
        width: terminal_width(),
    };
    report.write(&mut out, &report_options)?;
    out.flush()?;
    Ok(())
}
