//! Recorder: query and report on the Home Assistant recorder database.
//!
//! Read-only access to the SQLite state/event log, a filter expression
//! language, time-window resolution and a tabular report renderer.

pub mod config;
pub mod error;
pub mod query;
pub mod report;
pub mod schema;
pub mod store;
pub mod window;

pub use config::Config;
pub use error::{Error, Result};
pub use query::{ExprError, IdItemsExpr, IdItemsExprs, NameValueExpr, NameValueExprs, ParseOptions};
pub use report::{write_banner, Report, ReportOptions};
pub use schema::{Event, ItemMap, ItemValue, State};
pub use store::{EventFilters, Recorder, StateFilters, StateQuery};
pub use window::{EndSpec, LogAnchors, ResolvedWindow, StartSpec, TimeArg, WindowError, WindowSpec};
