//! Error types for recorder queries.

use std::path::PathBuf;

use crate::query::ExprError;
use crate::window::WindowError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error(transparent)]
    Window(#[from] WindowError),
}

pub type Result<T> = std::result::Result<T, Error>;
