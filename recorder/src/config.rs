//! Configuration for hadb.
//!
//! Config file resolution order:
//! 1. Explicit path passed to Config::load_from()
//! 2. HADB_CONFIG environment variable
//! 3. Default: <config dir>/hadb/config.toml
//!
//! The database path can additionally be overridden with HADB_DATABASE.

use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

use crate::query::{ParseOptions, REGEX_PREFIX};
use crate::{Error, Result};

/// Recorder database used when nothing else is configured.
pub const DEFAULT_DATABASE: &str = "~/homeassistant/production/config/home-assistant_v2.db";

/// Environment variable naming an alternate config file.
pub const CONFIG_VAR: &str = "HADB_CONFIG";

/// Environment variable overriding the database path.
pub const DATABASE_VAR: &str = "HADB_DATABASE";

/// hadb configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Path to the recorder SQLite database (`~` is expanded).
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Marker that turns a name or value into a regular expression.
    #[serde(default = "default_regex_prefix")]
    pub regex_prefix: char,
}

fn default_database() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE)
}

fn default_regex_prefix() -> char {
    REGEX_PREFIX
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            regex_prefix: default_regex_prefix(),
        }
    }
}

impl Config {
    /// Create a config for the given database.
    pub fn with_database(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// Load config from the default location, applying environment overrides.
    pub fn load() -> Result<Self> {
        let path = resolve_config_path();
        let mut config = match path {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific file, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Apply HADB_DATABASE if set.
    pub fn apply_env(&mut self) {
        if let Ok(database) = std::env::var(DATABASE_VAR) {
            self.database = PathBuf::from(database);
        }
    }

    /// Database path with a leading `~` expanded.
    pub fn database_path(&self) -> PathBuf {
        expand_home(&self.database)
    }

    /// Expression parsing options for this config.
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions::with_prefix(self.regex_prefix)
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

/// Resolve the config file path using the standard resolution order.
fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_VAR) {
        return Some(PathBuf::from(path));
    }
    ProjectDirs::from("", "", "hadb").map(|dirs| dirs.config_dir().join("config.toml"))
}
