//! Runtime settings.
//!
//! Settings come from built-in defaults, then an optional settings file, then
//! `MACROTRACK_*` environment variables, later sources overriding earlier ones.

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::clause::DEFAULT_ITERATE_THRESHOLD;
use crate::error::Result;
use crate::persist::PersistenceMode;

pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Path of the SQLite file, or `:memory:`.
    pub database: String,
    pub iterate_threshold: usize,
    /// An `EnvFilter` directive such as `info` or `macrotrack=debug`.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: String::from(IN_MEMORY),
            iterate_threshold: DEFAULT_ITERATE_THRESHOLD,
            log_filter: String::from("info"),
        }
    }
}

impl Settings {
    /// Loads settings, reading `path` if it exists. The format follows the
    /// file extension.
    pub fn load(path: &str) -> Result<Self> {
        let defaults = Self::default();
        let settings = Config::builder()
            .set_default("database", defaults.database)?
            .set_default("iterate_threshold", defaults.iterate_threshold as i64)?
            .set_default("log_filter", defaults.log_filter)?
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("MACROTRACK").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn persistence_mode(&self) -> PersistenceMode {
        if self.database == IN_MEMORY {
            PersistenceMode::InMemory
        } else {
            PersistenceMode::File(self.database.clone())
        }
    }
}
