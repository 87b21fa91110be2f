
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MacrotrackError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Type cast error in column {column}: cannot convert {raw}: {reason}")]
    TypeCast { column: String, raw: String, reason: String },
    #[error("Schema violation in table {table}: {message}")]
    SchemaViolation { table: String, message: String },
    #[error("Batch error in table {table} at row {row} {data}: {message}")]
    Batch { table: String, row: usize, data: String, message: String },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, MacrotrackError>;

// Helper conversions
impl From<rusqlite::Error> for MacrotrackError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for MacrotrackError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
