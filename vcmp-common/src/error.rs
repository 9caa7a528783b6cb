//! Error type of the shared vcmp library
//!
//! Only what the shared code can fail at itself: the SQLite bootstrap,
//! reading the config file and parsing persisted per-chat values.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Opening the pool or creating the schema failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Config file unreadable or database directory not creatable
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file missing or not valid TOML
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored chat setting (e.g. the loop mode) holds an unknown value
    #[error("Invalid chat setting: {0}")]
    InvalidSetting(String),
}
