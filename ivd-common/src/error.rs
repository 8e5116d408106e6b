//! Errors raised while bootstrapping the service

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Startup and storage bootstrap failures
#[derive(Error, Debug)]
pub enum Error {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file unreadable or unparseable, or a setting out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// The global subscriber could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),
}
