//! Error type shared by every Scout crate.

use thiserror::Error;

/// Scout errors.
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(String),

    /// The internal endpoint answered with a non-2xx status.
    #[error("Dispatch to '{path}' failed with status {status}")]
    Dispatch { path: String, status: u16 },

    #[error("Invalid internal path: {0}")]
    InvalidPath(String),

    #[error("Rate limiter error: {0}")]
    RateLimiter(String),

    #[error("Analytics error: {0}")]
    Analytics(String),

    #[error("Cron error: {0}")]
    Cron(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ScoutError>;
