//! Error handling for the climate ingestion pipeline
//!
//! One taxonomy for the whole run: transient transport failures are retried
//! and then skip the station, structural problems drop the offending record,
//! configuration gaps skip the unit of work, and database failures roll the
//! batch back.

use shared::{DataSource, Variable};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Station not found: {0}")]
    StationNotFound(String),

    #[error("Unsupported variable '{variable}' for {provider}")]
    UnsupportedVariable {
        provider: DataSource,
        variable: Variable,
    },

    #[error("{provider} provider error: {message}")]
    Provider {
        provider: DataSource,
        message: String,
    },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed provider response: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Import error: {0}")]
    Import(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether a retry with backoff can plausibly succeed.
    ///
    /// Timeouts, connection failures and provider 5xx responses qualify;
    /// logical provider errors and malformed payloads never do.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Transport(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map_or(false, |s| s.is_server_error())
            }
            _ => false,
        }
    }
}

/// Result type alias for pipeline operations
pub type AppResult<T> = Result<T, AppError>;
