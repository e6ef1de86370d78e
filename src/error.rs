//! Error types for tablekeeper
//!
//! Classifier ambiguity never surfaces here: fragments that cannot be matched
//! with confidence are omitted. A purge that skips a table and a terminate
//! aimed at a session that is already gone are reported as outcomes, not
//! errors.

use thiserror::Error;

/// The main error type for tablekeeper
#[derive(Error, Debug)]
pub enum Error {
    // ========== Backend Errors ==========
    /// The database rejected a statement. The text is the backend's own.
    #[error("{0}")]
    Backend(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection error: invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("Backend error: unexpected row shape: {0}")]
    UnexpectedRow(String),

    // ========== Ledger Errors ==========
    #[error("Ledger error: ledger {ledger} is unavailable: {reason}")]
    LedgerUnavailable { ledger: String, reason: String },

    #[error("Ledger error: invalid identifier '{0}'")]
    InvalidIdentifier(String),

    // ========== Configuration Errors ==========
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config error: {0}")]
    Json(#[from] serde_json::Error),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) => Error::Backend(db.to_string()),
            None if err.is_closed() => Error::Connection(err.to_string()),
            None => Error::Backend(err.to_string()),
        }
    }
}

impl From<tiberius::error::Error> for Error {
    fn from(err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Server(token) => Error::Backend(token.message().to_string()),
            tiberius::error::Error::Io { .. } => Error::Connection(err.to_string()),
            other => Error::Backend(other.to_string()),
        }
    }
}

/// Result type alias for tablekeeper operations
pub type Result<T> = std::result::Result<T, Error>;
