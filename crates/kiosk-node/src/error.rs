//! Error types for the kiosk node.

use kiosk_ledger::LedgerError;
use thiserror::Error;

/// Result type for kiosk node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in kiosk node operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unknown category or record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected before reaching the allocator; nothing was mutated
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Ledger precondition violated (caller bug)
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Bad node configuration
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
