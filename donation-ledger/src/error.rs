//! Error types for the donation ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Donation record not found
    #[error("Donation record not found: {0}")]
    RecordNotFound(String),

    /// A record with the same identity already exists
    #[error("Duplicate donation record: {0}")]
    DuplicateRecord(String),

    /// Unparseable blood group or identity
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
