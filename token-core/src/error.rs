//! Error types for the token engines

use crate::types::{Address, Amount};
use thiserror::Error;

/// Result type for token operations
pub type Result<T> = std::result::Result<T, Error>;

/// Token errors
///
/// Every variant describes a failure of the single operation attempted.
/// Nothing is written before the check that raises it.
#[derive(Error, Debug)]
pub enum Error {
    /// Holder has less than the requested amount
    #[error("Insufficient balance: {holder} holds {available}, requested {requested}")]
    InsufficientBalance {
        /// Holder whose balance was checked
        holder: Address,
        /// Amount requested, in the ledger's own denomination
        requested: Amount,
        /// Amount available, in the ledger's own denomination
        available: Amount,
    },

    /// Spender was approved for less than the requested amount
    #[error("Insufficient allowance: {spender} may move {available} of {owner}, requested {requested}")]
    InsufficientAllowance {
        /// Owner of the funds
        owner: Address,
        /// Spender acting on the owner's behalf
        spender: Address,
        /// Amount requested
        requested: Amount,
        /// Amount still approved
        available: Amount,
    },

    /// Operation is not part of this token's surface
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// Argument outside its allowed range (negative index, zero factor, ...)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Engine state in which the requested conversion is undefined
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short machine-friendly name of the variant, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::InsufficientAllowance { .. } => "insufficient_allowance",
            Error::UnsupportedOperation(_) => "unsupported_operation",
            Error::InvalidParameter(_) => "invalid_parameter",
            Error::InvalidState(_) => "invalid_state",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
        }
    }
}

/// Fail the current operation with `err()` unless `condition` holds.
pub fn require(condition: bool, err: impl FnOnce() -> Error) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(err())
    }
}
