//! Core types shared by every engine
//!
//! All types are designed for:
//! - Exact arithmetic (Decimal for amounts)
//! - Cheap cloning of identifiers
//! - Serialization of read-only snapshots

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Token amount: units, shares, scaled or raw, depending on the ledger.
pub type Amount = Decimal;

/// Opaque holder identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create address from any string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh address as a 20-byte hex string.
    ///
    /// Practically unique; there is no cryptographic guarantee.
    pub fn generate() -> Self {
        Self(format!("0x{:0>40}", Uuid::new_v4().simple().to_string()))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Generate a new holder address
pub fn generate_address() -> Address {
    Address::generate()
}

/// Token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Human-readable name
    pub name: String,
    /// Ticker symbol
    pub symbol: String,
    /// Address of the token itself; holds whatever is deposited into it
    pub address: Address,
}

impl TokenInfo {
    /// Create metadata with a freshly generated address
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            address: Address::generate(),
        }
    }
}
