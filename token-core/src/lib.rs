//! Rebasing token accounting
//!
//! Share-based ledgers for a rebasing base asset and the two index-scaled
//! tokens a lending pool issues on top of it.
//!
//! # Architecture
//!
//! - **Shares, not balances**: every token stores an internal quantity and
//!   derives the visible balance on read
//! - **Rebasing base asset**: one pooled-units figure moves every balance at once
//! - **Debt token**: scaled by a borrow index, non-transferable
//! - **Receipt token**: scaled by a liquidity index, minted proportionally
//!   so a deposit never dilutes existing holders
//! - **Single writer**: [`Market`] is a plain state machine; share it across
//!   tasks through the [`actor`] module
//!
//! # Invariants
//!
//! - Base shares are conserved by transfers
//! - Raw receipt weights are conserved by transfers
//! - `borrowed_shares` moves only through debt mint and burn
//! - A failed market operation leaves no trace

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod math;
pub mod error;
pub mod ledger;
pub mod token;
pub mod rebasing;
pub mod debt;
pub mod receipt;
pub mod observer;
pub mod metrics;
pub mod market;
pub mod actor;
pub mod config;

// Re-exports
pub use error::{Error, Result};
pub use types::{generate_address, Address, Amount, TokenInfo};
pub use ledger::Ledger;
pub use token::{Allowances, Token};
pub use rebasing::RebasingAsset;
pub use debt::{BorrowedState, DebtEngine};
pub use receipt::{ReceiptEngine, ReceiptView};
pub use observer::{
    CompositeObserver, Operation, OperationObserver, OperationRecord, Totals, TracingObserver,
};
pub use metrics::{Metrics, MetricsObserver};
pub use market::{AccountSnapshot, Market, MarketSnapshot};
pub use actor::{spawn_market_actor, MarketHandle};
pub use config::Config;
