//! Injected operation observers
//!
//! The [`Market`](crate::Market) calls an optional observer before and after
//! every mutating operation. Observers see records and totals; they cannot
//! change the outcome of an operation.

use crate::{
    types::{Address, Amount},
    Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Market operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Base asset issued against the underlying
    Stake,
    /// Base units moved into the receipt pool
    Deposit,
    /// Base units lent out of the receipt pool
    Borrow,
    /// Base units returned against debt
    Repay,
    /// Base units taken back out of the receipt pool
    Withdraw,
    /// Base units moved between holders
    Transfer,
    /// Receipts moved between holders
    TransferReceipt,
    /// Pooled units of the base asset changed
    Rebase,
    /// Borrow index assigned
    SetBorrowIndex,
    /// Liquidity index raised
    IncreaseLiquidityIndex,
}

impl Operation {
    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Stake => "stake",
            Operation::Deposit => "deposit",
            Operation::Borrow => "borrow",
            Operation::Repay => "repay",
            Operation::Withdraw => "withdraw",
            Operation::Transfer => "transfer",
            Operation::TransferReceipt => "transfer_receipt",
            Operation::Rebase => "rebase",
            Operation::SetBorrowIndex => "set_borrow_index",
            Operation::IncreaseLiquidityIndex => "increase_liquidity_index",
        }
    }

    /// Every operation, in declaration order
    pub const ALL: [Operation; 10] = [
        Operation::Stake,
        Operation::Deposit,
        Operation::Borrow,
        Operation::Repay,
        Operation::Withdraw,
        Operation::Transfer,
        Operation::TransferReceipt,
        Operation::Rebase,
        Operation::SetBorrowIndex,
        Operation::IncreaseLiquidityIndex,
    ];
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempted operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    /// What was attempted
    pub operation: Operation,
    /// Holder the operation acts for, if any
    pub holder: Option<Address>,
    /// Receiving holder of a transfer
    pub counterparty: Option<Address>,
    /// Amount, factor, shift or index, depending on the operation
    pub value: Amount,
    /// When the operation started
    pub started_at: DateTime<Utc>,
}

impl OperationRecord {
    /// Record for `operation` acting for `holder`
    pub fn new(operation: Operation, holder: Option<&Address>, value: Amount) -> Self {
        Self {
            operation,
            holder: holder.cloned(),
            counterparty: None,
            value,
            started_at: Utc::now(),
        }
    }

    /// Attach the receiving side of a transfer
    pub fn with_counterparty(mut self, counterparty: &Address) -> Self {
        self.counterparty = Some(counterparty.clone());
        self
    }
}

/// Aggregate state of the three engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    /// Base asset pooled units
    pub base_total_supply: Amount,
    /// Base asset shares
    pub base_total_shares: Amount,
    /// Receipt pool value with interest
    pub receipt_total_supply: Amount,
    /// Receipt pool value at index one
    pub receipt_scaled_total_supply: Amount,
    /// Receipt raw ledger total
    pub receipt_raw_total_supply: Amount,
    /// Base shares tracked by the receipt pool
    pub receipt_total_shares: Amount,
    /// Debt outstanding with interest
    pub debt_total_supply: Amount,
    /// Base shares lent out
    pub borrowed_shares: Amount,
}

/// Event sink for market operations
///
/// Every method has an empty default; implement the ones you need.
pub trait OperationObserver: Send + Sync + fmt::Debug {
    /// Called before the operation touches any state
    fn on_before_op(&self, _record: &OperationRecord, _totals: &Totals) {}

    /// Called after the operation applied
    fn on_after_op(&self, _record: &OperationRecord, _totals: &Totals) {}

    /// Called after the operation failed without leaving partial effects
    fn on_failed_op(&self, _record: &OperationRecord, _error: &Error) {}
}

/// Logs every operation through `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingObserver {
    verbose: bool,
}

impl TracingObserver {
    /// `verbose` raises before/after records from `debug` to `info`
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

fn log_stage(verbose: bool, stage: &'static str, record: &OperationRecord, totals: &Totals) {
    if verbose {
        tracing::info!(
            stage,
            operation = %record.operation,
            holder = ?record.holder,
            counterparty = ?record.counterparty,
            value = %record.value,
            base_total_supply = %totals.base_total_supply,
            receipt_total_supply = %totals.receipt_total_supply,
            receipt_total_shares = %totals.receipt_total_shares,
            debt_total_supply = %totals.debt_total_supply,
            borrowed_shares = %totals.borrowed_shares,
            "market operation"
        );
    } else {
        tracing::debug!(
            stage,
            operation = %record.operation,
            holder = ?record.holder,
            value = %record.value,
            base_total_supply = %totals.base_total_supply,
            receipt_total_supply = %totals.receipt_total_supply,
            debt_total_supply = %totals.debt_total_supply,
            "market operation"
        );
    }
}

impl OperationObserver for TracingObserver {
    fn on_before_op(&self, record: &OperationRecord, totals: &Totals) {
        log_stage(self.verbose, "before", record, totals);
    }

    fn on_after_op(&self, record: &OperationRecord, totals: &Totals) {
        log_stage(self.verbose, "after", record, totals);
    }

    fn on_failed_op(&self, record: &OperationRecord, error: &Error) {
        tracing::warn!(
            operation = %record.operation,
            holder = ?record.holder,
            value = %record.value,
            error = %error,
            "market operation rejected"
        );
    }
}

/// Fans every call out to several observers, in order
#[derive(Debug, Clone, Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn OperationObserver>>,
}

impl CompositeObserver {
    /// Create an empty composite
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observer
    pub fn with(mut self, observer: Arc<dyn OperationObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Number of observers
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// True when no observer is attached
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl OperationObserver for CompositeObserver {
    fn on_before_op(&self, record: &OperationRecord, totals: &Totals) {
        for observer in &self.observers {
            observer.on_before_op(record, totals);
        }
    }

    fn on_after_op(&self, record: &OperationRecord, totals: &Totals) {
        for observer in &self.observers {
            observer.on_after_op(record, totals);
        }
    }

    fn on_failed_op(&self, record: &OperationRecord, error: &Error) {
        for observer in &self.observers {
            observer.on_failed_op(record, error);
        }
    }
}
