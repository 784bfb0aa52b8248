//! Metrics collection for observability
//!
//! This module provides Prometheus metrics fed by the market's observer hooks.
//!
//! # Metrics
//!
//! - `token_operations_total{operation}` - Operations applied
//! - `token_operation_failures_total{operation,kind}` - Operations rejected
//! - `token_rebases_total` - Rebases of the base asset
//! - `token_base_total_supply` - Base asset pooled units after the last operation
//! - `token_receipt_total_supply` - Receipt pool value after the last operation
//! - `token_debt_total_supply` - Debt outstanding after the last operation

use crate::observer::{Operation, OperationObserver, OperationRecord, Totals};
use crate::types::Amount;
use crate::Error;
use prometheus::{Gauge, IntCounter, IntCounterVec, Opts, Registry};
use rust_decimal::prelude::ToPrimitive;
use std::fmt;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Operations applied, by operation
    pub operations_total: IntCounterVec,

    /// Operations rejected, by operation and error kind
    pub failures_total: IntCounterVec,

    /// Rebases applied
    pub rebases_total: IntCounter,

    /// Base asset pooled units
    pub base_total_supply: Gauge,

    /// Receipt pool value with interest
    pub receipt_total_supply: Gauge,

    /// Debt outstanding with interest
    pub debt_total_supply: Gauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("token_operations_total", "Operations applied"),
            &["operation"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let failures_total = IntCounterVec::new(
            Opts::new("token_operation_failures_total", "Operations rejected"),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(failures_total.clone()))?;

        let rebases_total = IntCounter::new("token_rebases_total", "Rebases of the base asset")?;
        registry.register(Box::new(rebases_total.clone()))?;

        let base_total_supply = Gauge::new("token_base_total_supply", "Base asset pooled units")?;
        registry.register(Box::new(base_total_supply.clone()))?;

        let receipt_total_supply =
            Gauge::new("token_receipt_total_supply", "Receipt pool value with interest")?;
        registry.register(Box::new(receipt_total_supply.clone()))?;

        let debt_total_supply =
            Gauge::new("token_debt_total_supply", "Debt outstanding with interest")?;
        registry.register(Box::new(debt_total_supply.clone()))?;

        Ok(Self {
            operations_total,
            failures_total,
            rebases_total,
            base_total_supply,
            receipt_total_supply,
            debt_total_supply,
            registry,
        })
    }

    /// Record an applied operation
    pub fn record_operation(&self, operation: Operation) {
        self.operations_total
            .with_label_values(&[operation.as_str()])
            .inc();
        if operation == Operation::Rebase {
            self.rebases_total.inc();
        }
    }

    /// Record a rejected operation
    pub fn record_failure(&self, operation: Operation, error: &Error) {
        self.failures_total
            .with_label_values(&[operation.as_str(), error.kind()])
            .inc();
    }

    /// Update the supply gauges
    pub fn update_totals(&self, totals: &Totals) {
        self.base_total_supply.set(as_f64(totals.base_total_supply));
        self.receipt_total_supply.set(as_f64(totals.receipt_total_supply));
        self.debt_total_supply.set(as_f64(totals.debt_total_supply));
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("rebases_total", &self.rebases_total.get())
            .finish_non_exhaustive()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

fn as_f64(amount: Amount) -> f64 {
    amount.to_f64().unwrap_or(f64::NAN)
}

/// Observer that feeds [`Metrics`]
#[derive(Clone, Debug)]
pub struct MetricsObserver {
    metrics: Metrics,
}

impl MetricsObserver {
    /// Wrap a collector
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }

    /// Underlying collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl OperationObserver for MetricsObserver {
    fn on_after_op(&self, record: &OperationRecord, totals: &Totals) {
        self.metrics.record_operation(record.operation);
        self.metrics.update_totals(totals);
    }

    fn on_failed_op(&self, record: &OperationRecord, error: &Error) {
        self.metrics.record_failure(record.operation, error);
    }
}
