//! Market composition root
//!
//! Owns one base asset, one debt token and one receipt token and wires them
//! together explicitly. Every verb is a short composition of engine calls:
//!
//! | verb       | base asset                        | then                 |
//! |------------|-----------------------------------|----------------------|
//! | `stake`    | mint to holder                    |                      |
//! | `deposit`  | transfer holder -> receipt vault  | receipt mint         |
//! | `borrow`   | transfer receipt vault -> holder  | debt mint            |
//! | `repay`    | transfer holder -> receipt vault  | debt burn            |
//! | `withdraw` | receipt burn                      | transfer vault -> holder |
//!
//! Verbs are atomic. Single-step verbs validate before they write. A
//! two-step verb that moves base units first moves the same shares back when
//! its second step fails; `withdraw` checks the vault before burning.
//!
//! # Example
//!
//! ```
//! use token_core::{generate_address, Market};
//! use rust_decimal_macros::dec;
//!
//! let mut market = Market::new();
//! let alice = generate_address();
//!
//! market.stake(&alice, dec!(1000))?;
//! assert_eq!(market.deposit(&alice, dec!(500))?, dec!(500));
//! market.rebase_by_factor(dec!(2))?;
//! assert_eq!(market.receipt_balance_of(&alice), dec!(1000));
//! # Ok::<(), token_core::Error>(())
//! ```

use crate::{
    config::MarketConfig,
    debt::DebtEngine,
    observer::{Operation, OperationObserver, OperationRecord, Totals},
    rebasing::{self, RebasingAsset},
    receipt::{ReceiptEngine, ReceiptView},
    types::{Address, Amount},
    Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Balances of one holder across the three tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Holder
    pub address: Address,
    /// Base asset units
    pub base_balance: Amount,
    /// Receipt value with interest
    pub receipt_balance: Amount,
    /// Debt with interest
    pub debt_balance: Amount,
}

impl AccountSnapshot {
    /// Render as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Market-wide view for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Address of the receipt vault
    pub receipt_address: Address,
    /// Base units held by the receipt vault
    pub vault_base_balance: Amount,
    /// Current liquidity index
    pub liquidity_index: Amount,
    /// Current borrow index
    pub borrow_index: Amount,
    /// Aggregate totals
    pub totals: Totals,
}

impl MarketSnapshot {
    /// Render as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Base asset, receipt token and debt token wired together
#[derive(Debug, Clone)]
pub struct Market {
    asset: RebasingAsset,
    debt: DebtEngine,
    receipt: ReceiptEngine,
    observer: Option<Arc<dyn OperationObserver>>,
}

impl Default for Market {
    fn default() -> Self {
        Self::new()
    }
}

impl Market {
    /// Create a market with default token metadata and indices of one
    pub fn new() -> Self {
        Self {
            asset: RebasingAsset::default(),
            debt: DebtEngine::default(),
            receipt: ReceiptEngine::default(),
            observer: None,
        }
    }

    /// Create a market from configuration
    pub fn from_config(config: &MarketConfig) -> Result<Self> {
        let mut debt = DebtEngine::new(&config.debt_name, &config.debt_symbol);
        debt.set_borrow_index(config.initial_borrow_index)?;

        let mut receipt = ReceiptEngine::new(&config.receipt_name, &config.receipt_symbol);
        receipt.increase_liquidity_index_by_factor(config.initial_liquidity_index)?;

        Ok(Self {
            asset: RebasingAsset::new(&config.base_name, &config.base_symbol),
            debt,
            receipt,
            observer: None,
        })
    }

    /// Attach an observer
    pub fn with_observer(mut self, observer: Arc<dyn OperationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Base asset
    pub fn asset(&self) -> &RebasingAsset {
        &self.asset
    }

    /// Debt token
    pub fn debt(&self) -> &DebtEngine {
        &self.debt
    }

    /// Receipt token
    pub fn receipt(&self) -> &ReceiptEngine {
        &self.receipt
    }

    /// Receipt token bound to its collaborators
    pub fn receipt_view(&mut self) -> ReceiptView<'_> {
        self.receipt.view(&self.asset, &self.debt)
    }

    /// Base asset units of `holder`
    pub fn base_balance_of(&self, holder: &Address) -> Amount {
        self.asset.balance_of(holder)
    }

    /// Receipt value of `holder` with interest
    pub fn receipt_balance_of(&self, holder: &Address) -> Amount {
        self.receipt.balance_of(&self.asset, &self.debt, holder)
    }

    /// Debt of `holder` with interest
    pub fn debt_balance_of(&self, holder: &Address) -> Amount {
        self.debt.balance_of(holder)
    }

    /// Balances of `holder` across the three tokens
    pub fn account(&self, holder: &Address) -> AccountSnapshot {
        AccountSnapshot {
            address: holder.clone(),
            base_balance: self.base_balance_of(holder),
            receipt_balance: self.receipt_balance_of(holder),
            debt_balance: self.debt_balance_of(holder),
        }
    }

    /// Aggregate totals of the three engines
    pub fn totals(&self) -> Totals {
        Totals {
            base_total_supply: self.asset.total_supply(),
            base_total_shares: self.asset.total_shares(),
            receipt_total_supply: self.receipt.total_supply(&self.asset, &self.debt),
            receipt_scaled_total_supply: self.receipt.scaled_total_supply(&self.asset, &self.debt),
            receipt_raw_total_supply: self.receipt.raw_total_supply(),
            receipt_total_shares: self.receipt.total_shares(),
            debt_total_supply: self.debt.total_supply(),
            borrowed_shares: self.debt.borrowed_shares(),
        }
    }

    /// Market-wide view
    pub fn snapshot(&self) -> MarketSnapshot {
        MarketSnapshot {
            receipt_address: self.receipt.address().clone(),
            vault_base_balance: self.asset.balance_of(self.receipt.address()),
            liquidity_index: self.receipt.liquidity_index(),
            borrow_index: self.debt.borrow_index(),
            totals: self.totals(),
        }
    }

    /// Issue `units` of the base asset to `holder`; returns the new base balance
    pub fn stake(&mut self, holder: &Address, units: Amount) -> Result<Amount> {
        let record = OperationRecord::new(Operation::Stake, Some(holder), units);
        self.run(record, |m| rebasing::stake(&mut m.asset, holder, units))
    }

    /// Move `units` of the base asset into the pool; returns the new receipt balance
    pub fn deposit(&mut self, holder: &Address, units: Amount) -> Result<Amount> {
        let record = OperationRecord::new(Operation::Deposit, Some(holder), units);
        self.run(record, |m| {
            let vault = m.receipt.address().clone();
            m.transfer_then(holder, &vault, units, |m| {
                m.receipt.mint(&m.asset, &m.debt, holder, units)
            })
        })
    }

    /// Lend `units` of the pool to `holder`; returns the new debt balance
    pub fn borrow(&mut self, holder: &Address, units: Amount) -> Result<Amount> {
        let record = OperationRecord::new(Operation::Borrow, Some(holder), units);
        self.run(record, |m| {
            let vault = m.receipt.address().clone();
            m.transfer_then(&vault, holder, units, |m| m.debt.mint(&m.asset, holder, units))
        })
    }

    /// Return `units` against `holder`'s debt; returns the remaining debt
    pub fn repay(&mut self, holder: &Address, units: Amount) -> Result<Amount> {
        let record = OperationRecord::new(Operation::Repay, Some(holder), units);
        self.run(record, |m| {
            let vault = m.receipt.address().clone();
            m.transfer_then(holder, &vault, units, |m| m.debt.burn(&m.asset, holder, units))
        })
    }

    /// Take `units` of the base asset back out of the pool; returns the remaining receipt balance
    pub fn withdraw(&mut self, holder: &Address, units: Amount) -> Result<Amount> {
        let record = OperationRecord::new(Operation::Withdraw, Some(holder), units);
        self.run(record, |m| {
            let vault = m.receipt.address().clone();
            m.asset.shares_to_debit(&vault, units)?;
            let remaining = m.receipt.burn(&m.asset, &m.debt, holder, units)?;
            m.asset.transfer(&vault, holder, units)?;
            Ok(remaining)
        })
    }

    /// Move `units` of the base asset between holders
    pub fn transfer(&mut self, from: &Address, to: &Address, units: Amount) -> Result<bool> {
        let record =
            OperationRecord::new(Operation::Transfer, Some(from), units).with_counterparty(to);
        self.run(record, |m| m.asset.transfer(from, to, units))
    }

    /// Move receipts worth `units` between holders
    pub fn transfer_receipt(&mut self, from: &Address, to: &Address, units: Amount) -> Result<bool> {
        let record = OperationRecord::new(Operation::TransferReceipt, Some(from), units)
            .with_counterparty(to);
        self.run(record, |m| m.receipt.transfer(&m.asset, &m.debt, from, to, units))
    }

    /// Multiply the base asset's pooled units by `factor`; returns the new pooled units
    pub fn rebase_by_factor(&mut self, factor: Amount) -> Result<Amount> {
        let record = OperationRecord::new(Operation::Rebase, None, factor);
        self.run(record, |m| m.asset.rebase_by_factor(factor))
    }

    /// Add `shift` to the base asset's pooled units; returns the new pooled units
    pub fn rebase_by_shift(&mut self, shift: Amount) -> Result<Amount> {
        let record = OperationRecord::new(Operation::Rebase, None, shift);
        self.run(record, |m| m.asset.rebase_by_shift(shift))
    }

    /// Assign the borrow index
    pub fn set_borrow_index(&mut self, index: Amount) -> Result<()> {
        let record = OperationRecord::new(Operation::SetBorrowIndex, None, index);
        self.run(record, |m| m.debt.set_borrow_index(index))
    }

    /// Multiply the liquidity index by `factor`; returns the new index
    pub fn increase_liquidity_index_by_factor(&mut self, factor: Amount) -> Result<Amount> {
        let record = OperationRecord::new(Operation::IncreaseLiquidityIndex, None, factor);
        self.run(record, |m| m.receipt.increase_liquidity_index_by_factor(factor))
    }

    /// Add `shift` to the liquidity index; returns the new index
    pub fn increase_liquidity_index_by_shift(&mut self, shift: Amount) -> Result<Amount> {
        let record = OperationRecord::new(Operation::IncreaseLiquidityIndex, None, shift);
        self.run(record, |m| m.receipt.increase_liquidity_index_by_shift(shift))
    }

    /// Move `units` of the base asset, then run `next`; on failure the shares go back
    fn transfer_then<T>(
        &mut self,
        from: &Address,
        to: &Address,
        units: Amount,
        next: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let shares = self.asset.move_units(from, to, units)?;
        match next(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                if let Err(undo) = self.asset.move_shares(to, from, shares) {
                    error!(%from, %to, %shares, error = %undo, "could not return base shares");
                }
                Err(err)
            }
        }
    }

    /// Apply `op`, notifying the observer around it
    fn run<T>(
        &mut self,
        record: OperationRecord,
        op: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if let Some(observer) = &self.observer {
            observer.on_before_op(&record, &self.totals());
        }

        match op(self) {
            Ok(value) => {
                debug!(operation = %record.operation, value = %record.value, "market operation applied");
                if let Some(observer) = &self.observer {
                    observer.on_after_op(&record, &self.totals());
                }
                Ok(value)
            }
            Err(err) => {
                debug!(operation = %record.operation, error = %err, "market operation rejected");
                if let Some(observer) = &self.observer {
                    observer.on_failed_op(&record, &err);
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::CompositeObserver;
    use crate::types::generate_address;
    use crate::Error;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Counting {
        after: Mutex<Vec<Operation>>,
        failed: Mutex<Vec<Operation>>,
    }

    impl OperationObserver for Counting {
        fn on_after_op(&self, record: &OperationRecord, _totals: &Totals) {
            self.after.lock().unwrap().push(record.operation);
        }

        fn on_failed_op(&self, record: &OperationRecord, _error: &Error) {
            self.failed.lock().unwrap().push(record.operation);
        }
    }

    #[test]
    fn test_scenario_stake_deposit_borrow() {
        let mut market = Market::new();
        let a = generate_address();
        let b = generate_address();
        let c = generate_address();

        assert_eq!(market.stake(&a, dec!(1000)).unwrap(), dec!(1000));
        assert_eq!(market.stake(&b, dec!(1000)).unwrap(), dec!(1000));
        assert_eq!(market.deposit(&a, dec!(500)).unwrap(), dec!(500));
        assert_eq!(market.deposit(&b, dec!(500)).unwrap(), dec!(500));
        assert_eq!(market.borrow(&c, dec!(500)).unwrap(), dec!(500));

        let vault = market.receipt().address().clone();
        assert_eq!(market.base_balance_of(&vault), dec!(500));
        assert_eq!(market.receipt_balance_of(&a), dec!(500));
        assert_eq!(market.debt_balance_of(&c), dec!(500));
    }

    #[test]
    fn test_failed_deposit_rolls_back() {
        let mut market = Market::new();
        let a = generate_address();
        market.stake(&a, dec!(10)).unwrap();

        let err = market.deposit(&a, dec!(11)).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert_eq!(market.base_balance_of(&a), dec!(10));
        assert_eq!(market.receipt().raw_total_supply(), Amount::ZERO);
    }

    #[test]
    fn test_failed_withdraw_restores_receipts() {
        let mut market = Market::new();
        let a = generate_address();
        let c = generate_address();
        market.stake(&a, dec!(100)).unwrap();
        market.deposit(&a, dec!(100)).unwrap();
        market.borrow(&c, dec!(80)).unwrap();

        // Receipts cover the withdrawal, the vault does not
        let err = market.withdraw(&a, dec!(50)).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert_eq!(market.receipt_balance_of(&a), dec!(100));
        assert_eq!(market.receipt().total_shares(), dec!(100));
        assert_eq!(market.base_balance_of(market.receipt().address()), dec!(20));
    }

    #[test]
    fn test_failed_repay_returns_base_shares() {
        let mut market = Market::new();
        let a = generate_address();
        let c = generate_address();
        market.stake(&a, dec!(100)).unwrap();
        market.deposit(&a, dec!(100)).unwrap();
        market.borrow(&c, dec!(50)).unwrap();
        market.stake(&c, dec!(10)).unwrap();
        market.rebase_by_factor(dec!(1.3)).unwrap();
        let c_shares = market.asset().shares_of(&c);
        let before = market.snapshot();

        // Base transfer succeeds, debt burn exceeds the debt
        let err = market.repay(&c, dec!(70)).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert_eq!(market.asset().shares_of(&c), c_shares);
        assert_eq!(market.snapshot(), before);
    }

    #[test]
    fn test_failed_borrow_returns_base_shares() {
        let mut market = Market::new();
        let a = generate_address();
        let c = generate_address();
        market.stake(&a, dec!(100)).unwrap();
        market.deposit(&a, dec!(100)).unwrap();
        market.set_borrow_index(Amount::ZERO).unwrap();
        let before = market.snapshot();

        // Vault transfer succeeds, debt mint cannot scale by a zero index
        let err = market.borrow(&c, dec!(40)).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(market.base_balance_of(&c), Amount::ZERO);
        assert_eq!(market.snapshot(), before);
    }

    #[test]
    fn test_withdraw_returns_base_units() {
        let mut market = Market::new();
        let a = generate_address();
        market.stake(&a, dec!(100)).unwrap();
        market.deposit(&a, dec!(100)).unwrap();
        market.rebase_by_factor(dec!(1.5)).unwrap();

        assert_eq!(market.withdraw(&a, dec!(150)).unwrap(), Amount::ZERO);
        assert_eq!(market.base_balance_of(&a), dec!(150));
        assert_eq!(market.base_balance_of(market.receipt().address()), Amount::ZERO);
    }

    #[test]
    fn test_transfer_receipt() {
        let mut market = Market::new();
        let a = generate_address();
        let b = generate_address();
        market.stake(&a, dec!(100)).unwrap();
        market.deposit(&a, dec!(60)).unwrap();

        assert!(market.transfer_receipt(&a, &b, dec!(20)).unwrap());
        assert_eq!(market.receipt_balance_of(&a), dec!(40));
        assert_eq!(market.receipt_balance_of(&b), dec!(20));

        assert!(market.transfer(&a, &b, dec!(40)).unwrap());
        assert_eq!(market.base_balance_of(&b), dec!(40));
    }

    #[test]
    fn test_from_config_applies_indices() {
        let config = MarketConfig {
            initial_borrow_index: dec!(1.2),
            initial_liquidity_index: dec!(1.1),
            receipt_symbol: "aTKN".to_string(),
            ..MarketConfig::default()
        };
        let market = Market::from_config(&config).unwrap();

        assert_eq!(market.debt().borrow_index(), dec!(1.2));
        assert_eq!(market.receipt().liquidity_index(), dec!(1.1));
        assert_eq!(market.receipt().info().symbol, "aTKN");
    }

    #[test]
    fn test_observer_sees_applied_and_failed() {
        let counting = Arc::new(Counting::default());
        let observer = CompositeObserver::new().with(counting.clone());
        let mut market = Market::new().with_observer(Arc::new(observer));
        let a = generate_address();

        market.stake(&a, dec!(10)).unwrap();
        market.rebase_by_factor(dec!(2)).unwrap();
        assert!(market.set_borrow_index(dec!(-1)).is_err());

        assert_eq!(
            *counting.after.lock().unwrap(),
            vec![Operation::Stake, Operation::Rebase]
        );
        assert_eq!(*counting.failed.lock().unwrap(), vec![Operation::SetBorrowIndex]);
    }

    #[test]
    fn test_snapshot_reports_vault() {
        let mut market = Market::new();
        let a = generate_address();
        market.stake(&a, dec!(100)).unwrap();
        market.deposit(&a, dec!(30)).unwrap();

        let snapshot = market.snapshot();
        assert_eq!(snapshot.vault_base_balance, dec!(30));
        assert_eq!(snapshot.totals.receipt_total_supply, dec!(30));
        assert_eq!(snapshot.borrow_index, Amount::ONE);

        let account = market.account(&a);
        assert_eq!(account.base_balance, dec!(70));
        assert_eq!(account.receipt_balance, dec!(30));
        assert_eq!(account.debt_balance, Amount::ZERO);
    }

    #[test]
    fn test_account_json_round_trip() {
        let mut market = Market::new();
        let a = generate_address();
        market.stake(&a, dec!(0.1)).unwrap();
        market.rebase_by_factor(dec!(3)).unwrap();

        let json = market.account(&a).to_json().unwrap();
        let parsed: AccountSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.base_balance, dec!(0.3));
        assert!(json.contains("\"base_balance\": \""));
    }
}
