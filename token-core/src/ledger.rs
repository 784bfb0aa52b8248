//! Plain non-rebasing ledger
//!
//! Balance, allowance and total-supply bookkeeping shared by every engine.
//! The engines never subclass it; each one owns a `Ledger` and decides what
//! its balances mean (shares, scaled debt, raw receipt units).
//!
//! # Invariants
//!
//! - `total_supply() == Σ balance_of(a)` over every address ever touched
//! - No balance is ever negative
//! - A failed operation leaves the ledger untouched

use crate::{
    error::require,
    token::{Allowances, Token},
    types::{Address, Amount},
    Error, Result,
};
use std::collections::HashMap;

/// Balance map with guarded transfer, mint and burn
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    balances: HashMap<Address, Amount>,
    allowances: HashMap<Address, HashMap<Address, Amount>>,
    total_supply: Amount,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all balances
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Balance of `holder`, zero if never touched
    pub fn balance_of(&self, holder: &Address) -> Amount {
        self.balances.get(holder).copied().unwrap_or(Amount::ZERO)
    }

    /// Every address that ever held a balance
    pub fn holders(&self) -> impl Iterator<Item = &Address> {
        self.balances.keys()
    }

    /// Move `value` from `from` to `to`
    pub fn transfer(&mut self, from: &Address, to: &Address, value: Amount) -> Result<bool> {
        check_value(value)?;
        if value.is_zero() {
            return Ok(true);
        }
        self.require_balance(from, value)?;

        *self.balances.entry(from.clone()).or_default() -= value;
        *self.balances.entry(to.clone()).or_default() += value;
        Ok(true)
    }

    /// Credit `value` to `holder`; returns the new balance
    pub fn mint(&mut self, holder: &Address, value: Amount) -> Result<Amount> {
        check_value(value)?;
        if value.is_zero() {
            return Ok(self.balance_of(holder));
        }

        let balance = self.balances.entry(holder.clone()).or_default();
        *balance += value;
        self.total_supply += value;
        Ok(*balance)
    }

    /// Debit `value` from `holder`; returns the new balance
    pub fn burn(&mut self, holder: &Address, value: Amount) -> Result<Amount> {
        check_value(value)?;
        if value.is_zero() {
            return Ok(self.balance_of(holder));
        }
        self.require_balance(holder, value)?;

        let balance = self.balances.entry(holder.clone()).or_default();
        *balance -= value;
        self.total_supply -= value;
        Ok(*balance)
    }

    /// Set the amount `spender` may move out of `owner`'s balance
    pub fn approve(&mut self, owner: &Address, spender: &Address, value: Amount) -> Result<bool> {
        check_value(value)?;
        self.allowances
            .entry(owner.clone())
            .or_default()
            .insert(spender.clone(), value);
        Ok(true)
    }

    /// Amount `spender` may still move out of `owner`'s balance
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|approved| approved.get(spender))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Move `value` from `owner` to `to` on behalf of `spender`
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        owner: &Address,
        to: &Address,
        value: Amount,
    ) -> Result<bool> {
        check_value(value)?;
        if value.is_zero() {
            return Ok(true);
        }

        let available = self.allowance(owner, spender);
        require(available >= value, || Error::InsufficientAllowance {
            owner: owner.clone(),
            spender: spender.clone(),
            requested: value,
            available,
        })?;
        self.require_balance(owner, value)?;

        if let Some(approved) = self
            .allowances
            .get_mut(owner)
            .and_then(|approved| approved.get_mut(spender))
        {
            *approved -= value;
        }
        self.transfer(owner, to, value)
    }

    fn require_balance(&self, holder: &Address, value: Amount) -> Result<()> {
        let available = self.balance_of(holder);
        require(available >= value, || Error::InsufficientBalance {
            holder: holder.clone(),
            requested: value,
            available,
        })
    }
}

/// Reject negative amounts before any state is touched.
pub(crate) fn check_value(value: Amount) -> Result<()> {
    require(!value.is_sign_negative() || value.is_zero(), || {
        Error::InvalidParameter(format!("amount must be non-negative, got {}", value))
    })
}

impl Token for Ledger {
    fn total_supply(&self) -> Amount {
        Ledger::total_supply(self)
    }

    fn balance_of(&self, holder: &Address) -> Amount {
        Ledger::balance_of(self, holder)
    }

    fn transfer(&mut self, from: &Address, to: &Address, value: Amount) -> Result<bool> {
        Ledger::transfer(self, from, to, value)
    }
}

impl Allowances for Ledger {
    fn approve(&mut self, owner: &Address, spender: &Address, value: Amount) -> Result<bool> {
        Ledger::approve(self, owner, spender, value)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Result<Amount> {
        Ok(Ledger::allowance(self, owner, spender))
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        owner: &Address,
        to: &Address,
        value: Amount,
    ) -> Result<bool> {
        Ledger::transfer_from(self, spender, owner, to, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sum_of_balances(ledger: &Ledger) -> Amount {
        ledger.holders().map(|h| ledger.balance_of(h)).sum()
    }

    #[test]
    fn test_mint_and_burn_track_total_supply() {
        let mut ledger = Ledger::new();
        let a = Address::new("a");
        let b = Address::new("b");

        assert_eq!(ledger.mint(&a, dec!(100)).unwrap(), dec!(100));
        assert_eq!(ledger.mint(&b, dec!(50)).unwrap(), dec!(50));
        assert_eq!(ledger.burn(&a, dec!(30)).unwrap(), dec!(70));

        assert_eq!(ledger.total_supply(), dec!(120));
        assert_eq!(sum_of_balances(&ledger), ledger.total_supply());
    }

    #[test]
    fn test_transfer_moves_balance() {
        let mut ledger = Ledger::new();
        let a = Address::new("a");
        let b = Address::new("b");
        ledger.mint(&a, dec!(17)).unwrap();

        assert!(ledger.transfer(&a, &b, dec!(17)).unwrap());
        assert_eq!(ledger.balance_of(&a), Amount::ZERO);
        assert_eq!(ledger.balance_of(&b), dec!(17));
        assert_eq!(ledger.total_supply(), dec!(17));
    }

    #[test]
    fn test_transfer_insufficient_balance_has_no_effect() {
        let mut ledger = Ledger::new();
        let a = Address::new("a");
        let b = Address::new("b");
        ledger.mint(&a, dec!(5)).unwrap();

        let err = ledger.transfer(&a, &b, dec!(6)).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert_eq!(ledger.balance_of(&a), dec!(5));
        assert_eq!(ledger.balance_of(&b), Amount::ZERO);
    }

    #[test]
    fn test_burn_insufficient_balance() {
        let mut ledger = Ledger::new();
        let a = Address::new("a");
        ledger.mint(&a, dec!(1)).unwrap();

        assert!(matches!(
            ledger.burn(&a, dec!(2)),
            Err(Error::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.total_supply(), dec!(1));
    }

    #[test]
    fn test_zero_value_is_noop() {
        let mut ledger = Ledger::new();
        let a = Address::new("a");
        let b = Address::new("b");

        assert!(ledger.transfer(&a, &b, Amount::ZERO).unwrap());
        assert_eq!(ledger.mint(&a, Amount::ZERO).unwrap(), Amount::ZERO);
        assert_eq!(ledger.burn(&a, Amount::ZERO).unwrap(), Amount::ZERO);
        assert_eq!(ledger.total_supply(), Amount::ZERO);
        assert_eq!(ledger.holders().count(), 0);
    }

    #[test]
    fn test_negative_value_rejected() {
        let mut ledger = Ledger::new();
        let a = Address::new("a");

        assert!(matches!(
            ledger.mint(&a, dec!(-1)),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let mut ledger = Ledger::new();
        let owner = Address::new("owner");
        let spender = Address::new("spender");
        let to = Address::new("to");
        ledger.mint(&owner, dec!(100)).unwrap();

        ledger.approve(&owner, &spender, dec!(40)).unwrap();
        assert_eq!(ledger.allowance(&owner, &spender), dec!(40));

        assert!(ledger.transfer_from(&spender, &owner, &to, dec!(25)).unwrap());
        assert_eq!(ledger.allowance(&owner, &spender), dec!(15));
        assert_eq!(ledger.balance_of(&to), dec!(25));
        assert_eq!(ledger.balance_of(&owner), dec!(75));
    }

    #[test]
    fn test_transfer_from_insufficient_allowance() {
        let mut ledger = Ledger::new();
        let owner = Address::new("owner");
        let spender = Address::new("spender");
        ledger.mint(&owner, dec!(100)).unwrap();
        ledger.approve(&owner, &spender, dec!(10)).unwrap();

        let err = ledger
            .transfer_from(&spender, &owner, &spender, dec!(11))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientAllowance { .. }));
        assert_eq!(ledger.allowance(&owner, &spender), dec!(10));
    }

    #[test]
    fn test_transfer_from_insufficient_balance_keeps_allowance() {
        let mut ledger = Ledger::new();
        let owner = Address::new("owner");
        let spender = Address::new("spender");
        ledger.mint(&owner, dec!(5)).unwrap();
        ledger.approve(&owner, &spender, dec!(10)).unwrap();

        let err = ledger
            .transfer_from(&spender, &owner, &spender, dec!(8))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert_eq!(ledger.allowance(&owner, &spender), dec!(10));
        assert_eq!(ledger.balance_of(&owner), dec!(5));
    }
}
