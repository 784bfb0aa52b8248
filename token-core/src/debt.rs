//! Scaled-balance debt token
//!
//! Debt is stored at index one ("scaled") and reported multiplied by the
//! borrow index. The engine also keeps `borrowed_shares`, the base-asset
//! share equivalent of everything lent out, which the receipt engine needs
//! to split its pool into held and lent parts.
//!
//! `borrowed_shares` is accumulated at the rate prevailing at each mint and
//! burn; it is never recomputed from the scaled supply.
//!
//! Debt positions cannot be transferred or delegated.

use crate::{
    error::require,
    ledger::{check_value, Ledger},
    rebasing::RebasingAsset,
    token::{Allowances, Token},
    types::{Address, Amount, TokenInfo},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default name of the debt token
pub const DEFAULT_NAME: &str = "variable debt stETH token";
/// Default symbol of the debt token
pub const DEFAULT_SYMBOL: &str = "variableDebtStETH";

/// Aggregate lent-out position, read by the receipt engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowedState {
    /// Base-asset shares lent out
    pub borrowed_shares: Amount,
    /// Scaled debt outstanding
    pub scaled_total_supply: Amount,
}

/// Interest-bearing debt token
#[derive(Debug, Clone)]
pub struct DebtEngine {
    info: TokenInfo,
    scaled: Ledger,
    borrow_index: Amount,
    borrowed_shares: Amount,
}

impl Default for DebtEngine {
    fn default() -> Self {
        Self::new(DEFAULT_NAME, DEFAULT_SYMBOL)
    }
}

impl DebtEngine {
    /// Create an empty debt token with a borrow index of one
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            info: TokenInfo::new(name, symbol),
            scaled: Ledger::new(),
            borrow_index: Amount::ONE,
            borrowed_shares: Amount::ZERO,
        }
    }

    /// Token metadata
    pub fn info(&self) -> &TokenInfo {
        &self.info
    }

    /// Current borrow index
    pub fn borrow_index(&self) -> Amount {
        self.borrow_index
    }

    /// Set the borrow index.
    ///
    /// Monotonicity is the caller's responsibility: a smaller index is
    /// accepted and shrinks every debt balance.
    pub fn set_borrow_index(&mut self, index: Amount) -> Result<()> {
        require(!index.is_sign_negative() || index.is_zero(), || {
            Error::InvalidParameter(format!("borrow index must be non-negative, got {}", index))
        })?;
        if index < self.borrow_index {
            warn!(symbol = %self.info.symbol, old = %self.borrow_index, new = %index, "borrow index decreased");
        }
        self.borrow_index = index;
        info!(symbol = %self.info.symbol, borrow_index = %index, "borrow index set");
        Ok(())
    }

    /// Base-asset shares lent out
    pub fn borrowed_shares(&self) -> Amount {
        self.borrowed_shares
    }

    /// Snapshot of the lent-out position
    pub fn borrowed_state(&self) -> BorrowedState {
        BorrowedState {
            borrowed_shares: self.borrowed_shares,
            scaled_total_supply: self.scaled_total_supply(),
        }
    }

    /// Debt outstanding at index one
    pub fn scaled_total_supply(&self) -> Amount {
        self.scaled.total_supply()
    }

    /// Debt of `holder` at index one
    pub fn scaled_balance_of(&self, holder: &Address) -> Amount {
        self.scaled.balance_of(holder)
    }

    /// Every address that ever borrowed
    pub fn holders(&self) -> impl Iterator<Item = &Address> {
        self.scaled.holders()
    }

    /// Debt outstanding with interest
    pub fn total_supply(&self) -> Amount {
        self.scaled_total_supply() * self.borrow_index
    }

    /// Debt of `holder` with interest
    pub fn balance_of(&self, holder: &Address) -> Amount {
        self.scaled_balance_of(holder) * self.borrow_index
    }

    /// Record `units` of new debt for `holder`.
    ///
    /// Returns the holder's debt **with interest** (`scaled * borrow_index`).
    pub fn mint(&mut self, asset: &RebasingAsset, holder: &Address, units: Amount) -> Result<Amount> {
        check_value(units)?;
        if units.is_zero() {
            return Ok(self.balance_of(holder));
        }

        let scaled = self.scale(units)?;
        let shares = asset.shares_for_units(scaled);
        self.scaled.mint(holder, scaled)?;
        self.borrowed_shares += shares;
        debug!(symbol = %self.info.symbol, %holder, %units, %scaled, %shares, "debt minted");
        Ok(self.balance_of(holder))
    }

    /// Clear `units` of `holder`'s debt.
    ///
    /// Returns the holder's remaining debt with interest.
    pub fn burn(&mut self, asset: &RebasingAsset, holder: &Address, units: Amount) -> Result<Amount> {
        check_value(units)?;
        if units.is_zero() {
            return Ok(self.balance_of(holder));
        }

        let available = self.balance_of(holder);
        require(units <= available, || Error::InsufficientBalance {
            holder: holder.clone(),
            requested: units,
            available,
        })?;
        let held = self.scaled_balance_of(holder);
        let scaled = if units == available {
            held
        } else {
            self.scale(units)?.min(held)
        };

        let shares = asset.shares_for_units(scaled);
        self.scaled.burn(holder, scaled)?;
        self.borrowed_shares -= shares;
        debug!(symbol = %self.info.symbol, %holder, %units, %scaled, %shares, "debt burned");
        Ok(self.balance_of(holder))
    }

    /// Debt positions are not transferable
    pub fn transfer(&mut self, _from: &Address, _to: &Address, _value: Amount) -> Result<bool> {
        Err(Error::UnsupportedOperation("transfer of debt tokens"))
    }

    fn scale(&self, units: Amount) -> Result<Amount> {
        require(!self.borrow_index.is_zero(), || {
            Error::InvalidState("borrow index is zero".to_string())
        })?;
        Ok(units / self.borrow_index)
    }
}

impl Token for DebtEngine {
    fn total_supply(&self) -> Amount {
        DebtEngine::total_supply(self)
    }

    fn balance_of(&self, holder: &Address) -> Amount {
        DebtEngine::balance_of(self, holder)
    }

    fn transfer(&mut self, from: &Address, to: &Address, value: Amount) -> Result<bool> {
        DebtEngine::transfer(self, from, to, value)
    }
}

impl Allowances for DebtEngine {
    fn approve(&mut self, _owner: &Address, _spender: &Address, _value: Amount) -> Result<bool> {
        Err(Error::UnsupportedOperation("approve on debt tokens"))
    }

    fn allowance(&self, _owner: &Address, _spender: &Address) -> Result<Amount> {
        Err(Error::UnsupportedOperation("allowance on debt tokens"))
    }

    fn transfer_from(
        &mut self,
        _spender: &Address,
        _owner: &Address,
        _to: &Address,
        _value: Amount,
    ) -> Result<bool> {
        Err(Error::UnsupportedOperation("transfer_from of debt tokens"))
    }
}
