//! Share-based rebasing asset
//!
//! Holders own **shares**; the asset reports balances in **units**. The
//! exchange rate is `pooled_units / total_shares`, and a rebase changes
//! `pooled_units` alone, so every holder's unit balance moves at once
//! without touching a single per-holder entry.
//!
//! # Invariants
//!
//! - `balance_of(a) == shares_of(a) * pooled_units / total_shares`
//! - Mint and burn move `pooled_units` and `total_shares` together, leaving
//!   `units_per_share` unchanged; only a rebase moves the rate
//! - `pooled_units == 0` whenever `total_shares == 0`

use crate::{
    error::require,
    ledger::{check_value, Ledger},
    math::{mul_div_or_zero, ratio},
    token::Token,
    types::{Address, Amount, TokenInfo},
    Error, Result,
};
use tracing::{debug, info};

/// Default name of the base asset
pub const DEFAULT_NAME: &str = "stETH token";
/// Default symbol of the base asset
pub const DEFAULT_SYMBOL: &str = "stETH";

/// Base asset with a floating shares/units exchange rate
#[derive(Debug, Clone)]
pub struct RebasingAsset {
    info: TokenInfo,
    shares: Ledger,
    pooled_units: Amount,
}

impl Default for RebasingAsset {
    fn default() -> Self {
        Self::new(DEFAULT_NAME, DEFAULT_SYMBOL)
    }
}

impl RebasingAsset {
    /// Create an empty asset
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            info: TokenInfo::new(name, symbol),
            shares: Ledger::new(),
            pooled_units: Amount::ZERO,
        }
    }

    /// Token metadata
    pub fn info(&self) -> &TokenInfo {
        &self.info
    }

    /// Address of the asset itself
    pub fn address(&self) -> &Address {
        &self.info.address
    }

    /// Units backing all shares; the asset's total supply
    pub fn pooled_units(&self) -> Amount {
        self.pooled_units
    }

    /// Shares outstanding
    pub fn total_shares(&self) -> Amount {
        self.shares.total_supply()
    }

    /// Raw shares of `holder` (debug introspection)
    pub fn shares_of(&self, holder: &Address) -> Amount {
        self.shares.balance_of(holder)
    }

    /// Every address that ever held shares
    pub fn holders(&self) -> impl Iterator<Item = &Address> {
        self.shares.holders()
    }

    /// Units per share; zero when no shares exist
    pub fn units_per_share(&self) -> Amount {
        ratio(self.pooled_units, self.total_shares())
    }

    /// Shares per unit; zero when no units are pooled
    pub fn shares_per_unit(&self) -> Amount {
        ratio(self.total_shares(), self.pooled_units)
    }

    /// Unit value of `shares` at the current rate
    pub fn units_for_shares(&self, shares: Amount) -> Amount {
        mul_div_or_zero(shares, self.pooled_units, self.total_shares())
    }

    /// Share equivalent of `units` at the current rate
    pub fn shares_for_units(&self, units: Amount) -> Amount {
        mul_div_or_zero(units, self.total_shares(), self.pooled_units)
    }

    /// Total supply in units
    pub fn total_supply(&self) -> Amount {
        self.pooled_units
    }

    /// Balance of `holder` in units
    pub fn balance_of(&self, holder: &Address) -> Amount {
        self.units_for_shares(self.shares_of(holder))
    }

    /// Issue `units` to `holder`; returns the holder's new unit balance.
    ///
    /// The first mint ever sets the rate to one unit per share.
    pub fn mint(&mut self, holder: &Address, units: Amount) -> Result<Amount> {
        check_value(units)?;
        if units.is_zero() {
            return Ok(self.balance_of(holder));
        }

        if self.total_shares().is_zero() {
            self.shares.mint(holder, units)?;
            self.pooled_units = units;
            debug!(symbol = %self.info.symbol, %holder, %units, "first mint at one unit per share");
            return Ok(self.balance_of(holder));
        }

        require(!self.pooled_units.is_zero(), || {
            Error::InvalidState("shares outstanding with no pooled units".to_string())
        })?;
        let pooled_units = self.pooled_units.checked_add(units).ok_or_else(|| {
            Error::InvalidParameter(format!("minting {} overflows pooled units", units))
        })?;
        let shares = self.shares_for_units(units);
        self.shares.mint(holder, shares)?;
        self.pooled_units = pooled_units;
        debug!(symbol = %self.info.symbol, %holder, %units, %shares, "minted");
        Ok(self.balance_of(holder))
    }

    /// Redeem `units` from `holder`; returns the holder's new unit balance.
    ///
    /// Pooled units shrink by the same amount, so the rate is unchanged.
    pub fn burn(&mut self, holder: &Address, units: Amount) -> Result<Amount> {
        check_value(units)?;
        if units.is_zero() {
            return Ok(self.balance_of(holder));
        }

        let shares = self.shares_to_debit(holder, units)?;
        self.shares.burn(holder, shares)?;
        self.pooled_units = if self.total_shares().is_zero() {
            Amount::ZERO
        } else {
            (self.pooled_units - units).max(Amount::ZERO)
        };
        debug!(symbol = %self.info.symbol, %holder, %units, %shares, "burned");
        Ok(self.balance_of(holder))
    }

    /// Move `units` from `from` to `to`
    pub fn transfer(&mut self, from: &Address, to: &Address, units: Amount) -> Result<bool> {
        self.move_units(from, to, units).map(|_| true)
    }

    /// Move `units` from `from` to `to`; returns the shares that changed hands.
    pub(crate) fn move_units(&mut self, from: &Address, to: &Address, units: Amount) -> Result<Amount> {
        check_value(units)?;
        if units.is_zero() {
            return Ok(Amount::ZERO);
        }

        let shares = self.shares_to_debit(from, units)?;
        self.shares.transfer(from, to, shares)?;
        Ok(shares)
    }

    /// Move raw `shares` from `from` to `to`, bypassing the unit conversion.
    pub(crate) fn move_shares(&mut self, from: &Address, to: &Address, shares: Amount) -> Result<bool> {
        self.shares.transfer(from, to, shares)
    }

    /// Multiply pooled units by `factor`; returns the new pooled units.
    pub fn rebase_by_factor(&mut self, factor: Amount) -> Result<Amount> {
        require(factor > Amount::ZERO, || {
            Error::InvalidParameter(format!("rebase factor must be positive, got {}", factor))
        })?;
        self.require_shares()?;

        self.pooled_units = self.pooled_units.checked_mul(factor).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "rebase factor {} overflows {} pooled units",
                factor, self.pooled_units
            ))
        })?;
        info!(symbol = %self.info.symbol, %factor, pooled_units = %self.pooled_units, "rebase by factor");
        Ok(self.pooled_units)
    }

    /// Add `shift` (possibly negative) to pooled units; returns the new pooled units.
    pub fn rebase_by_shift(&mut self, shift: Amount) -> Result<Amount> {
        self.require_shares()?;
        let pooled_units = self.pooled_units.checked_add(shift).ok_or_else(|| {
            Error::InvalidParameter(format!("rebase shift {} is out of range", shift))
        })?;
        require(pooled_units > Amount::ZERO, || {
            Error::InvalidParameter(format!(
                "rebase shift {} would leave {} pooled units",
                shift, pooled_units
            ))
        })?;

        self.pooled_units = pooled_units;
        info!(symbol = %self.info.symbol, %shift, pooled_units = %self.pooled_units, "rebase by shift");
        Ok(self.pooled_units)
    }

    /// Shares to take from `holder` for `units`, checked against the unit balance.
    ///
    /// An entire balance maps to all of the holder's shares; anything less is
    /// capped at them, so a rounded conversion never overdraws.
    pub(crate) fn shares_to_debit(&self, holder: &Address, units: Amount) -> Result<Amount> {
        let available = self.balance_of(holder);
        require(units <= available, || Error::InsufficientBalance {
            holder: holder.clone(),
            requested: units,
            available,
        })?;
        let held = self.shares_of(holder);
        if units == available {
            return Ok(held);
        }
        Ok(self.shares_for_units(units).min(held))
    }

    fn require_shares(&self) -> Result<()> {
        require(!self.total_shares().is_zero(), || {
            Error::InvalidState(format!("{} has no shares to rebase", self.info.symbol))
        })
    }
}

impl Token for RebasingAsset {
    fn total_supply(&self) -> Amount {
        RebasingAsset::total_supply(self)
    }

    fn balance_of(&self, holder: &Address) -> Amount {
        RebasingAsset::balance_of(self, holder)
    }

    fn transfer(&mut self, from: &Address, to: &Address, value: Amount) -> Result<bool> {
        RebasingAsset::transfer(self, from, to, value)
    }
}

/// Stake `units` of the underlying and receive the same value of the asset.
pub fn stake(asset: &mut RebasingAsset, holder: &Address, units: Amount) -> Result<Amount> {
    asset.mint(holder, units)
}
