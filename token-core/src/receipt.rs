//! Scaled-balance receipt token with proportional minting
//!
//! The receipt engine tracks a pool of the base asset, part of it held at
//! the engine's own address and part of it lent out through the
//! [`DebtEngine`]. Its internal ledger stores **raw** amounts; they are not
//! balances but weights. A holder's scaled balance is re-derived on every
//! read as its proportional claim on the pool:
//!
//! ```text
//! scaled_total_supply = units_for_shares(total_shares - borrowed_shares)
//!                     + debt.scaled_total_supply
//! scaled_balance_of(u) = raw(u) * scaled_total_supply / raw_total_supply
//! balance_of(u)        = scaled_balance_of(u) * liquidity_index
//! ```
//!
//! A rebase of the base asset therefore reaches every holder without any
//! per-holder write.
//!
//! # Proportional mint
//!
//! When a deposit lands in a pool whose value already includes interest,
//! the raw amount `m` minted for the depositor solves
//!
//! ```text
//! (r + m) / (R + m) == (b + v) / (S + v)
//! ```
//!
//! where `R`, `r` are the raw total and raw balance, `S`, `b` the scaled
//! total and balance before the mint, and `v` the scaled deposit. The
//! closed form `m = (R * (b + v) - (S + v) * r) / (S - b)` is evaluated as
//!
//! ```text
//! m = v * (R - r) / (S - b) + (R * b - S * r) / (S - b)
//! ```
//!
//! so that no intermediate product is larger than the operands warrant. Every
//! other holder's scaled balance is left exactly where it was.
//!
//! # Concurrency
//!
//! A mint reads several derived quantities and must see them consistently.
//! Mutations of the engine and its collaborators must be serialized; see
//! [`crate::actor`].

use crate::{
    debt::DebtEngine,
    error::require,
    ledger::{check_value, Ledger},
    math::{mul_div, mul_div_or_zero},
    rebasing::RebasingAsset,
    token::{Allowances, Token},
    types::{Address, Amount, TokenInfo},
    Error, Result,
};
use tracing::{debug, info};

/// Default name of the receipt token
pub const DEFAULT_NAME: &str = "aToken implementation for stETH";
/// Default symbol of the receipt token
pub const DEFAULT_SYMBOL: &str = "astETH";

/// Pair of totals used by the mint algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Position {
    total_supply: Amount,
    balance_of: Amount,
}

/// Interest-bearing deposit receipt
#[derive(Debug, Clone)]
pub struct ReceiptEngine {
    info: TokenInfo,
    raw: Ledger,
    liquidity_index: Amount,
    total_shares: Amount,
}

impl Default for ReceiptEngine {
    fn default() -> Self {
        Self::new(DEFAULT_NAME, DEFAULT_SYMBOL)
    }
}

impl ReceiptEngine {
    /// Create an empty receipt token with a liquidity index of one
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            info: TokenInfo::new(name, symbol),
            raw: Ledger::new(),
            liquidity_index: Amount::ONE,
            total_shares: Amount::ZERO,
        }
    }

    /// Token metadata
    pub fn info(&self) -> &TokenInfo {
        &self.info
    }

    /// Address holding the engine's base-asset units
    pub fn address(&self) -> &Address {
        &self.info.address
    }

    /// Current liquidity index
    pub fn liquidity_index(&self) -> Amount {
        self.liquidity_index
    }

    /// Base-asset share equivalent of the whole pool, held and lent
    pub fn total_shares(&self) -> Amount {
        self.total_shares
    }

    /// Raw ledger total (debug introspection)
    pub fn raw_total_supply(&self) -> Amount {
        self.raw.total_supply()
    }

    /// Raw ledger balance of `holder` (debug introspection)
    pub fn raw_balance_of(&self, holder: &Address) -> Amount {
        self.raw.balance_of(holder)
    }

    /// Every address that ever held receipts
    pub fn holders(&self) -> impl Iterator<Item = &Address> {
        self.raw.holders()
    }

    /// Pool value at index one: held units plus scaled debt against it
    pub fn scaled_total_supply(&self, asset: &RebasingAsset, debt: &DebtEngine) -> Amount {
        let held_shares = self.total_shares - debt.borrowed_shares();
        asset.units_for_shares(held_shares) + debt.scaled_total_supply()
    }

    /// Proportional claim of `holder` on the pool at index one
    pub fn scaled_balance_of(
        &self,
        asset: &RebasingAsset,
        debt: &DebtEngine,
        holder: &Address,
    ) -> Amount {
        let raw = self.raw.balance_of(holder);
        if raw.is_zero() {
            return Amount::ZERO;
        }
        mul_div_or_zero(
            raw,
            self.scaled_total_supply(asset, debt),
            self.raw.total_supply(),
        )
    }

    /// Pool value with interest
    pub fn total_supply(&self, asset: &RebasingAsset, debt: &DebtEngine) -> Amount {
        self.scaled_total_supply(asset, debt) * self.liquidity_index
    }

    /// Claim of `holder` with interest
    pub fn balance_of(&self, asset: &RebasingAsset, debt: &DebtEngine, holder: &Address) -> Amount {
        self.scaled_balance_of(asset, debt, holder) * self.liquidity_index
    }

    /// Issue receipts worth `units` to `holder`.
    ///
    /// The base units must already sit at [`address`](Self::address).
    /// Returns the holder's new balance with interest.
    pub fn mint(
        &mut self,
        asset: &RebasingAsset,
        debt: &DebtEngine,
        holder: &Address,
        units: Amount,
    ) -> Result<Amount> {
        check_value(units)?;
        if units.is_zero() {
            return Ok(self.balance_of(asset, debt, holder));
        }

        let scaled_value = self.scale(units)?;
        let raw_amount = self.raw_amount_to_mint(asset, debt, holder, scaled_value)?;
        require(raw_amount > Amount::ZERO, || {
            Error::InvalidState(format!(
                "deposit of {} converts to no {} weight",
                units, self.info.symbol
            ))
        })?;
        let new_shares = asset.shares_for_units(scaled_value);

        self.raw.mint(holder, raw_amount)?;
        self.total_shares += new_shares;
        debug!(
            symbol = %self.info.symbol,
            %holder,
            %units,
            %raw_amount,
            total_shares = %self.total_shares,
            "receipt minted"
        );
        Ok(self.balance_of(asset, debt, holder))
    }

    /// Redeem receipts worth `units` from `holder`.
    ///
    /// The caller moves the matching base units out of
    /// [`address`](Self::address). Returns the holder's remaining balance
    /// with interest.
    pub fn burn(
        &mut self,
        asset: &RebasingAsset,
        debt: &DebtEngine,
        holder: &Address,
        units: Amount,
    ) -> Result<Amount> {
        check_value(units)?;
        if units.is_zero() {
            return Ok(self.balance_of(asset, debt, holder));
        }

        let scaled_value = self.scale(units)?;
        let raw_amount = self.raw_amount_to_debit(asset, debt, holder, units, scaled_value)?;
        let burned_shares = asset.shares_for_units(scaled_value);

        self.raw.burn(holder, raw_amount)?;
        self.total_shares -= burned_shares;
        debug!(
            symbol = %self.info.symbol,
            %holder,
            %units,
            %raw_amount,
            total_shares = %self.total_shares,
            "receipt burned"
        );
        Ok(self.balance_of(asset, debt, holder))
    }

    /// Move receipts worth `units` from `from` to `to`
    pub fn transfer(
        &mut self,
        asset: &RebasingAsset,
        debt: &DebtEngine,
        from: &Address,
        to: &Address,
        units: Amount,
    ) -> Result<bool> {
        check_value(units)?;
        if units.is_zero() {
            return Ok(true);
        }

        let scaled_value = self.scale(units)?;
        let raw_amount = self.raw_amount_to_debit(asset, debt, from, units, scaled_value)?;
        self.raw.transfer(from, to, raw_amount)
    }

    /// Multiply the liquidity index by `factor`; returns the new index.
    pub fn increase_liquidity_index_by_factor(&mut self, factor: Amount) -> Result<Amount> {
        require(factor > Amount::ZERO, || {
            Error::InvalidParameter(format!("index factor must be positive, got {}", factor))
        })?;
        self.liquidity_index = self.liquidity_index.checked_mul(factor).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "index factor {} overflows liquidity index {}",
                factor, self.liquidity_index
            ))
        })?;
        info!(symbol = %self.info.symbol, %factor, liquidity_index = %self.liquidity_index, "liquidity index scaled");
        Ok(self.liquidity_index)
    }

    /// Add `shift` to the liquidity index; returns the new index.
    pub fn increase_liquidity_index_by_shift(&mut self, shift: Amount) -> Result<Amount> {
        let index = self.liquidity_index.checked_add(shift).ok_or_else(|| {
            Error::InvalidParameter(format!("index shift {} is out of range", shift))
        })?;
        require(index > Amount::ZERO, || {
            Error::InvalidParameter(format!("index shift {} would leave index at {}", shift, index))
        })?;
        self.liquidity_index = index;
        info!(symbol = %self.info.symbol, %shift, liquidity_index = %self.liquidity_index, "liquidity index shifted");
        Ok(self.liquidity_index)
    }

    /// Bind the engine to its collaborators for use through [`Token`]
    pub fn view<'a>(
        &'a mut self,
        asset: &'a RebasingAsset,
        debt: &'a DebtEngine,
    ) -> ReceiptView<'a> {
        ReceiptView {
            engine: self,
            asset,
            debt,
        }
    }

    /// Raw weight that gives `holder` exactly `scaled_value` more of the pool
    fn raw_amount_to_mint(
        &self,
        asset: &RebasingAsset,
        debt: &DebtEngine,
        holder: &Address,
        scaled_value: Amount,
    ) -> Result<Amount> {
        let raw_before = Position {
            total_supply: self.raw.total_supply(),
            balance_of: self.raw.balance_of(holder),
        };
        if raw_before.total_supply.is_zero() {
            let amount = asset.shares_for_units(scaled_value);
            debug!(symbol = %self.info.symbol, %amount, "first mint");
            return Ok(amount);
        }

        let scaled_before = Position {
            total_supply: self.scaled_total_supply(asset, debt),
            balance_of: self.scaled_balance_of(asset, debt, holder),
        };
        let other_before = scaled_before.total_supply - scaled_before.balance_of;

        if other_before.is_zero() || raw_before.balance_of == raw_before.total_supply {
            let amount = mul_div(
                scaled_value,
                raw_before.total_supply,
                scaled_before.total_supply,
            )
            .ok_or_else(|| self.out_of_range(scaled_value))?;
            debug!(symbol = %self.info.symbol, %amount, "sole holder mint");
            return Ok(amount);
        }

        let amount = proportional_mint(raw_before, scaled_before, scaled_value)
            .ok_or_else(|| self.out_of_range(scaled_value))?;
        debug!(
            symbol = %self.info.symbol,
            raw_total = %raw_before.total_supply,
            raw_balance = %raw_before.balance_of,
            scaled_total = %scaled_before.total_supply,
            scaled_balance = %scaled_before.balance_of,
            %other_before,
            %amount,
            "proportional mint"
        );
        Ok(amount)
    }

    /// Raw weight matching `units` of `holder`'s balance, checked against it.
    fn raw_amount_to_debit(
        &self,
        asset: &RebasingAsset,
        debt: &DebtEngine,
        holder: &Address,
        units: Amount,
        scaled_value: Amount,
    ) -> Result<Amount> {
        let available = self.balance_of(asset, debt, holder);
        require(units <= available, || Error::InsufficientBalance {
            holder: holder.clone(),
            requested: units,
            available,
        })?;

        let held = self.raw.balance_of(holder);
        if units == available {
            return Ok(held);
        }
        let amount = mul_div(
            scaled_value,
            self.raw.total_supply(),
            self.scaled_total_supply(asset, debt),
        )
        .ok_or_else(|| {
            Error::InvalidState(format!("{} pool has no value", self.info.symbol))
        })?;
        Ok(amount.min(held))
    }

    fn scale(&self, units: Amount) -> Result<Amount> {
        require(!self.liquidity_index.is_zero(), || {
            Error::InvalidState("liquidity index is zero".to_string())
        })?;
        units
            .checked_div(self.liquidity_index)
            .ok_or_else(|| self.out_of_range(units))
    }

    fn out_of_range(&self, scaled_value: Amount) -> Error {
        Error::InvalidParameter(format!(
            "{} weight for a deposit of {} is out of range",
            self.info.symbol, scaled_value
        ))
    }
}

/// Raw weight `m` for a deposit of `v` by a holder who shares the pool.
///
/// `None` when `S == b` or any term leaves Decimal's range.
fn proportional_mint(raw: Position, scaled: Position, v: Amount) -> Option<Amount> {
    let others_value = scaled.total_supply.checked_sub(scaled.balance_of)?;
    let others_weight = raw.total_supply.checked_sub(raw.balance_of)?;
    let gained = mul_div(v, others_weight, others_value)?;
    let drift = mul_div(raw.total_supply, scaled.balance_of, others_value)?
        .checked_sub(mul_div(scaled.total_supply, raw.balance_of, others_value)?)?;
    gained.checked_add(drift)
}

/// Receipt engine bound to the asset and debt token it derives value from
#[derive(Debug)]
pub struct ReceiptView<'a> {
    engine: &'a mut ReceiptEngine,
    asset: &'a RebasingAsset,
    debt: &'a DebtEngine,
}

impl ReceiptView<'_> {
    /// Pool value at index one
    pub fn scaled_total_supply(&self) -> Amount {
        self.engine.scaled_total_supply(self.asset, self.debt)
    }

    /// Claim of `holder` at index one
    pub fn scaled_balance_of(&self, holder: &Address) -> Amount {
        self.engine.scaled_balance_of(self.asset, self.debt, holder)
    }
}

impl Token for ReceiptView<'_> {
    fn total_supply(&self) -> Amount {
        self.engine.total_supply(self.asset, self.debt)
    }

    fn balance_of(&self, holder: &Address) -> Amount {
        self.engine.balance_of(self.asset, self.debt, holder)
    }

    fn transfer(&mut self, from: &Address, to: &Address, value: Amount) -> Result<bool> {
        self.engine.transfer(self.asset, self.debt, from, to, value)
    }
}

impl Allowances for ReceiptView<'_> {
    fn approve(&mut self, _owner: &Address, _spender: &Address, _value: Amount) -> Result<bool> {
        Err(Error::UnsupportedOperation("approve on receipt tokens"))
    }

    fn allowance(&self, _owner: &Address, _spender: &Address) -> Result<Amount> {
        Err(Error::UnsupportedOperation("allowance on receipt tokens"))
    }

    fn transfer_from(
        &mut self,
        _spender: &Address,
        _owner: &Address,
        _to: &Address,
        _value: Amount,
    ) -> Result<bool> {
        Err(Error::UnsupportedOperation("transfer_from of receipt tokens"))
    }
}
