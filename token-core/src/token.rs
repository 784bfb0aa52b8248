//! Capability traits implemented by every token shape
//!
//! The plain [`Ledger`](crate::Ledger), the [`RebasingAsset`](crate::RebasingAsset),
//! the [`DebtEngine`](crate::DebtEngine) and the bound
//! [`ReceiptView`](crate::receipt::ReceiptView) are standalone types; they share
//! behaviour only through these traits.

use crate::{
    types::{Address, Amount},
    Result,
};

/// Minimal token surface
pub trait Token {
    /// Total supply in the token's user-facing denomination
    fn total_supply(&self) -> Amount;

    /// Balance of `holder` in the token's user-facing denomination
    fn balance_of(&self, holder: &Address) -> Amount;

    /// Move `value` from `from` to `to`.
    ///
    /// `from` is trusted by the caller; there is no authentication.
    fn transfer(&mut self, from: &Address, to: &Address, value: Amount) -> Result<bool>;
}

/// Approval sub-protocol
///
/// Interest-bearing tokens implement it only to report
/// [`Error::UnsupportedOperation`](crate::Error::UnsupportedOperation).
pub trait Allowances {
    /// Set the amount `spender` may move out of `owner`'s balance
    fn approve(&mut self, owner: &Address, spender: &Address, value: Amount) -> Result<bool>;

    /// Amount `spender` may still move out of `owner`'s balance
    fn allowance(&self, owner: &Address, spender: &Address) -> Result<Amount>;

    /// Move `value` from `owner` to `to` on behalf of `spender`
    fn transfer_from(
        &mut self,
        spender: &Address,
        owner: &Address,
        to: &Address,
        value: Amount,
    ) -> Result<bool>;
}
