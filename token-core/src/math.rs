//! Conversion arithmetic shared by the engines
//!
//! Every division performed by an engine goes through this module so that
//! the zero-denominator cases are defined in exactly one place.
//!
//! # Rounding
//!
//! Amounts are `Decimal` with 28 significant digits. Products are computed
//! before quotients so that exact results stay exact; a quotient that does
//! not terminate is rounded to Decimal's native precision.

use crate::types::Amount;

/// `numerator / denominator`, defined as zero when the denominator is zero.
pub fn ratio(numerator: Amount, denominator: Amount) -> Amount {
    if denominator.is_zero() {
        Amount::ZERO
    } else {
        numerator / denominator
    }
}

/// `a * b / c`, or `None` when `c` is zero or the result leaves Decimal's range.
///
/// Falls back to dividing first when only the intermediate product overflows.
pub fn mul_div(a: Amount, b: Amount, c: Amount) -> Option<Amount> {
    if c.is_zero() {
        return None;
    }
    match a.checked_mul(b) {
        Some(product) => product.checked_div(c),
        None => a.checked_div(c)?.checked_mul(b),
    }
}

/// `a * b / c`, defined as zero when `c` is zero.
///
/// Saturates at `Amount::MAX` when the quotient itself is out of range.
pub fn mul_div_or_zero(a: Amount, b: Amount, c: Amount) -> Amount {
    if c.is_zero() {
        return Amount::ZERO;
    }
    mul_div(a, b, c).unwrap_or(Amount::MAX)
}

/// `|a - b| <= tolerance`
pub fn approx_eq(a: Amount, b: Amount, tolerance: Amount) -> bool {
    (a - b).abs() <= tolerance
}
