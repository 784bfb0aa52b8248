//! Property-based tests for token invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Conservation: transfers never create or destroy balance, shares or weight
//! - Proportionality: a rebase scales every holder by the same factor
//! - Fair minting: a deposit never moves anyone else's receipt balance
//! - Zero-value operations change nothing
//! - Reads without a mutation in between return bit-identical values

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use token_core::{math::approx_eq, Address, Amount, Ledger, Market, RebasingAsset};

const TOLERANCE: Decimal = dec!(0.000000001);

/// Strategy for generating valid amounts (positive whole units)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1u64..1_000_000u64).prop_map(Decimal::from)
}

/// Strategy for generating rebase factors between 0.01 and 10
fn factor_strategy() -> impl Strategy<Value = Decimal> {
    (1u32..1_000u32).prop_map(|percent| Decimal::new(percent as i64, 2))
}

/// Strategy for a transfer between two of `holders` addresses, as a fraction of the sender's balance
fn transfer_strategy(holders: usize) -> impl Strategy<Value = (usize, usize, u32)> {
    (0..holders, 0..holders, 0u32..=100u32)
}

fn holders(count: usize) -> Vec<Address> {
    (0..count).map(|i| Address::new(format!("holder-{}", i))).collect()
}

fn fraction(balance: Amount, percent: u32) -> Amount {
    (balance * Decimal::from(percent) / dec!(100)).round_dp(6).min(balance)
}

/// Every total and per-holder balance the market reports, as raw Decimal bytes
fn reads(market: &Market, accounts: &[Address]) -> Vec<[u8; 16]> {
    let mut values = vec![
        market.asset().total_supply(),
        market.receipt().total_supply(market.asset(), market.debt()),
        market.receipt().scaled_total_supply(market.asset(), market.debt()),
        market.debt().total_supply(),
    ];
    for holder in accounts {
        values.push(market.base_balance_of(holder));
        values.push(market.receipt_balance_of(holder));
        values.push(market.debt_balance_of(holder));
    }
    values.iter().map(Decimal::serialize).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Plain ledger transfers conserve the total supply
    #[test]
    fn prop_ledger_transfers_conserve_supply(
        initial in prop::collection::vec(amount_strategy(), 4),
        moves in prop::collection::vec(transfer_strategy(4), 1..30),
    ) {
        let accounts = holders(4);
        let mut ledger = Ledger::new();
        for (holder, amount) in accounts.iter().zip(&initial) {
            ledger.mint(holder, *amount).unwrap();
        }
        let supply = ledger.total_supply();

        for (from, to, percent) in moves {
            let value = fraction(ledger.balance_of(&accounts[from]), percent);
            ledger.transfer(&accounts[from], &accounts[to], value).unwrap();
        }

        let sum: Decimal = accounts.iter().map(|h| ledger.balance_of(h)).sum();
        prop_assert_eq!(ledger.total_supply(), supply);
        prop_assert_eq!(sum, supply);
    }

    /// Base asset transfers conserve shares; balances keep summing to the pooled units
    #[test]
    fn prop_rebasing_transfers_conserve_shares(
        initial in prop::collection::vec(amount_strategy(), 3),
        factor in factor_strategy(),
        moves in prop::collection::vec(transfer_strategy(3), 1..20),
    ) {
        let accounts = holders(3);
        let mut asset = RebasingAsset::default();
        for (holder, amount) in accounts.iter().zip(&initial) {
            asset.mint(holder, *amount).unwrap();
        }
        asset.rebase_by_factor(factor).unwrap();
        let shares = asset.total_shares();

        for (from, to, percent) in moves {
            let value = fraction(asset.balance_of(&accounts[from]), percent);
            asset.transfer(&accounts[from], &accounts[to], value).unwrap();
        }

        let share_sum: Decimal = accounts.iter().map(|h| asset.shares_of(h)).sum();
        let unit_sum: Decimal = accounts.iter().map(|h| asset.balance_of(h)).sum();
        prop_assert_eq!(asset.total_shares(), shares);
        prop_assert!(approx_eq(share_sum, shares, TOLERANCE));
        prop_assert!(approx_eq(unit_sum, asset.total_supply(), TOLERANCE));
    }

    /// A rebase multiplies every holder's balance by the factor
    #[test]
    fn prop_rebase_is_proportional(
        first in amount_strategy(),
        second in amount_strategy(),
        factor in factor_strategy(),
    ) {
        let accounts = holders(2);
        let mut asset = RebasingAsset::default();
        asset.mint(&accounts[0], first).unwrap();
        asset.mint(&accounts[1], second).unwrap();

        asset.rebase_by_factor(factor).unwrap();

        prop_assert!(approx_eq(asset.balance_of(&accounts[0]), first * factor, TOLERANCE));
        prop_assert!(approx_eq(asset.balance_of(&accounts[1]), second * factor, TOLERANCE));
        prop_assert!(approx_eq(
            asset.units_for_shares(asset.shares_for_units(first)),
            first,
            TOLERANCE
        ));
    }

    /// A rebase by factor one changes nothing
    #[test]
    fn prop_unit_rebase_is_identity(first in amount_strategy(), factor in factor_strategy()) {
        let holder = Address::new("holder");
        let mut asset = RebasingAsset::default();
        asset.mint(&holder, first).unwrap();
        asset.rebase_by_factor(factor).unwrap();
        let before = asset.balance_of(&holder);

        asset.rebase_by_factor(Decimal::ONE).unwrap();

        prop_assert_eq!(asset.balance_of(&holder), before);
    }

    /// A new deposit leaves existing receipt balances untouched and credits its own value
    #[test]
    fn prop_deposit_does_not_dilute(
        first in amount_strategy(),
        second in amount_strategy(),
        borrow_percent in 0u32..=90u32,
        factor in factor_strategy(),
        late in amount_strategy(),
    ) {
        let accounts = holders(4);
        let (a, b, borrower, newcomer) = (&accounts[0], &accounts[1], &accounts[2], &accounts[3]);
        let mut market = Market::new();

        market.stake(a, first).unwrap();
        market.stake(b, second).unwrap();
        market.deposit(a, first).unwrap();
        market.deposit(b, second).unwrap();
        let borrowed = fraction(first + second, borrow_percent).round_dp(0);
        market.borrow(borrower, borrowed).unwrap();
        market.rebase_by_factor(factor).unwrap();

        let before_a = market.receipt_balance_of(a);
        let before_b = market.receipt_balance_of(b);
        let before_total = market.receipt().total_supply(market.asset(), market.debt());

        market.stake(newcomer, late).unwrap();
        let late_units = market.base_balance_of(newcomer);
        let minted = market.deposit(newcomer, late_units).unwrap();

        prop_assert!(approx_eq(market.receipt_balance_of(a), before_a, TOLERANCE));
        prop_assert!(approx_eq(market.receipt_balance_of(b), before_b, TOLERANCE));
        prop_assert!(approx_eq(minted, late_units, TOLERANCE));
        prop_assert!(approx_eq(
            market.receipt().total_supply(market.asset(), market.debt()),
            before_total + late_units,
            TOLERANCE
        ));
    }

    /// Topping up an existing position is fair to the other holder too
    #[test]
    fn prop_repeat_deposit_is_fair(
        first in amount_strategy(),
        second in amount_strategy(),
        top_up in amount_strategy(),
        factor in factor_strategy(),
    ) {
        let accounts = holders(2);
        let mut market = Market::new();
        market.stake(&accounts[0], first + top_up).unwrap();
        market.stake(&accounts[1], second).unwrap();
        market.deposit(&accounts[0], first).unwrap();
        market.deposit(&accounts[1], second).unwrap();
        market.rebase_by_factor(factor).unwrap();

        let before_a = market.receipt_balance_of(&accounts[0]);
        let before_b = market.receipt_balance_of(&accounts[1]);
        let top_up_units = market.base_balance_of(&accounts[0]);
        market.deposit(&accounts[0], top_up_units).unwrap();

        prop_assert!(approx_eq(
            market.receipt_balance_of(&accounts[0]),
            before_a + top_up_units,
            TOLERANCE
        ));
        prop_assert!(approx_eq(market.receipt_balance_of(&accounts[1]), before_b, TOLERANCE));
    }

    /// Receipt transfers conserve raw weight
    #[test]
    fn prop_receipt_transfers_conserve_weight(
        first in amount_strategy(),
        second in amount_strategy(),
        factor in factor_strategy(),
        moves in prop::collection::vec(transfer_strategy(2), 1..10),
    ) {
        let accounts = holders(2);
        let mut market = Market::new();
        market.stake(&accounts[0], first).unwrap();
        market.stake(&accounts[1], second).unwrap();
        market.deposit(&accounts[0], first).unwrap();
        market.deposit(&accounts[1], second).unwrap();
        market.rebase_by_factor(factor).unwrap();
        let raw = market.receipt().raw_total_supply();
        let value = market.receipt().total_supply(market.asset(), market.debt());

        for (from, to, percent) in moves {
            let units = fraction(market.receipt_balance_of(&accounts[from]), percent);
            market.transfer_receipt(&accounts[from], &accounts[to], units).unwrap();
        }

        let sum: Decimal = accounts.iter().map(|h| market.receipt_balance_of(h)).sum();
        prop_assert_eq!(market.receipt().raw_total_supply(), raw);
        prop_assert!(approx_eq(sum, value, TOLERANCE));
    }

    /// Borrowing and repaying the same amount with no rebase in between clears everything
    #[test]
    fn prop_borrow_repay_round_trip(
        deposit in amount_strategy(),
        borrow_percent in 1u32..=100u32,
    ) {
        let accounts = holders(2);
        let mut market = Market::new();
        market.stake(&accounts[0], deposit).unwrap();
        market.deposit(&accounts[0], deposit).unwrap();
        let borrowed = fraction(deposit, borrow_percent);

        market.borrow(&accounts[1], borrowed).unwrap();
        let remaining = market.repay(&accounts[1], borrowed).unwrap();

        prop_assert_eq!(remaining, Amount::ZERO);
        prop_assert_eq!(market.debt().borrowed_shares(), Amount::ZERO);
        prop_assert!(approx_eq(market.receipt_balance_of(&accounts[0]), deposit, TOLERANCE));
    }

    /// Depositing and withdrawing the whole position returns the base units
    #[test]
    fn prop_deposit_withdraw_round_trip(
        stake in amount_strategy(),
        deposit_percent in 1u32..=100u32,
        factor in factor_strategy(),
    ) {
        let holder = Address::new("holder");
        let mut market = Market::new();
        market.stake(&holder, stake).unwrap();
        market.deposit(&holder, fraction(stake, deposit_percent)).unwrap();
        market.rebase_by_factor(factor).unwrap();
        let base_total = market.asset().total_supply();

        let position = market.receipt_balance_of(&holder);
        let remaining = market.withdraw(&holder, position).unwrap();

        prop_assert_eq!(remaining, Amount::ZERO);
        prop_assert_eq!(market.receipt().raw_total_supply(), Amount::ZERO);
        prop_assert!(approx_eq(market.base_balance_of(&holder), base_total, TOLERANCE));
    }

    /// Repeated reads after a non-terminating rebase and a proportional deposit agree exactly
    #[test]
    fn prop_reads_are_idempotent(
        first in amount_strategy(),
        second in amount_strategy(),
        borrow_percent in 0u32..=90u32,
        index_percent in 100u32..200u32,
        late in amount_strategy(),
    ) {
        let accounts = holders(4);
        let (a, b, borrower, newcomer) = (&accounts[0], &accounts[1], &accounts[2], &accounts[3]);
        let mut market = Market::new();

        market.stake(a, first).unwrap();
        market.stake(b, second).unwrap();
        market.deposit(a, first).unwrap();
        market.deposit(b, second).unwrap();
        let borrowed = fraction(first + second, borrow_percent).round_dp(0);
        market.borrow(borrower, borrowed).unwrap();
        market.rebase_by_factor(dec!(10) / dec!(3)).unwrap();
        market.set_borrow_index(Decimal::new(index_percent as i64, 2)).unwrap();

        market.stake(newcomer, late).unwrap();
        let late_units = market.base_balance_of(newcomer);
        market.deposit(newcomer, late_units).unwrap();

        let first_read = reads(&market, &accounts);
        let second_read = reads(&market, &accounts);
        prop_assert_eq!(first_read, second_read);
        for holder in &accounts {
            prop_assert_eq!(market.receipt_balance_of(holder), market.receipt_balance_of(holder));
            prop_assert_eq!(market.debt_balance_of(holder), market.debt_balance_of(holder));
            prop_assert_eq!(market.base_balance_of(holder), market.base_balance_of(holder));
        }
        prop_assert_eq!(market.snapshot(), market.snapshot());
    }

    /// Zero-value operations change nothing
    #[test]
    fn prop_zero_value_is_noop(first in amount_strategy(), factor in factor_strategy()) {
        let accounts = holders(2);
        let mut market = Market::new();
        market.stake(&accounts[0], first).unwrap();
        market.deposit(&accounts[0], first).unwrap();
        market.rebase_by_factor(factor).unwrap();
        let before = market.snapshot();
        let account = market.account(&accounts[0]);

        market.transfer(&accounts[0], &accounts[1], Amount::ZERO).unwrap();
        market.transfer_receipt(&accounts[0], &accounts[1], Amount::ZERO).unwrap();
        market.stake(&accounts[1], Amount::ZERO).unwrap();
        market.deposit(&accounts[1], Amount::ZERO).unwrap();
        market.borrow(&accounts[1], Amount::ZERO).unwrap();
        market.repay(&accounts[1], Amount::ZERO).unwrap();

        prop_assert_eq!(market.snapshot(), before);
        prop_assert_eq!(market.account(&accounts[0]), account);
    }
}
