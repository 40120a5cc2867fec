//! Budget & position sizing: score-based base percentage,
//! regime scale, optional Kelly overlay, currency/cash fallback, and
//! lot-size rounding.

use meridian_core::Market;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::regime::Regime;

/// Hard cap, independent of score or Kelly: budget never exceeds this
/// fraction of net_assets.
pub const HARD_CAP: Decimal = Decimal::from_parts(25, 0, 0, false, 2);

/// Score-based base percentage of net_assets, piecewise
/// step 1. Always <= HARD_CAP.
pub fn score_based_percentage(score: i32) -> Decimal {
    let s = Decimal::from(score);
    let pct = if s >= dec!(80) {
        dec!(0.20) + (s - dec!(80)) / dec!(400)
    } else if s >= dec!(60) {
        dec!(0.15) + (s - dec!(60)) * dec!(0.07) / dec!(20)
    } else if s >= dec!(45) {
        dec!(0.05) + (s - dec!(45)) * dec!(0.05) / dec!(14)
    } else {
        dec!(0.05)
    };
    pct.min(HARD_CAP)
}

pub fn regime_scale(regime: Regime) -> Decimal {
    match regime {
        Regime::Bull => dec!(1.0),
        Regime::Range => dec!(0.7),
        Regime::Bear => dec!(0.4),
    }
}

/// Per-currency balances available for a BUY: `buy_power` if positive,
/// else `cash` if positive, else `remaining_finance` if positive, else
/// zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrencyAvailability {
    pub buy_power: Decimal,
    pub cash: Decimal,
    pub remaining_finance: Decimal,
}

impl CurrencyAvailability {
    pub fn available(&self) -> Decimal {
        if self.buy_power > Decimal::ZERO {
            self.buy_power
        } else if self.cash > Decimal::ZERO {
            self.cash
        } else if self.remaining_finance > Decimal::ZERO {
            self.remaining_finance
        } else {
            Decimal::ZERO
        }
    }
}

pub fn target_currency(market: Market) -> &'static str {
    market.currency()
}

/// Final budget after score-based percentage, regime scale, Kelly
/// overlay (if `kelly_budget` is `Some`), and the per-currency
/// availability cap. Does not yet round to lot size.
pub fn compute_budget(score: i32, net_assets: Decimal, regime: Regime, kelly_budget: Option<Decimal>, available: Decimal) -> Decimal {
    let score_budget = net_assets * score_based_percentage(score) * regime_scale(regime);
    let budget = match kelly_budget {
        Some(kelly) => score_budget.min(kelly),
        None => score_budget,
    };
    budget.min(available).max(Decimal::ZERO)
}

/// Rounds a budget down to whole lots at `price`. Returns 0 if less
/// than one lot affords (caller triggers a rotation attempt).
pub fn round_to_lot(budget: Decimal, price: Decimal, lot_size: i64) -> i64 {
    if price <= Decimal::ZERO || lot_size <= 0 {
        return 0;
    }
    let raw_shares = (budget / price).floor();
    let lots = (raw_shares / Decimal::from(lot_size)).floor();
    let shares = lots * Decimal::from(lot_size);
    shares.to_string().parse::<i64>().unwrap_or(0).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario: score sweeps from 30 to 100.
    /// Expected: percentage is monotonic non-decreasing and never
    /// exceeds the hard cap.
    #[test]
    fn percentage_is_monotonic_and_capped() {
        let mut prev = Decimal::ZERO;
        for score in (0..=100).step_by(1) {
            let pct = score_based_percentage(score);
            assert!(pct >= prev, "pct regressed at score {score}");
            assert!(pct <= HARD_CAP);
            prev = pct;
        }
    }

    /// Scenario: score 85 falls in the top piecewise band.
    /// Expected: percentage matches the documented formula exactly.
    #[test]
    fn top_band_matches_formula() {
        let pct = score_based_percentage(85);
        assert_eq!(pct, dec!(0.20) + dec!(5) / dec!(400));
    }

    /// Scenario: Kelly budget is lower than the score-scaled budget.
    /// Expected: compute_budget takes the Kelly-capped figure.
    #[test]
    fn kelly_overlay_caps_below_score_budget() {
        let budget = compute_budget(85, dec!(100_000), Regime::Bull, Some(dec!(5_000)), dec!(1_000_000));
        assert_eq!(budget, dec!(5_000));
    }

    /// Scenario: available cash is less than the computed budget.
    /// Expected: budget is capped at what's actually available.
    #[test]
    fn available_cash_caps_budget() {
        let budget = compute_budget(85, dec!(100_000), Regime::Bull, None, dec!(100));
        assert_eq!(budget, dec!(100));
    }

    /// Scenario: budget affords fewer shares than one lot of 100.
    /// Expected: rounds down to zero, not a partial lot.
    #[test]
    fn sub_lot_budget_rounds_to_zero() {
        assert_eq!(round_to_lot(dec!(5_000), dec!(100), 100), 0);
    }

    /// Scenario: budget affords 2.5 lots of 100 at price 10.
    /// Expected: rounds down to 2 lots (200 shares).
    #[test]
    fn rounds_down_to_whole_lots() {
        assert_eq!(round_to_lot(dec!(2_500), dec!(10), 100), 200);
    }
}
