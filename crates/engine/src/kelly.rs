//! Tiered Kelly-criterion overlay on position sizing:
//! symbol → market → global fallback, first tier with >= KELLY_MIN_TRADES
//! closed trades and win_rate >= KELLY_MIN_WIN_RATE qualifies.

use meridian_persistence::db::position_stops::ClosedTradeStats;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy)]
pub struct KellyParams {
    pub fraction: Decimal,
    pub max_position: Decimal,
    pub min_win_rate: Decimal,
    pub min_trades: i64,
}

/// Picks the first tier (symbol, then market, then global) whose stats
/// qualify, in caller-supplied order. Returns `None` if none qualify —
/// callers then fall back to score_budget × regime_scale alone.
pub fn qualifying_tier<'a>(tiers: &'a [ClosedTradeStats], params: &KellyParams) -> Option<&'a ClosedTradeStats> {
    tiers
        .iter()
        .find(|stats| stats.trade_count >= params.min_trades && stats.win_rate >= params.min_win_rate)
}

/// f = (p*b - (1-p)) / b, where p = win_rate, b = avg_win / |avg_loss|.
/// Returns `None` when avg_loss is zero (no losing trades recorded —
/// b is undefined) or the computed fraction is non-positive.
pub fn kelly_fraction(stats: &ClosedTradeStats) -> Option<Decimal> {
    if stats.avg_loss == Decimal::ZERO {
        return None;
    }
    let p = stats.win_rate;
    let b = stats.avg_win / stats.avg_loss.abs();
    if b == Decimal::ZERO {
        return None;
    }
    let f = (p * b - (Decimal::ONE - p)) / b;
    if f <= Decimal::ZERO {
        None
    } else {
        Some(f)
    }
}

/// Final Kelly-capped budget in account currency, or `None` if the
/// qualifying tier's fraction is non-positive (caller should then use
/// the uncapped score_budget).
pub fn kelly_budget(stats: &ClosedTradeStats, net_assets: Decimal, params: &KellyParams) -> Option<Decimal> {
    let f = kelly_fraction(stats)?;
    let sized = net_assets * f * params.fraction;
    Some(sized.min(net_assets * params.max_position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn stats(trade_count: i64, win_rate: Decimal, avg_win: Decimal, avg_loss: Decimal) -> ClosedTradeStats {
        ClosedTradeStats { trade_count, win_rate, avg_win, avg_loss }
    }

    fn params() -> KellyParams {
        KellyParams { fraction: dec!(0.4), max_position: dec!(0.20), min_win_rate: dec!(0.60), min_trades: 15 }
    }

    /// Scenario: symbol tier has only 10 trades (below min 15), market
    /// tier has 20 trades at 65% win rate.
    /// Expected: qualifying_tier skips symbol and returns market.
    #[test]
    fn falls_back_through_tiers() {
        let symbol = stats(10, dec!(0.70), dec!(0.05), dec!(0.03));
        let market = stats(20, dec!(0.65), dec!(0.04), dec!(0.02));
        let global = stats(50, dec!(0.55), dec!(0.03), dec!(0.02));
        let tier = qualifying_tier(&[symbol, market, global], &params()).unwrap();
        assert_eq!(tier.trade_count, 20);
    }

    /// Scenario: 60% win rate, avg_win 5%, avg_loss 3%.
    /// Expected: positive Kelly fraction, budget capped at max_position.
    #[test]
    fn kelly_budget_respects_cap() {
        let s = stats(20, dec!(0.60), dec!(5), dec!(3));
        let params = KellyParams { fraction: dec!(1.0), max_position: dec!(0.20), min_win_rate: dec!(0.60), min_trades: 15 };
        let budget = kelly_budget(&s, dec!(100_000), &params).unwrap();
        assert!(budget <= dec!(100_000) * dec!(0.20));
    }

    /// Scenario: no recorded losses (avg_loss = 0).
    /// Expected: kelly_fraction returns None (b undefined) rather than
    /// dividing by zero.
    #[test]
    fn zero_avg_loss_is_undefined() {
        let s = stats(20, dec!(1.0), dec!(0.05), Decimal::ZERO);
        assert!(kelly_fraction(&s).is_none());
    }

    /// Scenario: win rate so low the edge is negative.
    /// Expected: kelly_fraction returns None rather than a negative size.
    #[test]
    fn negative_edge_yields_none() {
        let s = stats(20, dec!(0.30), dec!(0.02), dec!(0.05));
        assert!(kelly_fraction(&s).is_none());
    }
}
