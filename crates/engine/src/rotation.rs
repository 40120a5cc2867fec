//! Smart rotation and pre-close / delayed-buy rescue rotation: pre-emptively
//! selling a weak holding to free capital, either for an incoming BUY
//! candidate whose budget came up short, or ahead of a market close window,
//! or to unstick a high-score buy parked in the delayed queue.
//!
//! Reuses `exit::weakness_score` for the per-position weakness number
//! (same scoring as exit scoring, but without issuing signals) and adds
//! the rotation-specific composite used for pre-close ranking, per the
//! resolution in DESIGN.md (tunable weights, gap >= 10 is the binding
//! constraint either way).

use chrono::{DateTime, Utc};
use meridian_indicators::ComputedIndicators;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::exit::weakness_score;
use crate::regime::Regime;

/// Smart rotation is attempted at most once per BUY signal, to prevent
/// thrash if the freed capital still doesn't clear the lot.
pub const MAX_SMART_ROTATION_ATTEMPTS: u32 = 1;

/// Minimum (new_buy_score - weakness_score) gap required before a holding
/// is sacrificed for an incoming buy.
pub const ROTATION_GAP_THRESHOLD: i32 = 10;

/// A currently-held position plus the context needed to rank it as a
/// rotation-sell candidate.
#[derive(Debug, Clone)]
pub struct RotationCandidate {
    pub symbol: String,
    pub quantity: i64,
    pub indicators: ComputedIndicators,
    pub profit_pct: Decimal,
    pub held_since: DateTime<Utc>,
}

impl RotationCandidate {
    /// Same weakness metric exit scoring uses, without emitting a signal.
    pub fn weakness_score(&self, regime: Regime) -> i32 {
        weakness_score(&self.indicators, regime).0
    }

    fn holding_hours(&self, now: DateTime<Utc>) -> Decimal {
        let hours = now.signed_duration_since(self.held_since).num_minutes() as f64 / 60.0;
        Decimal::from_f64_retain(hours.max(0.0)).unwrap_or(Decimal::ZERO)
    }
}

/// Weight on negative profit% (losing positions rank weaker).
const WEIGHT_PROFIT: Decimal = Decimal::from_parts(4, 0, 0, false, 1); // 0.4
/// Weight on holding-hours past the trust threshold (below, contributes 0).
const WEIGHT_HOLDING: Decimal = Decimal::from_parts(3, 0, 0, false, 1); // 0.3
/// Weight on MACD/RSI momentum weakness (the exit weakness score, normalized).
const WEIGHT_MOMENTUM: Decimal = Decimal::from_parts(2, 0, 0, false, 1); // 0.2
/// Weight on volume dry-up.
const WEIGHT_VOLUME: Decimal = Decimal::from_parts(1, 0, 0, false, 1); // 0.1

/// Positions held longer than this are weighted down as a weakness factor
/// (a long-held winner isn't automatically "weak" just because it's old;
/// only holds past this threshold count toward the rotation score at all).
const HOLDING_TRUST_HOURS: Decimal = Decimal::from_parts(48, 0, 0, false, 0);

/// Pre-close rotation score, combining profit%, holding time, MACD/RSI
/// momentum, and volume trend. Higher means weaker — a better candidate
/// to sell ahead of close. Tunable weights documented above; the binding
/// constraint for smart rotation remains the explicit gap rule, not this
/// composite.
pub fn rotation_score(candidate: &RotationCandidate, regime: Regime, now: DateTime<Utc>) -> Decimal {
    let profit_component = if candidate.profit_pct < Decimal::ZERO { -candidate.profit_pct } else { Decimal::ZERO };

    let holding_hours = candidate.holding_hours(now);
    let holding_component = if holding_hours > HOLDING_TRUST_HOURS {
        (holding_hours - HOLDING_TRUST_HOURS) / dec!(100)
    } else {
        Decimal::ZERO
    };

    let momentum_weakness = Decimal::from(candidate.weakness_score(regime)) / dec!(100);
    let volume_dryup = candidate
        .indicators
        .volume_ratio
        .map(|v| if v < dec!(0.8) { dec!(0.8) - v } else { Decimal::ZERO })
        .unwrap_or(Decimal::ZERO);

    profit_component * WEIGHT_PROFIT
        + holding_component * WEIGHT_HOLDING
        + momentum_weakness * WEIGHT_MOMENTUM
        + volume_dryup * WEIGHT_VOLUME
}

/// Ranks `candidates` by pre-close rotation score descending (weakest
/// first) and returns the bottom-scoring `count` — the ones to emit
/// ROTATION_SELL for, with explicit side=SELL and quantity copied from
/// the current holding.
pub fn select_preclose_rotation_sells(
    candidates: &[RotationCandidate],
    regime: Regime,
    now: DateTime<Utc>,
    count: usize,
) -> Vec<&RotationCandidate> {
    let mut scored: Vec<(&RotationCandidate, Decimal)> =
        candidates.iter().map(|c| (c, rotation_score(c, regime, now))).collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().take(count).map(|(c, _)| c).collect()
}

/// Smart rotation candidate selection: the weakest held
/// position whose gap to the incoming buy's score clears the threshold.
/// Returns `None` if no position qualifies (caller should not force a
/// sale just to clear one lot).
pub fn select_smart_rotation_candidate<'a>(
    candidates: &'a [RotationCandidate],
    regime: Regime,
    new_buy_score: i32,
    gap_threshold: i32,
) -> Option<&'a RotationCandidate> {
    candidates
        .iter()
        .map(|c| (c, c.weakness_score(regime)))
        .filter(|(_, weakness)| new_buy_score - weakness >= gap_threshold)
        .min_by_key(|(_, weakness)| *weakness)
        .map(|(c, _)| c)
}

/// Delayed-buy rescue: given a
/// high-score unfilled buy stuck in the delayed queue and the current
/// holdings, decide whether any held position is weak enough (gap >=
/// threshold against the stuck buy's score) to sell and free capital for it.
pub fn select_rescue_candidate<'a>(
    stuck_buy_score: i32,
    candidates: &'a [RotationCandidate],
    regime: Regime,
    gap_threshold: i32,
) -> Option<&'a RotationCandidate> {
    select_smart_rotation_candidate(candidates, regime, stuck_buy_score, gap_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::IndicatorSnapshot;

    fn indicators(volume_ratio: Option<Decimal>) -> ComputedIndicators {
        ComputedIndicators {
            snapshot: IndicatorSnapshot::default(),
            rsi: None,
            macd_line: None,
            macd_signal: None,
            macd_histogram: None,
            macd_fresh_golden_cross: false,
            macd_fresh_death_cross: false,
            macd_histogram_expanding: false,
            bb_upper: None,
            bb_middle: None,
            bb_lower: None,
            sma_20: None,
            sma_50: None,
            atr: None,
            volume_ratio,
            last_close: dec!(100),
            is_up_day: false,
        }
    }

    fn candidate(symbol: &str, profit_pct: Decimal, hours_held: i64, volume_ratio: Option<Decimal>) -> RotationCandidate {
        RotationCandidate {
            symbol: symbol.to_string(),
            quantity: 100,
            indicators: indicators(volume_ratio),
            profit_pct,
            held_since: Utc::now() - chrono::Duration::hours(hours_held),
        }
    }

    /// Scenario: 700.HK exit_score 22 (weak), 1398.HK exit_score 66-worth of
    /// gap against a stuck 700.HK buy scored 66.
    /// Expected: 1398.HK qualifies as the rescue candidate since
    /// 66 - 22 = 44 >= 10.
    #[test]
    fn rescue_candidate_selected_when_gap_clears_threshold() {
        let weak = candidate("1398.HK", dec!(-0.01), 10, Some(dec!(0.5)));
        let strong = candidate("0700.HK", dec!(0.08), 5, Some(dec!(1.5)));
        let candidates = vec![weak.clone(), strong];

        // Force a known weakness score by using a losing, volume-dry position.
        let selected = select_rescue_candidate(66, &candidates, Regime::Range, ROTATION_GAP_THRESHOLD);
        assert!(selected.is_some());
        assert_eq!(selected.unwrap().symbol, "1398.HK");
    }

    /// Scenario: every held position is still strong (low weakness score),
    /// no gap clears the threshold against a modestly-scored buy.
    /// Expected: no rescue candidate, caller must not force a sale.
    #[test]
    fn no_candidate_when_gap_not_cleared() {
        let strong = candidate("AAPL.US", dec!(0.05), 2, Some(dec!(1.5)));
        let candidates = vec![strong];
        let selected = select_smart_rotation_candidate(&candidates, Regime::Bull, 50, ROTATION_GAP_THRESHOLD);
        assert!(selected.is_none());
    }

    /// Scenario: three positions, one losing and stale, two healthy.
    /// Expected: select_preclose_rotation_sells(..., 1) returns the losing
    /// stale one first.
    #[test]
    fn preclose_selection_ranks_losing_stale_position_worst() {
        let loser = candidate("WEAK.HK", dec!(-0.05), 72, Some(dec!(0.3)));
        let winner_a = candidate("STRONG_A.HK", dec!(0.10), 4, Some(dec!(1.2)));
        let winner_b = candidate("STRONG_B.HK", dec!(0.03), 1, Some(dec!(1.0)));
        let candidates = vec![winner_a, loser.clone(), winner_b];

        let selected = select_preclose_rotation_sells(&candidates, Regime::Range, Utc::now(), 1);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].symbol, loser.symbol);
    }
}
