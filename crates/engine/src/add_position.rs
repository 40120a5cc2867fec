//! ADD_POSITION emission rule: adds to an already-held,
//! already-profitable position when a fresh BUY candidate re-confirms
//! strength and the position's own exit score says it's far from being
//! sold. Bypasses the per-symbol daily BUY cap (§4.5.2 layer 4) per the
//! Open Question resolution in DESIGN.md, but is gated by its own
//! cooldown/day-cap in `CohortTracker`.

use rust_decimal::Decimal;

use crate::regime::Regime;

/// Inputs already computed by the caller's exit/entry scoring this
/// iteration — `add_position` itself is pure classification, no I/O.
#[derive(Debug, Clone, Copy)]
pub struct AddPositionCandidate {
    pub regime: Regime,
    pub position_profit_pct: Decimal,
    pub exit_score: i32,
    pub fresh_entry_score: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPositionBlock {
    RegimeBear,
    InsufficientProfit,
    ExitScoreTooHigh,
    EntryScoreTooLow,
    CooldownOrDayCap,
}

impl AddPositionBlock {
    pub fn reason(&self) -> &'static str {
        match self {
            AddPositionBlock::RegimeBear => "market regime is BEAR",
            AddPositionBlock::InsufficientProfit => "position profit below minimum",
            AddPositionBlock::ExitScoreTooHigh => "exit score not weak enough to justify adding",
            AddPositionBlock::EntryScoreTooLow => "fresh entry score below minimum",
            AddPositionBlock::CooldownOrDayCap => "add-position cooldown or daily cap not satisfied",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AddPositionParams {
    pub min_profit_pct: Decimal,
    pub min_entry_score: i32,
    /// Blocks the add once the position's own exit score drops this low
    /// (default -30) — too weak to add to even in an uptrend.
    pub max_exit_score: i32,
    pub pct_of_position: Decimal,
}

/// Evaluates the five add-position conditions (the cooldown/day-cap
/// condition is checked by the caller via `CohortTracker::add_position_eligible`
/// before calling this, since that state lives outside this pure function).
/// Returns the blocking reason, or `None` if the candidate is clear to add.
pub fn check_add_position(candidate: &AddPositionCandidate, params: &AddPositionParams) -> Option<AddPositionBlock> {
    if candidate.regime == Regime::Bear {
        return Some(AddPositionBlock::RegimeBear);
    }
    if candidate.position_profit_pct < params.min_profit_pct {
        return Some(AddPositionBlock::InsufficientProfit);
    }
    if candidate.exit_score > params.max_exit_score {
        return Some(AddPositionBlock::ExitScoreTooHigh);
    }
    if candidate.fresh_entry_score < params.min_entry_score {
        return Some(AddPositionBlock::EntryScoreTooLow);
    }
    None
}

/// Quantity to add: `pct_of_position` (default 15%) of the currently held
/// quantity, floored — never upsized to a full lot since it's additive to
/// an existing holding rather than a fresh entry.
pub fn add_position_quantity(current_quantity: i64, pct_of_position: Decimal) -> i64 {
    let qty = Decimal::from(current_quantity) * pct_of_position;
    qty.floor().to_string().parse::<i64>().unwrap_or(0).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params() -> AddPositionParams {
        AddPositionParams {
            min_profit_pct: dec!(0.02),
            min_entry_score: 60,
            max_exit_score: -30,
            pct_of_position: dec!(0.15),
        }
    }

    /// Scenario: BULL regime, 5% profit, exit_score -40, fresh entry score 70.
    /// Expected: all five conditions pass, no block.
    #[test]
    fn qualifying_candidate_is_clear() {
        let candidate = AddPositionCandidate {
            regime: Regime::Bull,
            position_profit_pct: dec!(0.05),
            exit_score: -40,
            fresh_entry_score: 70,
        };
        assert_eq!(check_add_position(&candidate, &params()), None);
    }

    /// Scenario: BEAR regime, otherwise qualifying.
    /// Expected: blocked regardless of the other four conditions.
    #[test]
    fn bear_regime_blocks_even_if_otherwise_qualifying() {
        let candidate = AddPositionCandidate {
            regime: Regime::Bear,
            position_profit_pct: dec!(0.10),
            exit_score: -50,
            fresh_entry_score: 90,
        };
        assert_eq!(check_add_position(&candidate, &params()), Some(AddPositionBlock::RegimeBear));
    }

    /// Scenario: exit_score -20 (not weak enough; threshold is <= -30).
    /// Expected: blocked.
    #[test]
    fn exit_score_not_weak_enough_blocks() {
        let candidate = AddPositionCandidate {
            regime: Regime::Range,
            position_profit_pct: dec!(0.05),
            exit_score: -20,
            fresh_entry_score: 70,
        };
        assert_eq!(check_add_position(&candidate, &params()), Some(AddPositionBlock::ExitScoreTooHigh));
    }

    /// Scenario: 1000 shares held, 15% add.
    /// Expected: 150 shares, floored.
    #[test]
    fn quantity_is_floored_fraction_of_holding() {
        assert_eq!(add_position_quantity(1000, dec!(0.15)), 150);
        assert_eq!(add_position_quantity(7, dec!(0.15)), 1);
    }
}
