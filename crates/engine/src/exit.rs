//! Signed exit score −100..+100 and action classification for held
//! positions, with hard floor overrides that bypass the
//! score entirely (stop-loss / take-profit).
//!
//! Layers a hard-threshold check over a softer weakness score, kept here
//! as a single scorer since one composite formula covers every exit
//! trigger.

use meridian_core::PositionStop;
use meridian_indicators::ComputedIndicators;
use rust_decimal::Decimal;

use crate::regime::Regime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    /// Hard floor: price <= stop_loss. Priority 100, full quantity.
    StopLoss,
    /// Hard floor: price >= take_profit and score >= 0. Priority 90.
    TakeProfit,
    /// score >= 70: full exit, immediate.
    TakeProfitNow,
    /// 50 <= score < 70: exit 50%, observe.
    PartialExit,
    /// 40 <= score < 50: exit 25%, observe.
    GradualExit,
    /// score <= -40: extend take-profit, consider ADD_POSITION.
    StrongHold,
    /// -20 < score < 40: ordinary hold, stops still in force.
    Hold,
    /// score < 0 at the take-profit floor: raise stop/target instead of
    /// exiting ("smart hold" hard floors).
    SmartHold { new_stop_loss: Decimal, new_take_profit: Decimal },
}

#[derive(Debug, Clone)]
pub struct ExitDecision {
    pub action: ExitAction,
    pub score: i32,
    pub reasons: Vec<String>,
    pub quantity_fraction: Decimal,
    pub priority: i32,
}

/// MACD bearish cross carries an "immediate action" override — callers
/// should treat it as at least PARTIAL_EXIT regardless of the
/// gradual-exit config flag.
pub const MACD_DEATH_CROSS_OVERRIDE_FLOOR: i32 = 50;

/// score_exit evaluates the hard floors first (stop-loss, take-profit),
/// then the signed weakness score if neither floor fires.
pub fn score_exit(
    ind: &ComputedIndicators,
    stop: &PositionStop,
    regime: Regime,
    gradual_exit_enabled: bool,
) -> ExitDecision {
    let price = ind.last_close;

    if price <= stop.stop_loss {
        return ExitDecision {
            action: ExitAction::StopLoss,
            score: 100,
            reasons: vec!["price at or below stop_loss".to_string()],
            quantity_fraction: Decimal::ONE,
            priority: 100,
        };
    }

    let (score, reasons) = weakness_score(ind, regime);

    if price >= stop.take_profit {
        return if score >= 0 {
            ExitDecision {
                action: ExitAction::TakeProfit,
                score,
                reasons,
                quantity_fraction: Decimal::ONE,
                priority: 90,
            }
        } else {
            let new_stop_loss = price;
            let new_take_profit = price * Decimal::new(105, 2);
            ExitDecision {
                action: ExitAction::SmartHold { new_stop_loss, new_take_profit },
                score,
                reasons,
                quantity_fraction: Decimal::ZERO,
                priority: 0,
            }
        };
    }

    let (action, quantity_fraction, priority) = classify(score, gradual_exit_enabled);
    ExitDecision { action, score, reasons, quantity_fraction, priority }
}

fn classify(score: i32, gradual_exit_enabled: bool) -> (ExitAction, Decimal, i32) {
    if score >= 70 {
        (ExitAction::TakeProfitNow, Decimal::ONE, 80)
    } else if score >= 50 && gradual_exit_enabled {
        (ExitAction::PartialExit, Decimal::new(50, 2), 60)
    } else if score >= 40 && gradual_exit_enabled {
        (ExitAction::GradualExit, Decimal::new(25, 2), 40)
    } else if score <= -40 {
        (ExitAction::StrongHold, Decimal::ZERO, 0)
    } else {
        (ExitAction::Hold, Decimal::ZERO, 0)
    }
}

/// Bearish factors add, bullish factors subtract, regime overlay shifts
/// the whole thing. Clamped to [-100, 100]. `pub(crate)` so
/// `rotation.rs` can reuse the same weakness metric without issuing
/// signals of its own.
pub(crate) fn weakness_score(ind: &ComputedIndicators, regime: Regime) -> (i32, Vec<String>) {
    let mut score = 0i32;
    let mut reasons = Vec::new();

    if ind.macd_fresh_death_cross {
        score += 50;
        reasons.push("macd bearish cross".to_string());
    }
    if ind.rsi.is_some_and(|r| r > Decimal::new(80, 0)) {
        score += 40;
        reasons.push("rsi > 80".to_string());
    }
    if rolled_off_upper_band_with_falling_rsi(ind) {
        score += 30;
        reasons.push("price rolled off upper band, rsi dropping".to_string());
    }
    if sma20_below_sma50(ind) {
        score += 25;
        reasons.push("sma20 < sma50 crossover".to_string());
    }
    if ind.volume_ratio.is_some_and(|v| v < Decimal::new(8, 1)) {
        score += 15;
        reasons.push("volume dry-up".to_string());
    }
    if ind.sma_20.is_some_and(|sma20| ind.last_close < sma20) {
        score += 20;
        reasons.push("price breaks below sma20".to_string());
    }

    if strong_uptrend(ind) {
        score -= 30;
        reasons.push("price > sma20 > sma50 strongly".to_string());
    }
    if ind.macd_fresh_golden_cross || (ind.macd_histogram.is_some_and(|h| h > Decimal::ZERO) && ind.macd_histogram_expanding) {
        score -= 25;
        reasons.push("fresh macd golden cross or expanding histogram".to_string());
    }
    if ind.rsi.is_some_and(|r| (Decimal::new(50, 0)..=Decimal::new(70, 0)).contains(&r)) {
        score -= 20;
        reasons.push("rsi in strong zone".to_string());
    }
    if ind.bb_upper.is_some_and(|upper| ind.last_close > upper) {
        score -= 15;
        reasons.push("breakout above upper band".to_string());
    }
    if ind.volume_ratio.is_some_and(|v| v > Decimal::new(12, 1)) {
        score -= 10;
        reasons.push("volume expanding".to_string());
    }

    let overlay = match regime {
        Regime::Bear => 15,
        Regime::Bull => -10,
        Regime::Range => 0,
    };
    if overlay != 0 {
        score += overlay;
        reasons.push(format!("regime overlay ({:?}): {:+}", regime, overlay));
    }

    (score.clamp(-100, 100), reasons)
}

fn rolled_off_upper_band_with_falling_rsi(ind: &ComputedIndicators) -> bool {
    let Some(upper) = ind.bb_upper else { return false };
    let falling_rsi = ind.rsi.is_some_and(|r| r < Decimal::new(70, 0));
    ind.last_close < upper && falling_rsi
}

fn sma20_below_sma50(ind: &ComputedIndicators) -> bool {
    match (ind.sma_20, ind.sma_50) {
        (Some(sma20), Some(sma50)) => sma20 < sma50,
        _ => false,
    }
}

fn strong_uptrend(ind: &ComputedIndicators) -> bool {
    match (ind.sma_20, ind.sma_50) {
        (Some(sma20), Some(sma50)) => ind.last_close > sma20 && sma20 > sma50,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meridian_core::IndicatorSnapshot;
    use rust_decimal_macros::dec;

    fn ind(last_close: Decimal) -> ComputedIndicators {
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
            volume_ratio: None,
            last_close,
            is_up_day: false,
        }
    }

    fn stop(entry: Decimal) -> PositionStop {
        PositionStop::from_atr("acct", "AAPL.US", entry, dec!(2), "default", Utc::now())
    }

    /// Scenario: price has dropped to the stop-loss level.
    /// Expected: hard floor fires regardless of indicators, priority 100.
    #[test]
    fn stop_loss_floor_overrides_score() {
        let stop = stop(dec!(100));
        let price = stop.stop_loss;
        let decision = score_exit(&ind(price), &stop, Regime::Bull, true);
        assert_eq!(decision.action, ExitAction::StopLoss);
        assert_eq!(decision.priority, 100);
    }

    /// Scenario: price at take-profit, but weakness score is negative
    /// (bullish indicators dominate).
    /// Expected: smart-hold raises stop/target instead of exiting.
    #[test]
    fn take_profit_with_negative_score_smart_holds() {
        let stop = stop(dec!(100));
        let price = stop.take_profit;
        let mut i = ind(price);
        i.sma_20 = Some(dec!(90));
        i.sma_50 = Some(dec!(80));
        i.macd_fresh_golden_cross = true;
        let decision = score_exit(&i, &stop, Regime::Bull, true);
        match decision.action {
            ExitAction::SmartHold { new_stop_loss, new_take_profit } => {
                assert_eq!(new_stop_loss, price);
                assert_eq!(new_take_profit, price * dec!(1.05));
            }
            other => panic!("expected SmartHold, got {:?}", other),
        }
    }

    /// Scenario: fresh MACD death cross plus overbought RSI, no hard
    /// floors triggered.
    /// Expected: score clears the TAKE_PROFIT_NOW threshold.
    #[test]
    fn death_cross_and_overbought_triggers_take_profit_now() {
        let stop = stop(dec!(100));
        let mut i = ind(dec!(105));
        i.macd_fresh_death_cross = true;
        i.rsi = Some(dec!(85));
        let decision = score_exit(&i, &stop, Regime::Range, true);
        assert_eq!(decision.action, ExitAction::TakeProfitNow);
        assert!(decision.score >= 70);
    }

    /// Scenario: strongly bullish indicators, no bearish factors.
    /// Expected: STRONG_HOLD (score <= -40).
    #[test]
    fn strong_uptrend_yields_strong_hold() {
        let stop = stop(dec!(100));
        let mut i = ind(dec!(110));
        i.sma_20 = Some(dec!(100));
        i.sma_50 = Some(dec!(90));
        i.macd_fresh_golden_cross = true;
        i.rsi = Some(dec!(60));
        let decision = score_exit(&i, &stop, Regime::Bull, true);
        assert_eq!(decision.action, ExitAction::StrongHold);
    }
}
