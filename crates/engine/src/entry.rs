//! Entry scoring, 0-100: RSI 30pts + Bollinger 25pts +
//! MACD 20pts + Volume 15pts + Trend 10pts, classified into a `SignalType`.

use meridian_core::SignalType;
use meridian_indicators::ComputedIndicators;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone)]
pub struct EntryScore {
    pub total: i32,
    pub reasons: Vec<String>,
    pub signal_type: Option<SignalType>,
}

/// Minimum total score below which no signal is emitted.
const WEAK_BUY_FLOOR: i32 = 30;
const BUY_FLOOR: i32 = 45;
const STRONG_BUY_FLOOR: i32 = 60;

/// Scores a BUY candidate from its computed indicators. Returns a score
/// with `signal_type = None` below the weak-buy floor; callers gate
/// `WeakBuy` behind `ENABLE_WEAK_BUY` themselves (this function always
/// classifies, config-independent).
pub fn score_entry(ind: &ComputedIndicators) -> EntryScore {
    let mut total = 0i32;
    let mut reasons = Vec::new();

    if let Some(points) = rsi_points(ind.rsi) {
        total += points;
        if points > 0 {
            reasons.push(format!("rsi={:?} -> {}pts", ind.rsi, points));
        }
    }

    if let Some(points) = bollinger_points(ind) {
        total += points;
        if points > 0 {
            reasons.push(format!("bollinger position -> {}pts", points));
        }
    }

    let macd_points = macd_points(ind);
    total += macd_points;
    if macd_points > 0 {
        reasons.push(format!("macd -> {}pts", macd_points));
    }

    if let Some(points) = volume_points(ind) {
        total += points;
        if points > 0 {
            reasons.push(format!("volume_ratio={:?} -> {}pts", ind.volume_ratio, points));
        }
    }

    let trend_points = trend_points(ind);
    total += trend_points;
    if trend_points > 0 {
        reasons.push(format!("trend -> {}pts", trend_points));
    }

    let signal_type = if total >= STRONG_BUY_FLOOR {
        Some(SignalType::StrongBuy)
    } else if total >= BUY_FLOOR {
        Some(SignalType::Buy)
    } else if total >= WEAK_BUY_FLOOR {
        Some(SignalType::WeakBuy)
    } else {
        None
    };

    EntryScore { total, reasons, signal_type }
}

fn rsi_points(rsi: Option<Decimal>) -> Option<i32> {
    let rsi = rsi?;
    Some(if rsi < dec!(30) {
        30
    } else if (dec!(45)..=dec!(55)).contains(&rsi) {
        10
    } else if rsi > dec!(70) {
        0
    } else {
        5
    })
}

fn bollinger_points(ind: &ComputedIndicators) -> Option<i32> {
    let (lower, middle, upper) = (ind.bb_lower?, ind.bb_middle?, ind.bb_upper?);
    let price = ind.last_close;
    Some(if price <= lower {
        25
    } else if price < middle {
        15
    } else if price < upper {
        5
    } else {
        0
    })
}

fn macd_points(ind: &ComputedIndicators) -> i32 {
    if ind.macd_fresh_golden_cross {
        20
    } else if ind.macd_histogram.is_some_and(|h| h > Decimal::ZERO) && ind.macd_histogram_expanding {
        15
    } else {
        5
    }
}

fn volume_points(ind: &ComputedIndicators) -> Option<i32> {
    let ratio = ind.volume_ratio?;
    Some(if ratio > dec!(1.8) && ind.is_up_day {
        15
    } else if ratio >= dec!(1.2) {
        8
    } else if ratio < dec!(0.8) {
        0
    } else {
        5
    })
}

fn trend_points(ind: &ComputedIndicators) -> i32 {
    match (ind.sma_20, ind.sma_50) {
        (Some(sma20), Some(sma50)) if ind.last_close > sma20 && sma20 > sma50 => 10,
        (Some(_), Some(_)) => 5,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::IndicatorSnapshot;

    fn base() -> ComputedIndicators {
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
            last_close: dec!(100),
            is_up_day: true,
        }
    }

    /// Scenario: oversold RSI, price at lower band, fresh golden cross,
    /// volume surge on an up day, clean uptrend.
    /// Expected: total hits the STRONG_BUY floor.
    #[test]
    fn textbook_setup_scores_strong_buy() {
        let ind = ComputedIndicators {
            rsi: Some(dec!(25)),
            bb_lower: Some(dec!(100)),
            bb_middle: Some(dec!(105)),
            bb_upper: Some(dec!(110)),
            macd_fresh_golden_cross: true,
            volume_ratio: Some(dec!(2.0)),
            sma_20: Some(dec!(95)),
            sma_50: Some(dec!(90)),
            last_close: dec!(100),
            is_up_day: true,
            ..base()
        };
        let score = score_entry(&ind);
        assert!(score.total >= 60, "expected >=60, got {}", score.total);
        assert_eq!(score.signal_type, Some(SignalType::StrongBuy));
    }

    /// Scenario: overbought RSI, price at the upper band, no indicators
    /// otherwise favorable.
    /// Expected: total falls below the weak-buy floor, no signal.
    #[test]
    fn overbought_setup_scores_no_signal() {
        let ind = ComputedIndicators {
            rsi: Some(dec!(75)),
            bb_lower: Some(dec!(90)),
            bb_middle: Some(dec!(95)),
            bb_upper: Some(dec!(100)),
            last_close: dec!(100),
            volume_ratio: Some(dec!(0.5)),
            ..base()
        };
        let score = score_entry(&ind);
        assert!(score.total < WEAK_BUY_FLOOR);
        assert_eq!(score.signal_type, None);
    }

    /// Scenario: missing RSI/bollinger/volume data (short history), only
    /// MACD flat baseline and no trend data.
    /// Expected: score_entry never panics, returns a low score.
    #[test]
    fn missing_indicators_fail_soft() {
        let ind = base();
        let score = score_entry(&ind);
        assert_eq!(score.total, 5); // macd flat baseline only
        assert_eq!(score.signal_type, None);
    }
}
