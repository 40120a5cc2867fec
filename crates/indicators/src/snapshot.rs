//! One-shot computation of the full indicator snapshot a Signal carries
//!, given a symbol's merged kline history.

use meridian_core::IndicatorSnapshot;
use rust_decimal::Decimal;

use crate::core::{Indicator, IndicatorResult};
use crate::kline::Kline;
use crate::momentum::{Atr, BollingerBands, Macd, Rsi};
use crate::moving_average::Sma;

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BOLLINGER_PERIOD: usize = 20;
pub const ATR_PERIOD: usize = 14;
pub const VOLUME_AVG_PERIOD: usize = 20;

/// Every indicator the entry/exit scorers need, computed in one pass over
/// a kline slice, plus raw values (not just the `Option<Decimal>` snapshot
/// map) so the scorers can reason about crosses and trends.
#[derive(Debug, Clone)]
pub struct ComputedIndicators {
    pub snapshot: IndicatorSnapshot,
    pub rsi: Option<Decimal>,
    pub macd_line: Option<Decimal>,
    pub macd_signal: Option<Decimal>,
    pub macd_histogram: Option<Decimal>,
    pub macd_fresh_golden_cross: bool,
    pub macd_fresh_death_cross: bool,
    pub macd_histogram_expanding: bool,
    pub bb_upper: Option<Decimal>,
    pub bb_middle: Option<Decimal>,
    pub bb_lower: Option<Decimal>,
    pub sma_20: Option<Decimal>,
    pub sma_50: Option<Decimal>,
    pub atr: Option<Decimal>,
    pub volume_ratio: Option<Decimal>,
    pub last_close: Decimal,
    pub is_up_day: bool,
}

/// Compute the full indicator set over `klines` (ascending by date,
/// oldest first). Requires at least `MIN_KLINE_ROWS` (enforced upstream
/// by the hybrid loader); returns partial results (fields `None`) when a
/// given indicator's period isn't satisfied, matching the corpus's
/// fail-soft posture rather than erroring.
pub fn compute(klines: &[Kline]) -> ComputedIndicators {
    let mut rsi = Rsi::new(RSI_PERIOD);
    let mut macd = Macd::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    let mut bb = BollingerBands::new(BOLLINGER_PERIOD, Decimal::TWO);
    let mut sma20 = Sma::new(20);
    let mut sma50 = Sma::new(50);
    let mut atr = Atr::new(ATR_PERIOD);

    for k in klines {
        let _ = rsi.update(k);
        let _ = macd.update(k);
        let _ = bb.update(k);
        let _ = sma20.update(k);
        let _ = sma50.update(k);
        let _ = atr.update(k);
    }

    let (macd_line, macd_signal, macd_histogram) = match macd.value().map(|v| v.value) {
        Some(IndicatorResult::Macd { macd_line, signal_line, histogram }) => {
            (Some(macd_line), Some(signal_line), Some(histogram))
        }
        _ => (None, None, None),
    };
    let (bb_upper, bb_middle, bb_lower) = match bb.value().map(|v| v.value) {
        Some(IndicatorResult::Bands { upper, middle, lower }) => (Some(upper), Some(middle), Some(lower)),
        _ => (None, None, None),
    };

    let volume_ratio = volume_ratio(klines, VOLUME_AVG_PERIOD);
    let last = klines.last();
    let last_close = last.map(|k| k.close).unwrap_or(Decimal::ZERO);
    let is_up_day = match klines.len() {
        n if n >= 2 => klines[n - 1].close > klines[n - 2].close,
        _ => false,
    };

    let rsi_value = rsi.value().and_then(|v| v.value.single());
    let atr_value = atr.value().and_then(|v| v.value.single());
    let sma20_value = sma20.value().and_then(|v| v.value.single());
    let sma50_value = sma50.value().and_then(|v| v.value.single());

    ComputedIndicators {
        snapshot: IndicatorSnapshot {
            rsi: rsi_value,
            macd: macd_line,
            macd_signal,
            bb_upper,
            bb_middle,
            bb_lower,
            sma_20: sma20_value,
            sma_50: sma50_value,
            atr: atr_value,
            volume_ratio,
        },
        rsi: rsi_value,
        macd_line,
        macd_signal,
        macd_histogram,
        macd_fresh_golden_cross: macd.fresh_golden_cross(),
        macd_fresh_death_cross: macd.fresh_death_cross(),
        macd_histogram_expanding: macd.histogram_expanding(),
        bb_upper,
        bb_middle,
        bb_lower,
        sma_20: sma20_value,
        sma_50: sma50_value,
        atr: atr_value,
        volume_ratio,
        last_close,
        is_up_day,
    }
}

/// Computes the current snapshot plus the snapshot one bar earlier, so
/// callers can detect crossovers (e.g. SMA20/SMA50 crossing, RSI momentum
/// direction) that a single-point-in-time snapshot can't express.
pub fn compute_with_previous(klines: &[Kline]) -> (ComputedIndicators, Option<ComputedIndicators>) {
    let current = compute(klines);
    let previous = if klines.len() > 1 { Some(compute(&klines[..klines.len() - 1])) } else { None };
    (current, previous)
}

fn volume_ratio(klines: &[Kline], period: usize) -> Option<Decimal> {
    if klines.len() < period + 1 {
        return None;
    }
    let current = klines.last()?.volume;
    let window = &klines[klines.len() - 1 - period..klines.len() - 1];
    let avg = window.iter().map(|k| k.volume).sum::<i64>() as f64 / period as f64;
    if avg <= 0.0 {
        return None;
    }
    Some(Decimal::from(current) / Decimal::from_f64_retain(avg)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn series(n: usize) -> Vec<Kline> {
        (0..n)
            .map(|i| {
                let close = dec!(100) + Decimal::from(i as i64);
                Kline {
                    date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                    open: close,
                    high: close + dec!(1),
                    low: close - dec!(1),
                    close,
                    volume: 10_000,
                }
            })
            .collect()
    }

    /// Scenario: 60 days of steadily rising closes, flat volume.
    /// Expected: all indicators ready (>= 50+ rows covers every period);
    /// volume_ratio ~ 1.0 since volume never changes.
    #[test]
    fn computes_full_snapshot_with_enough_history() {
        let klines = series(60);
        let computed = compute(&klines);
        assert!(computed.rsi.is_some());
        assert!(computed.sma_50.is_some());
        assert!(computed.bb_upper.is_some());
        let ratio = computed.volume_ratio.unwrap();
        assert!((ratio - Decimal::ONE).abs() < dec!(0.01));
    }

    /// Scenario: fewer than 50 rows.
    /// Expected: sma_50 is None (fail-soft), shorter-period indicators
    /// still populated.
    #[test]
    fn partial_history_yields_partial_snapshot() {
        let klines = series(35);
        let computed = compute(&klines);
        assert!(computed.sma_50.is_none());
        assert!(computed.sma_20.is_some());
    }

    /// Scenario: `compute_with_previous` over a short rising series.
    /// Expected: the previous snapshot reflects one fewer bar than current.
    #[test]
    fn compute_with_previous_drops_last_bar() {
        let klines = series(40);
        let (current, previous) = compute_with_previous(&klines);
        let previous = previous.unwrap();
        assert_eq!(current.last_close, dec!(139));
        assert_eq!(previous.last_close, dec!(138));
    }
}
