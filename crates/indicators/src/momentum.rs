//! RSI, MACD, Bollinger Bands, ATR.
//!
//! MACD and Bollinger here use a true EMA-of-MACD signal line and a real
//! standard deviation (via `rust_decimal`'s `maths` feature), correcting
//! the free-function reference implementations in the indicator-service
//! corpus this crate is grounded on, which use variance in place of its
//! square root and set the signal line equal to the MACD line itself.

use chrono::Utc;
use meridian_core::Result;
use rust_decimal::{Decimal, MathematicalOps};
use std::collections::VecDeque;

use crate::core::{Indicator, IndicatorResult, IndicatorValue};
use crate::kline::Kline;
use crate::moving_average::Ema;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    avg_gain: Option<Decimal>,
    avg_loss: Option<Decimal>,
    prev_close: Option<Decimal>,
    samples: usize,
    last_value: Option<IndicatorValue>,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self { period, avg_gain: None, avg_loss: None, prev_close: None, samples: 0, last_value: None }
    }

    fn calculate(&self) -> Option<Decimal> {
        match (self.avg_gain, self.avg_loss) {
            (Some(gain), Some(loss)) => {
                if loss == Decimal::ZERO {
                    Some(Decimal::from(100))
                } else {
                    let rs = gain / loss;
                    Some(Decimal::from(100) - Decimal::from(100) / (Decimal::ONE + rs))
                }
            }
            _ => None,
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> String {
        format!("RSI({})", self.period)
    }

    fn value(&self) -> Option<IndicatorValue> {
        self.last_value.clone()
    }

    fn update(&mut self, kline: &Kline) -> Result<()> {
        if let Some(prev) = self.prev_close {
            let change = kline.close - prev;
            let (gain, loss) = if change > Decimal::ZERO { (change, Decimal::ZERO) } else { (Decimal::ZERO, change.abs()) };

            let n = Decimal::from(self.period);
            match (self.avg_gain, self.avg_loss) {
                (Some(prev_gain), Some(prev_loss)) => {
                    // Wilder's smoothing.
                    self.avg_gain = Some((prev_gain * (n - Decimal::ONE) + gain) / n);
                    self.avg_loss = Some((prev_loss * (n - Decimal::ONE) + loss) / n);
                }
                _ => {
                    self.avg_gain = Some(gain);
                    self.avg_loss = Some(loss);
                }
            }
            self.samples += 1;

            if let Some(rsi) = self.calculate() {
                self.last_value = Some(IndicatorValue {
                    value: IndicatorResult::Single(rsi),
                    timestamp: Utc::now(),
                    confidence: if self.is_ready() { Decimal::ONE } else { Decimal::from(self.samples) / n },
                });
            }
        }
        self.prev_close = Some(kline.close);
        Ok(())
    }

    fn reset(&mut self) {
        self.avg_gain = None;
        self.avg_loss = None;
        self.prev_close = None;
        self.samples = 0;
        self.last_value = None;
    }

    fn is_ready(&self) -> bool {
        self.samples >= self.period
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn clone_box(&self) -> Box<dyn Indicator> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    last_value: Option<IndicatorValue>,
    prev_histogram: Option<Decimal>,
    fresh_golden_cross: bool,
    fresh_death_cross: bool,
}

impl Macd {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        Self {
            fast: Ema::new(fast_period),
            slow: Ema::new(slow_period),
            signal: Ema::new(signal_period),
            last_value: None,
            prev_histogram: None,
            fresh_golden_cross: false,
            fresh_death_cross: false,
        }
    }

    /// True if the MACD line crossed above the signal line on the most
    /// recent update (histogram flipped from negative/zero to positive).
    pub fn fresh_golden_cross(&self) -> bool {
        self.fresh_golden_cross
    }

    /// True if the MACD line crossed below the signal line on the most
    /// recent update (histogram flipped from positive/zero to negative) —
    /// the exit scorer's highest-weight bearish trigger.
    pub fn fresh_death_cross(&self) -> bool {
        self.fresh_death_cross
    }

    pub fn histogram_expanding(&self) -> bool {
        match (&self.last_value, self.prev_histogram) {
            (Some(v), Some(prev)) => match v.value {
                IndicatorResult::Macd { histogram, .. } => histogram > Decimal::ZERO && histogram > prev,
                _ => false,
            },
            _ => false,
        }
    }
}

impl Indicator for Macd {
    fn name(&self) -> String {
        format!("MACD({},{},{})", self.fast.period, self.slow.period, self.signal.period)
    }

    fn value(&self) -> Option<IndicatorValue> {
        self.last_value.clone()
    }

    fn update(&mut self, kline: &Kline) -> Result<()> {
        self.fast.update(kline)?;
        self.slow.update(kline)?;

        if let (Some(f), Some(s)) = (self.fast.value(), self.slow.value()) {
            let (Some(fast_v), Some(slow_v)) = (f.value.single(), s.value.single()) else {
                return Ok(());
            };
            let macd_line = fast_v - slow_v;
            self.signal.update_value(macd_line);
            let signal_line = self.signal.value().and_then(|v| v.value.single()).unwrap_or(macd_line);
            let histogram = macd_line - signal_line;

            let prev = self.last_value.as_ref().and_then(|v| match v.value {
                IndicatorResult::Macd { histogram, .. } => Some(histogram),
                _ => None,
            });
            self.fresh_golden_cross = matches!(prev, Some(p) if p <= Decimal::ZERO) && histogram > Decimal::ZERO;
            self.fresh_death_cross = matches!(prev, Some(p) if p >= Decimal::ZERO) && histogram < Decimal::ZERO;
            self.prev_histogram = prev;

            self.last_value = Some(IndicatorValue {
                value: IndicatorResult::Macd { macd_line, signal_line, histogram },
                timestamp: Utc::now(),
                confidence: if self.is_ready() { Decimal::ONE } else { Decimal::new(5, 1) },
            });
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
        self.signal.reset();
        self.last_value = None;
        self.prev_histogram = None;
        self.fresh_golden_cross = false;
        self.fresh_death_cross = false;
    }

    fn is_ready(&self) -> bool {
        self.slow.is_ready() && self.signal.is_ready()
    }

    fn min_periods(&self) -> usize {
        self.slow.min_periods() + self.signal.min_periods()
    }

    fn clone_box(&self) -> Box<dyn Indicator> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone)]
pub struct BollingerBands {
    period: usize,
    std_dev_multiplier: Decimal,
    buffer: VecDeque<Decimal>,
    last_value: Option<IndicatorValue>,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev_multiplier: Decimal) -> Self {
        Self { period, std_dev_multiplier, buffer: VecDeque::with_capacity(period), last_value: None }
    }
}

impl Indicator for BollingerBands {
    fn name(&self) -> String {
        format!("BB({})", self.period)
    }

    fn value(&self) -> Option<IndicatorValue> {
        self.last_value.clone()
    }

    fn update(&mut self, kline: &Kline) -> Result<()> {
        self.buffer.push_back(kline.close);
        if self.buffer.len() > self.period {
            self.buffer.pop_front();
        }
        if self.buffer.len() == self.period {
            let middle = self.buffer.iter().sum::<Decimal>() / Decimal::from(self.period);
            let variance = self
                .buffer
                .iter()
                .map(|p| (*p - middle) * (*p - middle))
                .sum::<Decimal>()
                / Decimal::from(self.period);
            let std_dev = variance.sqrt().unwrap_or(Decimal::ZERO);
            let upper = middle + std_dev * self.std_dev_multiplier;
            let lower = middle - std_dev * self.std_dev_multiplier;
            self.last_value = Some(IndicatorValue {
                value: IndicatorResult::Bands { upper, middle, lower },
                timestamp: Utc::now(),
                confidence: Decimal::ONE,
            });
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.last_value = None;
    }

    fn is_ready(&self) -> bool {
        self.buffer.len() >= self.period
    }

    fn min_periods(&self) -> usize {
        self.period
    }

    fn clone_box(&self) -> Box<dyn Indicator> {
        Box::new(self.clone())
    }
}

/// Average True Range over a rolling window (simple average of the last
/// `period` true ranges — no Wilder smoothing, matching the free-function
/// reference this is grounded on).
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<Decimal>,
    true_ranges: VecDeque<Decimal>,
    last_value: Option<IndicatorValue>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self { period, prev_close: None, true_ranges: VecDeque::with_capacity(period), last_value: None }
    }
}

impl Indicator for Atr {
    fn name(&self) -> String {
        format!("ATR({})", self.period)
    }

    fn value(&self) -> Option<IndicatorValue> {
        self.last_value.clone()
    }

    fn update(&mut self, kline: &Kline) -> Result<()> {
        if let Some(prev_close) = self.prev_close {
            let tr1 = kline.high - kline.low;
            let tr2 = (kline.high - prev_close).abs();
            let tr3 = (kline.low - prev_close).abs();
            let tr = tr1.max(tr2).max(tr3);
            self.true_ranges.push_back(tr);
            if self.true_ranges.len() > self.period {
                self.true_ranges.pop_front();
            }
            if self.true_ranges.len() >= self.period {
                let atr = self.true_ranges.iter().sum::<Decimal>() / Decimal::from(self.period);
                self.last_value = Some(IndicatorValue {
                    value: IndicatorResult::Single(atr),
                    timestamp: Utc::now(),
                    confidence: Decimal::ONE,
                });
            }
        }
        self.prev_close = Some(kline.close);
        Ok(())
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.true_ranges.clear();
        self.last_value = None;
    }

    fn is_ready(&self) -> bool {
        self.true_ranges.len() >= self.period
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn clone_box(&self) -> Box<dyn Indicator> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn bar(n: i64, high: Decimal, low: Decimal, close: Decimal) -> Kline {
        Kline { date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Duration::days(n), open: close, high, low, close, volume: 1_000 }
    }

    /// Scenario: strictly rising closes for > period bars.
    /// Expected: RSI approaches 100 (no losses).
    #[test]
    fn rsi_all_gains_near_100() {
        let mut rsi = Rsi::new(14);
        let mut price = dec!(100);
        for i in 0..20 {
            price += dec!(1);
            rsi.update(&bar(i, price, price, price)).unwrap();
        }
        let value = rsi.value().unwrap().value.single().unwrap();
        assert!(value > dec!(90), "expected RSI near 100, got {value}");
    }

    /// Scenario: Bollinger width on a perfectly flat series.
    /// Expected: std_dev = 0, so upper == middle == lower.
    #[test]
    fn bollinger_flat_series_zero_width() {
        let mut bb = BollingerBands::new(5, dec!(2));
        for i in 0..5 {
            bb.update(&bar(i, dec!(50), dec!(50), dec!(50))).unwrap();
        }
        match bb.value().unwrap().value {
            IndicatorResult::Bands { upper, middle, lower } => {
                assert_eq!(upper, middle);
                assert_eq!(lower, middle);
            }
            _ => panic!("expected bands"),
        }
    }

    /// Regression test for the corpus's free-function bug: band width
    /// must use the square root of variance, not the variance itself.
    #[test]
    fn bollinger_uses_stddev_not_variance() {
        let mut bb = BollingerBands::new(4, dec!(1));
        for (i, c) in [dec!(10), dec!(20), dec!(10), dec!(20)].into_iter().enumerate() {
            bb.update(&bar(i as i64, c, c, c)).unwrap();
        }
        let (upper, middle) = match bb.value().unwrap().value {
            IndicatorResult::Bands { upper, middle, .. } => (upper, middle),
            _ => panic!("expected bands"),
        };
        // variance = 25, stddev = 5: upper should be middle + 5, not middle + 25.
        assert_eq!(upper - middle, dec!(5));
    }

    /// Regression test: MACD signal line must be an EMA of the MACD line,
    /// not equal to it — a signal line that tracks the MACD line exactly
    /// would make the histogram always zero.
    #[test]
    fn macd_signal_line_differs_from_macd_line() {
        let mut macd = Macd::new(3, 6, 4);
        let mut price = dec!(100);
        for i in 0..20 {
            price += if i % 2 == 0 { dec!(3) } else { dec!(-1) };
            macd.update(&bar(i, price, price, price)).unwrap();
        }
        match macd.value().unwrap().value {
            IndicatorResult::Macd { histogram, .. } => {
                assert_ne!(histogram, Decimal::ZERO);
            }
            _ => panic!("expected macd"),
        }
    }

    #[test]
    fn atr_requires_period_plus_one_bars() {
        let mut atr = Atr::new(3);
        for i in 0..3 {
            atr.update(&bar(i, dec!(105), dec!(95), dec!(100))).unwrap();
        }
        assert!(!atr.is_ready());
        atr.update(&bar(3, dec!(106), dec!(94), dec!(101))).unwrap();
        assert!(atr.is_ready());
    }
}
