//! SMA and EMA, grounded on the stateful `VecDeque`-buffered implementations
//! in the pack's indicator-service corpus.

use chrono::Utc;
use meridian_core::Result;
use rust_decimal::Decimal;
use std::collections::VecDeque;

use crate::core::{Indicator, IndicatorResult, IndicatorValue};
use crate::kline::Kline;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    buffer: VecDeque<Decimal>,
    sum: Decimal,
    last_value: Option<IndicatorValue>,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self { period, buffer: VecDeque::with_capacity(period), sum: Decimal::ZERO, last_value: None }
    }
}

impl Indicator for Sma {
    fn name(&self) -> String {
        format!("SMA({})", self.period)
    }

    fn value(&self) -> Option<IndicatorValue> {
        self.last_value.clone()
    }

    fn update(&mut self, kline: &Kline) -> Result<()> {
        self.buffer.push_back(kline.close);
        self.sum += kline.close;
        if self.buffer.len() > self.period {
            if let Some(old) = self.buffer.pop_front() {
                self.sum -= old;
            }
        }
        let value = if self.buffer.is_empty() {
            Decimal::ZERO
        } else {
            self.sum / Decimal::from(self.buffer.len().min(self.period))
        };
        self.last_value = Some(IndicatorValue {
            value: IndicatorResult::Single(value),
            timestamp: Utc::now(),
            confidence: if self.is_ready() {
                Decimal::ONE
            } else {
                Decimal::from(self.buffer.len()) / Decimal::from(self.period)
            },
        });
        Ok(())
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.sum = Decimal::ZERO;
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

#[derive(Debug, Clone)]
pub struct Ema {
    pub period: usize,
    multiplier: Decimal,
    current: Option<Decimal>,
    samples: usize,
    last_value: Option<IndicatorValue>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            multiplier: Decimal::from(2) / Decimal::from(period + 1),
            current: None,
            samples: 0,
            last_value: None,
        }
    }

    /// Feed a raw value directly (used by MACD to EMA its own line).
    pub fn update_value(&mut self, v: Decimal) {
        self.samples += 1;
        let new_value = match self.current {
            Some(prev) => v * self.multiplier + prev * (Decimal::ONE - self.multiplier),
            None => v,
        };
        self.current = Some(new_value);
        self.last_value = Some(IndicatorValue {
            value: IndicatorResult::Single(new_value),
            timestamp: Utc::now(),
            confidence: if self.samples >= self.period {
                Decimal::ONE
            } else {
                Decimal::from(self.samples) / Decimal::from(self.period)
            },
        });
    }
}

impl Indicator for Ema {
    fn name(&self) -> String {
        format!("EMA({})", self.period)
    }

    fn value(&self) -> Option<IndicatorValue> {
        self.last_value.clone()
    }

    fn update(&mut self, kline: &Kline) -> Result<()> {
        self.update_value(kline.close);
        Ok(())
    }

    fn reset(&mut self) {
        self.current = None;
        self.samples = 0;
        self.last_value = None;
    }

    fn is_ready(&self) -> bool {
        self.samples >= self.period
    }

    fn min_periods(&self) -> usize {
        self.period
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

    fn bar(n: i64, close: Decimal) -> Kline {
        Kline {
            date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Duration::days(n),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1,
        }
    }

    #[test]
    fn sma_averages_last_n() {
        let mut sma = Sma::new(3);
        for (i, c) in [dec!(10), dec!(20), dec!(30), dec!(40)].into_iter().enumerate() {
            sma.update(&bar(i as i64, c)).unwrap();
        }
        // last 3: 20, 30, 40 -> 30
        assert_eq!(sma.value().unwrap().value.single().unwrap(), dec!(30));
        assert!(sma.is_ready());
    }

    #[test]
    fn ema_not_ready_before_period() {
        let mut ema = Ema::new(5);
        ema.update(&bar(0, dec!(10))).unwrap();
        assert!(!ema.is_ready());
    }
}
