//! Stateful indicator trait shared by every indicator in this crate.
//!
//! Each indicator is fed a batch of klines via `update_batch` and then
//! queried through `value()`/`is_ready()`. This mirrors the way the
//! signal generator uses them: one fresh `Indicator` per symbol per scan
//! iteration, updated once with the full hybrid kline history.

use chrono::{DateTime, Utc};
use meridian_core::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::kline::Kline;

/// A single indicator reading with a timestamp and confidence weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorValue {
    pub value: IndicatorResult,
    pub timestamp: DateTime<Utc>,
    /// 0..1, ramping up to 1 as the buffer fills to `min_periods()`.
    pub confidence: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndicatorResult {
    Single(Decimal),
    Bands { upper: Decimal, middle: Decimal, lower: Decimal },
    Macd { macd_line: Decimal, signal_line: Decimal, histogram: Decimal },
}

impl IndicatorResult {
    pub fn single(&self) -> Option<Decimal> {
        match self {
            IndicatorResult::Single(v) => Some(*v),
            _ => None,
        }
    }
}

/// Common shape for every indicator: fed klines in order, queried once
/// ready. Boxed trait objects let callers hold a heterogeneous set (e.g.
/// "every indicator this symbol needs this scan").
pub trait Indicator: Send + Sync {
    fn name(&self) -> String;
    fn value(&self) -> Option<IndicatorValue>;
    fn update(&mut self, kline: &Kline) -> Result<()>;
    fn update_batch(&mut self, klines: &[Kline]) -> Result<()> {
        for k in klines {
            self.update(k)?;
        }
        Ok(())
    }
    fn reset(&mut self);
    fn is_ready(&self) -> bool;
    fn min_periods(&self) -> usize;
    fn clone_box(&self) -> Box<dyn Indicator>;
}

impl Clone for Box<dyn Indicator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
