//! meridian-indicators — technical indicator library and the hybrid
//! DB+API kline loader.

pub mod core;
pub mod kline;
pub mod momentum;
pub mod moving_average;
pub mod snapshot;

pub use core::{Indicator, IndicatorResult, IndicatorValue};
pub use kline::{is_option_symbol, merge_klines, HybridKlineLoader, Kline, KlineApiSource, KlineDbSource, MIN_KLINE_ROWS};
pub use momentum::{Atr, BollingerBands, Macd, Rsi};
pub use moving_average::{Ema, Sma};
pub use snapshot::{compute, compute_with_previous, ComputedIndicators};
