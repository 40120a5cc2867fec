//! Broker contract: the external brokerage API surface SG and OE depend on.
//!
//! One async trait object, implemented once against the real HTTP/WS API
//! (`HttpBroker`) and once in-memory for tests (`MockBroker`). SG and OE
//! both take `Arc<dyn Broker>` so a single connection is shared across a
//! process's cooperative tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_core::{AccountState, OrderRecord, OrderStatus, Result, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Day,
    GoodTillCanceled,
}

impl Default for TimeInForce {
    fn default() -> Self {
        TimeInForce::Day
    }
}

/// A single realtime or historical price tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub last_price: Decimal,
    pub volume: i64,
    pub timestamp: DateTime<Utc>,
}

/// One OHLCV bar from `get_history_candles` / `get_candlesticks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleBar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandlePeriod {
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Adjust {
    None,
    Forward,
    Backward,
}

#[derive(Debug, Clone)]
pub struct SubmitOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub price: Decimal,
    pub order_type: OrderType,
    pub tif: TimeInForce,
}

impl SubmitOrderRequest {
    pub fn limit_day(symbol: impl Into<String>, side: Side, quantity: i64, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            price,
            order_type: OrderType::Limit,
            tif: TimeInForce::Day,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSubmitResult {
    pub order_id: String,
    pub status: OrderStatus,
}

/// Response shape of `estimate_max_purchase_quantity`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EstimateMaxPurchase {
    pub margin_max_qty: i64,
    pub cash_max_qty: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderHistoryRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The subset of broker operations SG/OE depend on. Implementations
/// own their own retry/backoff for transport-level failures; callers classify
/// the returned `Error` via `Error::retryable()`.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn subscribe_quotes(&self, symbols: &[String]) -> Result<()>;

    async fn unsubscribe_quotes(&self, symbols: &[String]) -> Result<()>;

    async fn get_realtime_quote(&self, symbols: &[String]) -> Result<Vec<Quote>>;

    async fn get_history_candles(
        &self,
        symbol: &str,
        period: CandlePeriod,
        adjust: Adjust,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CandleBar>>;

    async fn get_candlesticks(
        &self,
        symbol: &str,
        period: CandlePeriod,
        count: usize,
    ) -> Result<Vec<CandleBar>>;

    async fn get_account(&self) -> Result<AccountState>;

    async fn submit_order(&self, request: SubmitOrderRequest) -> Result<OrderSubmitResult>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    async fn history_orders(&self, range: OrderHistoryRange) -> Result<Vec<OrderRecord>>;

    async fn today_orders(&self) -> Result<Vec<OrderRecord>>;

    async fn estimate_max_purchase_quantity(
        &self,
        symbol: &str,
        order_type: OrderType,
        side: Side,
        price: Decimal,
        currency: &str,
    ) -> Result<EstimateMaxPurchase>;

    /// Minimum tradeable increment for `symbol` (e.g. 1 for US, 100 for most
    /// HK board lots). Used to round sized quantities down before submit.
    async fn lot_size(&self, symbol: &str) -> Result<i64>;
}
