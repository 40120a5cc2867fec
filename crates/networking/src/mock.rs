//! In-memory `Broker` fixture for SG/OE unit and integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_core::{AccountState, Error, OrderRecord, OrderStatus, Result, Side};
use rust_decimal::Decimal;

use crate::broker::{
    Adjust, Broker, CandleBar, CandlePeriod, EstimateMaxPurchase, OrderHistoryRange, OrderType,
    OrderSubmitResult, Quote, SubmitOrderRequest,
};

pub struct MockBroker {
    pub account: Mutex<AccountState>,
    pub quotes: Mutex<HashMap<String, Quote>>,
    pub candles: Mutex<HashMap<String, Vec<CandleBar>>>,
    pub lot_sizes: Mutex<HashMap<String, i64>>,
    pub orders: Mutex<Vec<OrderRecord>>,
    pub next_order_id: AtomicI64,
    pub fail_next_submit: Mutex<Option<Error>>,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self {
            account: Mutex::new(AccountState::default()),
            quotes: Mutex::new(HashMap::new()),
            candles: Mutex::new(HashMap::new()),
            lot_sizes: Mutex::new(HashMap::new()),
            orders: Mutex::new(Vec::new()),
            next_order_id: AtomicI64::new(1),
            fail_next_submit: Mutex::new(None),
        }
    }
}

impl MockBroker {
    pub fn with_quote(self, symbol: &str, price: Decimal) -> Self {
        self.quotes.lock().unwrap().insert(
            symbol.to_string(),
            Quote { symbol: symbol.to_string(), last_price: price, volume: 0, timestamp: Utc::now() },
        );
        self
    }

    pub fn with_lot_size(self, symbol: &str, lot: i64) -> Self {
        self.lot_sizes.lock().unwrap().insert(symbol.to_string(), lot);
        self
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn subscribe_quotes(&self, _symbols: &[String]) -> Result<()> {
        Ok(())
    }

    async fn unsubscribe_quotes(&self, _symbols: &[String]) -> Result<()> {
        Ok(())
    }

    async fn get_realtime_quote(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        let quotes = self.quotes.lock().unwrap();
        Ok(symbols.iter().filter_map(|s| quotes.get(s).cloned()).collect())
    }

    async fn get_history_candles(
        &self,
        symbol: &str,
        _period: CandlePeriod,
        _adjust: Adjust,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<CandleBar>> {
        Ok(self.candles.lock().unwrap().get(symbol).cloned().unwrap_or_default())
    }

    async fn get_candlesticks(&self, symbol: &str, _period: CandlePeriod, count: usize) -> Result<Vec<CandleBar>> {
        let all = self.candles.lock().unwrap().get(symbol).cloned().unwrap_or_default();
        Ok(all.into_iter().rev().take(count).rev().collect())
    }

    async fn get_account(&self) -> Result<AccountState> {
        Ok(self.account.lock().unwrap().clone())
    }

    async fn submit_order(&self, request: SubmitOrderRequest) -> Result<OrderSubmitResult> {
        if let Some(err) = self.fail_next_submit.lock().unwrap().take() {
            return Err(err);
        }
        let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst).to_string();
        let record = OrderRecord {
            order_id: order_id.clone(),
            account_id: "mock".to_string(),
            symbol: request.symbol,
            side: request.side,
            price: request.price,
            quantity: request.quantity,
            status: OrderStatus::Filled,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.orders.lock().unwrap().push(record.clone());
        Ok(OrderSubmitResult { order_id, status: record.status })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.iter_mut().find(|o| o.order_id == order_id) {
            order.status = OrderStatus::Canceled;
            Ok(())
        } else {
            Err(Error::ApiError(format!("unknown order {order_id}")))
        }
    }

    async fn history_orders(&self, _range: OrderHistoryRange) -> Result<Vec<OrderRecord>> {
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn today_orders(&self) -> Result<Vec<OrderRecord>> {
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn estimate_max_purchase_quantity(
        &self,
        symbol: &str,
        _order_type: OrderType,
        _side: Side,
        price: Decimal,
        currency: &str,
    ) -> Result<EstimateMaxPurchase> {
        let account = self.account.lock().unwrap();
        let budget = account.available_budget(currency);
        if price <= Decimal::ZERO {
            return Ok(EstimateMaxPurchase { margin_max_qty: 0, cash_max_qty: 0 });
        }
        let lot = self.lot_sizes.lock().unwrap().get(symbol).copied().unwrap_or(1);
        let raw_qty = (budget / price).trunc().to_string().parse::<i64>().unwrap_or(0);
        let qty = (raw_qty / lot.max(1)) * lot.max(1);
        Ok(EstimateMaxPurchase { margin_max_qty: qty, cash_max_qty: qty })
    }

    async fn lot_size(&self, symbol: &str) -> Result<i64> {
        Ok(self.lot_sizes.lock().unwrap().get(symbol).copied().unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn submit_order_records_fill() {
        let broker = MockBroker::default();
        let result = broker
            .submit_order(SubmitOrderRequest::limit_day("AAPL.US", Side::Buy, 10, dec!(150)))
            .await
            .unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(broker.orders.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancel_unknown_order_errors() {
        let broker = MockBroker::default();
        let result = broker.cancel_order("nope").await;
        assert!(result.is_err());
    }
}
