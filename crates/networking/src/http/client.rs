//! HTTP broker client, authenticated with app key/secret + bearer access
//! token (`BROKER_APP_KEY`, `BROKER_APP_SECRET`, `BROKER_ACCESS_TOKEN`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_core::{AccountState, Error, OrderRecord, Result, Side};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, Response,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::broker::{
    Adjust, Broker, CandleBar, CandlePeriod, EstimateMaxPurchase, OrderHistoryRange, OrderType,
    OrderSubmitResult, Quote, SubmitOrderRequest,
};

/// REST client for the brokerage gateway. One instance is shared (behind
/// `Arc<dyn Broker>`) across a process's cooperative tasks.
pub struct HttpBroker {
    http: Client,
    base_url: String,
    app_key: String,
    app_secret: String,
}

impl HttpBroker {
    pub fn new(base_url: impl Into<String>, app_key: impl Into<String>, app_secret: impl Into<String>, access_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        let http = Client::builder()
            .default_headers(Self::base_headers(&access_token))
            .build()
            .expect("failed to build broker HTTP client");

        Self {
            http,
            base_url: base_url.into(),
            app_key: app_key.into(),
            app_secret: app_secret.into(),
        }
    }

    fn base_headers(access_token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {access_token}")).expect("invalid access token"),
        );
        headers
    }

    fn request_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-App-Key", HeaderValue::from_str(&self.app_key).unwrap_or_else(|_| HeaderValue::from_static("")));
        headers.insert("X-App-Secret", HeaderValue::from_str(&self.app_secret).unwrap_or_else(|_| HeaderValue::from_static("")));
        headers
    }

    /// Classify a non-2xx response into the error taxonomy before the body
    /// is consumed. 5xx and 429 are handled here because
    /// `Error::From<reqwest::Error>` only sees transport-level failures
    /// (timeouts, connect errors), not HTTP status codes.
    fn classify_status(response: &Response) -> Option<Error> {
        match response.status().as_u16() {
            429 => Some(Error::RateLimitError("broker rate limit".to_string())),
            500..=599 => Some(Error::TransientBrokerError(format!("broker returned {}", response.status()))),
            404 => Some(Error::InvalidSymbol("symbol not found or not entitled".to_string())),
            _ => None,
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .headers(self.request_headers())
            .query(query)
            .send()
            .await?;

        if let Some(err) = Self::classify_status(&response) {
            warn!(%url, "broker GET failed: {err}");
            return Err(err);
        }

        let response = response.error_for_status()?;
        response.json::<T>().await.map_err(|e| Error::SerializationError(e.to_string()))
    }

    async fn post<B: serde::Serialize, T: for<'de> Deserialize<'de>>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .headers(self.request_headers())
            .json(body)
            .send()
            .await?;

        if let Some(err) = Self::classify_status(&response) {
            warn!(%url, "broker POST failed: {err}");
            return Err(err);
        }

        let response = response.error_for_status()?;
        response.json::<T>().await.map_err(|e| Error::SerializationError(e.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.delete(&url).headers(self.request_headers()).send().await?;

        if let Some(err) = Self::classify_status(&response) {
            return Err(err);
        }
        response.error_for_status()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct LotSizeResponse {
    lot_size: i64,
}

#[async_trait]
impl Broker for HttpBroker {
    #[instrument(skip(self))]
    async fn subscribe_quotes(&self, symbols: &[String]) -> Result<()> {
        debug!(count = symbols.len(), "subscribing quotes");
        self.post("/quotes/subscribe", &serde_json::json!({ "symbols": symbols })).await
    }

    #[instrument(skip(self))]
    async fn unsubscribe_quotes(&self, symbols: &[String]) -> Result<()> {
        self.post("/quotes/unsubscribe", &serde_json::json!({ "symbols": symbols })).await
    }

    #[instrument(skip(self))]
    async fn get_realtime_quote(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        self.get("/quotes/realtime", &[("symbols", symbols.join(","))]).await
    }

    #[instrument(skip(self))]
    async fn get_history_candles(
        &self,
        symbol: &str,
        period: CandlePeriod,
        adjust: Adjust,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CandleBar>> {
        self.get(
            "/candles/history",
            &[
                ("symbol", symbol.to_string()),
                ("period", format!("{period:?}")),
                ("adjust", format!("{adjust:?}")),
                ("start", start.to_rfc3339()),
                ("end", end.to_rfc3339()),
            ],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_candlesticks(&self, symbol: &str, period: CandlePeriod, count: usize) -> Result<Vec<CandleBar>> {
        self.get(
            "/candles/recent",
            &[("symbol", symbol.to_string()), ("period", format!("{period:?}")), ("count", count.to_string())],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_account(&self) -> Result<AccountState> {
        self.get("/account", &[]).await
    }

    #[instrument(skip(self))]
    async fn submit_order(&self, request: SubmitOrderRequest) -> Result<OrderSubmitResult> {
        debug!(symbol = %request.symbol, qty = request.quantity, price = %request.price, "submitting order");
        let side = match request.side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        let order_type = match request.order_type {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
        };
        self.post(
            "/orders",
            &serde_json::json!({
                "symbol": request.symbol,
                "side": side,
                "quantity": request.quantity,
                "price": request.price,
                "order_type": order_type,
                "tif": "DAY",
            }),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.delete(&format!("/orders/{order_id}")).await
    }

    #[instrument(skip(self))]
    async fn history_orders(&self, range: OrderHistoryRange) -> Result<Vec<OrderRecord>> {
        self.get(
            "/orders/history",
            &[("start", range.start.to_rfc3339()), ("end", range.end.to_rfc3339())],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn today_orders(&self) -> Result<Vec<OrderRecord>> {
        self.get("/orders/today", &[]).await
    }

    #[instrument(skip(self))]
    async fn estimate_max_purchase_quantity(
        &self,
        symbol: &str,
        order_type: OrderType,
        side: Side,
        price: Decimal,
        currency: &str,
    ) -> Result<EstimateMaxPurchase> {
        let order_type = match order_type {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
        };
        let side = match side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        self.get(
            "/orders/estimate-max-qty",
            &[
                ("symbol", symbol.to_string()),
                ("order_type", order_type.to_string()),
                ("side", side.to_string()),
                ("price", price.to_string()),
                ("currency", currency.to_string()),
            ],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn lot_size(&self, symbol: &str) -> Result<i64> {
        let resp: LotSizeResponse = self.get(&format!("/instruments/{symbol}/lot-size"), &[]).await?;
        Ok(resp.lot_size)
    }
}
