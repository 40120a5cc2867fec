//! Daily bar value type plus the hybrid DB+API loader.

use chrono::NaiveDate;
use meridian_core::{Error, KlineDaily, Result};
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Plain OHLCV bar the indicator set operates over. `KlineDaily` (the DB
/// row shape) converts into this losslessly; this type carries no DB
/// concerns (partitioning, row ids) so indicator code stays storage-agnostic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kline {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

impl From<&KlineDaily> for Kline {
    fn from(k: &KlineDaily) -> Self {
        Kline { date: k.date, open: k.open, high: k.high, low: k.low, close: k.close, volume: k.volume }
    }
}

impl From<KlineDaily> for Kline {
    fn from(k: KlineDaily) -> Self {
        Kline::from(&k)
    }
}

/// Minimum rows required before indicator scoring proceeds.
pub const MIN_KLINE_ROWS: usize = 30;

/// Source of historical daily bars already in the relational store.
#[async_trait::async_trait]
pub trait KlineDbSource: Send + Sync {
    async fn query_range(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Kline>>;
    async fn store(&self, symbol: &str, klines: &[Kline]) -> Result<()>;
    async fn count(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<usize>;
}

/// Source of live daily bars from the broker API.
#[async_trait::async_trait]
pub trait KlineApiSource: Send + Sync {
    async fn fetch_latest_days(&self, symbol: &str, days: i64) -> Result<Vec<Kline>>;
    async fn fetch_days(&self, symbol: &str, days: i64) -> Result<Vec<Kline>>;
}

/// Merge DB rows and API rows by date, API taking precedence on overlap
///. Pure function — idempotent and order-independent
/// invariant 8: `merge(merge(db, api), api) == merge(db, api)`.
pub fn merge_klines(db_rows: &[Kline], api_rows: &[Kline]) -> Vec<Kline> {
    use std::collections::BTreeMap;
    let mut by_date: BTreeMap<NaiveDate, Kline> = BTreeMap::new();
    for k in db_rows {
        by_date.insert(k.date, *k);
    }
    for k in api_rows {
        by_date.insert(k.date, *k);
    }
    by_date.into_values().collect()
}

/// Recognizes broker option-chain symbols (`^[A-Z]+\d{6}[CP]\d+\.(US|HK|SH|SZ)$`),
/// which the loader skips for synchronous 100-day syncs.
pub fn is_option_symbol(symbol: &str) -> bool {
    let code = symbol.rsplit_once('.').map(|(c, _)| c).unwrap_or(symbol);
    is_option_code(code)
}

fn is_option_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    if i == 0 || i + 6 >= bytes.len() {
        return false;
    }
    if !bytes[i..i + 6].iter().all(u8::is_ascii_digit) {
        return false;
    }
    let cp = bytes[i + 6];
    if cp != b'C' && cp != b'P' {
        return false;
    }
    bytes[i + 7..].iter().any(u8::is_ascii_digit)
}

/// Assembles the daily-bar history a symbol needs for indicator scoring,
///: DB history (~90 days, minus the last `api_latest_days`)
/// plus the last few days from the live API, merged with API precedence,
/// synchronously syncing 100 days from the API when the DB has too few
/// rows (skipped for option symbols).
pub struct HybridKlineLoader<'a> {
    pub db: Option<&'a dyn KlineDbSource>,
    pub api: &'a dyn KlineApiSource,
    pub history_days: i64,
    pub api_latest_days: i64,
}

impl<'a> HybridKlineLoader<'a> {
    pub async fn load(&self, symbol: &str, today: NaiveDate) -> Result<Option<Vec<Kline>>> {
        let Some(db) = self.db else {
            // USE_DB_KLINES disabled or DB unavailable: single 100-day API call.
            let rows = self.api.fetch_days(symbol, 100).await?;
            if rows.len() < MIN_KLINE_ROWS {
                return Ok(None);
            }
            return Ok(Some(rows));
        };

        let from = today - chrono::Duration::days(self.history_days);
        let to = today - chrono::Duration::days(3);
        let db_rows = db.query_range(symbol, from, to).await?;
        let api_rows = self.api.fetch_latest_days(symbol, self.api_latest_days).await?;
        let mut merged = merge_klines(&db_rows, &api_rows);

        if merged.len() < MIN_KLINE_ROWS && !is_option_symbol(symbol) {
            info!(symbol, rows = merged.len(), "kline history short, syncing 100 days from API");
            let synced = self.api.fetch_days(symbol, 100).await?;
            db.store(symbol, &synced).await?;
            let from = today - chrono::Duration::days(100);
            let db_rows = db.query_range(symbol, from, today).await?;
            merged = merge_klines(&db_rows, &api_rows);
        }

        if merged.len() < MIN_KLINE_ROWS {
            warn!(symbol, rows = merged.len(), "data shortage after sync, skipping symbol this iteration");
            return Err(Error::DataShortage { symbol: symbol.to_string(), rows: merged.len() });
        }

        Ok(Some(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn bar(day: u32, close: Decimal) -> Kline {
        Kline {
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000,
        }
    }

    /// Scenario: DB and API overlap on one date with different closes.
    /// Expected: API row wins.
    #[test]
    fn api_overrides_db_on_overlap() {
        let db = vec![bar(1, dec!(10)), bar(2, dec!(11))];
        let api = vec![bar(2, dec!(99)), bar(3, dec!(12))];
        let merged = merge_klines(&db, &api);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[1].close, dec!(99));
    }

    /// Scenario: merge is applied twice with the same API rows.
    /// Expected: idempotent — same result both times.
    #[test]
    fn merge_is_idempotent() {
        let db = vec![bar(1, dec!(10))];
        let api = vec![bar(2, dec!(20))];
        let once = merge_klines(&db, &api);
        let twice = merge_klines(&once, &api);
        assert_eq!(once, twice);
    }

    /// Scenario: merge order reversed (API first, then DB as second arg is
    /// not supported directly, but union order shouldn't matter for the
    /// resulting set since BTreeMap sorts by date regardless of insertion
    /// order).
    #[test]
    fn merge_is_order_independent_on_resulting_set() {
        let a = merge_klines(&[bar(1, dec!(1)), bar(3, dec!(3))], &[bar(2, dec!(2))]);
        let b = merge_klines(&[bar(3, dec!(3)), bar(1, dec!(1))], &[bar(2, dec!(2))]);
        assert_eq!(a, b);
    }

    #[test]
    fn recognizes_option_symbols() {
        assert!(is_option_symbol("AAPL250117C00150000.US"));
        assert!(!is_option_symbol("AAPL.US"));
    }
}
