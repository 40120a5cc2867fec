//! `KlineDbSource` backed by the partitioned `kline_daily` table, feeding
//! the hybrid DB+API kline loader.

use async_trait::async_trait;
use chrono::NaiveDate;
use meridian_core::{Error, KlineDaily, Result};
use meridian_indicators::{Kline, KlineDbSource};

use crate::db::connection::Database;

pub struct PgKlineStore<'a> {
    pub db: &'a Database,
}

impl<'a> PgKlineStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl<'a> KlineDbSource for PgKlineStore<'a> {
    async fn query_range(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Kline>> {
        let rows: Vec<KlineDaily> = sqlx::query_as(
            r#"
            SELECT symbol, date, open, high, low, close, volume
            FROM kline_daily
            WHERE symbol = $1 AND date >= $2 AND date <= $3
            ORDER BY date ASC
            "#,
        )
        .bind(symbol)
        .bind(from)
        .bind(to)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Kline::from).collect())
    }

    async fn store(&self, symbol: &str, klines: &[Kline]) -> Result<()> {
        for kline in klines {
            let year = kline.date.format("%Y").to_string().parse().unwrap_or(2026);
            self.db.ensure_kline_partition(year).await?;

            sqlx::query(
                r#"
                INSERT INTO kline_daily (symbol, date, open, high, low, close, volume)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (symbol, date) DO UPDATE SET
                    open = EXCLUDED.open, high = EXCLUDED.high, low = EXCLUDED.low,
                    close = EXCLUDED.close, volume = EXCLUDED.volume
                "#,
            )
            .bind(symbol)
            .bind(kline.date)
            .bind(kline.open)
            .bind(kline.high)
            .bind(kline.low)
            .bind(kline.close)
            .bind(kline.volume)
            .execute(self.db.pool())
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
        }
        Ok(())
    }

    async fn count(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<usize> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM kline_daily WHERE symbol = $1 AND date >= $2 AND date <= $3",
        )
        .bind(symbol)
        .bind(from)
        .bind(to)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        Ok(count.max(0) as usize)
    }
}
