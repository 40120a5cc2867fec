//! Postgres connection and schema migration. Connection hygiene: idle DB
//! connection lifetime 30s, max pool size 2.

use std::time::Duration;

use meridian_core::{Error, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .idle_timeout(Duration::from_secs(30))
            .connect(dsn)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Construct around an already-connected pool (tests, or a caller that
    /// manages its own pool options).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orderrecord (
                order_id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                price NUMERIC NOT NULL,
                quantity BIGINT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );

            CREATE INDEX IF NOT EXISTS idx_orderrecord_account_created
                ON orderrecord (account_id, created_at);

            CREATE TABLE IF NOT EXISTS position_stops (
                account_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                entry_price NUMERIC NOT NULL,
                stop_loss NUMERIC NOT NULL,
                take_profit NUMERIC NOT NULL,
                atr NUMERIC NOT NULL,
                strategy TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                entry_time TIMESTAMPTZ NOT NULL,
                exit_time TIMESTAMPTZ,
                exit_price NUMERIC,
                exit_reason TEXT,
                PRIMARY KEY (account_id, symbol, entry_time)
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_position_stops_one_active
                ON position_stops (account_id, symbol)
                WHERE status = 'active';

            CREATE TABLE IF NOT EXISTS kline_daily (
                symbol TEXT NOT NULL,
                date DATE NOT NULL,
                open NUMERIC NOT NULL,
                high NUMERIC NOT NULL,
                low NUMERIC NOT NULL,
                close NUMERIC NOT NULL,
                volume BIGINT NOT NULL,
                PRIMARY KEY (symbol, date)
            ) PARTITION BY RANGE (date);

            CREATE TABLE IF NOT EXISTS signal_history (
                id BIGSERIAL PRIMARY KEY,
                account_id TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                symbol TEXT NOT NULL,
                action TEXT NOT NULL,
                price NUMERIC NOT NULL,
                score INTEGER NOT NULL,
                confidence NUMERIC NOT NULL,
                indicators JSONB NOT NULL,
                strategy_name TEXT NOT NULL,
                execution_status TEXT NOT NULL DEFAULT 'pending',
                executed_at TIMESTAMPTZ,
                execution_price NUMERIC,
                execution_quantity BIGINT,
                order_id TEXT,
                execution_error TEXT,
                pnl NUMERIC,
                pnl_percent NUMERIC,
                market_trend TEXT,
                volatility NUMERIC,
                notes TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_signal_history_account_symbol
                ON signal_history (account_id, symbol, timestamp);

            CREATE TABLE IF NOT EXISTS trading_calendar (
                market TEXT NOT NULL,
                date DATE NOT NULL,
                is_open BOOLEAN NOT NULL,
                PRIMARY KEY (market, date)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        self.ensure_kline_partition(chrono::Utc::now().date_naive().format("%Y").to_string().parse().unwrap_or(2026)).await?;

        Ok(())
    }

    /// `kline_daily` is partitioned by year; create the partition
    /// for the given year if it doesn't exist yet. Called at startup for the
    /// current year and lazily by the kline loader when writing rows that
    /// land in a future year.
    pub async fn ensure_kline_partition(&self, year: i32) -> Result<()> {
        let partition = format!("kline_daily_y{year}");
        let start = format!("{year}-01-01");
        let end = format!("{}-01-01", year + 1);
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {partition} PARTITION OF kline_daily FOR VALUES FROM ('{start}') TO ('{end}')"
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
        Ok(())
    }
}
