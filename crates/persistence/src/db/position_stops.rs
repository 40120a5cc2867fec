//! PositionStop persistence: one active row per (account, symbol).

use chrono::{DateTime, Utc};
use meridian_core::{Error, PositionStatus, PositionStop, Result};
use sqlx::PgPool;

pub async fn insert_position_stop(pool: &PgPool, stop: &PositionStop) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO position_stops
            (account_id, symbol, entry_price, stop_loss, take_profit, atr, strategy, status, entry_time, exit_time, exit_price, exit_reason)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(&stop.account_id)
    .bind(&stop.symbol)
    .bind(stop.entry_price)
    .bind(stop.stop_loss)
    .bind(stop.take_profit)
    .bind(stop.atr)
    .bind(&stop.strategy)
    .bind(stop.status)
    .bind(stop.entry_time)
    .bind(stop.exit_time)
    .bind(stop.exit_price)
    .bind(&stop.exit_reason)
    .execute(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// The one active row for (account, symbol), enforced by the partial
/// unique index created in `Database::run_migrations`.
pub async fn get_active_position(pool: &PgPool, account_id: &str, symbol: &str) -> Result<Option<PositionStop>> {
    let row: Option<PositionStop> = sqlx::query_as(
        r#"
        SELECT account_id, symbol, entry_price, stop_loss, take_profit, atr, strategy, status, entry_time, exit_time, exit_price, exit_reason
        FROM position_stops
        WHERE account_id = $1 AND symbol = $2 AND status = 'active'
        "#,
    )
    .bind(account_id)
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row)
}

pub async fn list_active_positions(pool: &PgPool, account_id: &str) -> Result<Vec<PositionStop>> {
    let rows: Vec<PositionStop> = sqlx::query_as(
        r#"
        SELECT account_id, symbol, entry_price, stop_loss, take_profit, atr, strategy, status, entry_time, exit_time, exit_price, exit_reason
        FROM position_stops
        WHERE account_id = $1 AND status = 'active'
        "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(rows)
}

/// Mutate a single row's terminal status. Callers enforce the monotonic
/// transition rule in-process via `PositionStop::close` before persisting;
/// this write itself is unconditional (last writer wins).
pub async fn close_position(
    pool: &PgPool,
    account_id: &str,
    symbol: &str,
    status: PositionStatus,
    exit_price: rust_decimal::Decimal,
    exit_time: DateTime<Utc>,
    reason: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE position_stops
        SET status = $1, exit_price = $2, exit_time = $3, exit_reason = $4
        WHERE account_id = $5 AND symbol = $6 AND status = 'active'
        "#,
    )
    .bind(status)
    .bind(exit_price)
    .bind(exit_time)
    .bind(reason)
    .bind(account_id)
    .bind(symbol)
    .execute(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// 30-day closed-trade stats for Kelly sizing, at a given
/// scope: a single symbol, a market suffix (e.g. `.HK`), or global (`None`).
pub struct ClosedTradeStats {
    pub trade_count: i64,
    pub win_rate: rust_decimal::Decimal,
    pub avg_win: rust_decimal::Decimal,
    pub avg_loss: rust_decimal::Decimal,
}

pub async fn closed_trade_stats(pool: &PgPool, account_id: &str, symbol_like: Option<&str>, since: DateTime<Utc>) -> Result<ClosedTradeStats> {
    let pattern = symbol_like.unwrap_or("%");
    let row: (i64, Option<rust_decimal::Decimal>, Option<rust_decimal::Decimal>, Option<rust_decimal::Decimal>) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            AVG(CASE WHEN exit_price > entry_price THEN 1.0 ELSE 0.0 END),
            AVG(CASE WHEN exit_price > entry_price THEN (exit_price - entry_price) / entry_price ELSE NULL END),
            AVG(CASE WHEN exit_price <= entry_price THEN (entry_price - exit_price) / entry_price ELSE NULL END)
        FROM position_stops
        WHERE account_id = $1 AND symbol LIKE $2 AND status != 'active' AND exit_time >= $3
        "#,
    )
    .bind(account_id)
    .bind(pattern)
    .bind(since)
    .fetch_one(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(ClosedTradeStats {
        trade_count: row.0,
        win_rate: row.1.unwrap_or_default(),
        avg_win: row.2.unwrap_or_default(),
        avg_loss: row.3.unwrap_or_default(),
    })
}
