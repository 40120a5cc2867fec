//! SignalHistory persistence: a row is written at signal emission and
//! updated again once execution completes.

use chrono::{DateTime, Utc};
use meridian_core::{Error, ExecutionStatus, Result, Signal};
use rust_decimal::Decimal;
use sqlx::PgPool;

pub async fn record_emission(pool: &PgPool, signal: &Signal, strategy_name: &str) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO signal_history
            (account_id, timestamp, symbol, action, price, score, confidence, indicators, strategy_name, execution_status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending')
        RETURNING id
        "#,
    )
    .bind(&signal.account)
    .bind(signal.timestamp)
    .bind(&signal.symbol)
    .bind(format!("{:?}", signal.signal_type))
    .bind(signal.price)
    .bind(signal.score)
    .bind(Decimal::ONE)
    .bind(serde_json::to_value(&signal.indicators).map_err(|e| Error::SerializationError(e.to_string()))?)
    .bind(strategy_name)
    .fetch_one(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(id)
}

/// Finds the still-pending row `record_emission` wrote for this exact
/// (account, symbol, timestamp) triple, so OE can attach its execution
/// update without the queue payload having to carry the row id itself.
pub async fn find_pending_id(pool: &PgPool, account_id: &str, symbol: &str, timestamp: DateTime<Utc>) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT id FROM signal_history
        WHERE account_id = $1 AND symbol = $2 AND timestamp = $3 AND execution_status = 'pending'
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(account_id)
    .bind(symbol)
    .bind(timestamp)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(|r| r.0))
}

#[allow(clippy::too_many_arguments)]
pub async fn record_execution(
    pool: &PgPool,
    id: i64,
    status: ExecutionStatus,
    executed_at: DateTime<Utc>,
    execution_price: Option<Decimal>,
    execution_quantity: Option<i64>,
    order_id: Option<&str>,
    execution_error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE signal_history
        SET execution_status = $1, executed_at = $2, execution_price = $3,
            execution_quantity = $4, order_id = $5, execution_error = $6
        WHERE id = $7
        "#,
    )
    .bind(status)
    .bind(executed_at)
    .bind(execution_price)
    .bind(execution_quantity)
    .bind(order_id)
    .bind(execution_error)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

pub async fn record_pnl(pool: &PgPool, id: i64, pnl: Decimal, pnl_percent: Decimal) -> Result<()> {
    sqlx::query("UPDATE signal_history SET pnl = $1, pnl_percent = $2 WHERE id = $3")
        .bind(pnl)
        .bind(pnl_percent)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}
