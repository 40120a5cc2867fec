//! OrderRecord persistence.

use chrono::{DateTime, NaiveDate, Utc};
use meridian_core::{Error, OrderRecord, OrderStatus, Result};
use sqlx::PgPool;

pub async fn insert_order(pool: &PgPool, order: &OrderRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO orderrecord (order_id, account_id, symbol, side, price, quantity, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (order_id) DO UPDATE SET status = EXCLUDED.status, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.account_id)
    .bind(&order.symbol)
    .bind(order.side)
    .bind(order.price)
    .bind(order.quantity)
    .bind(order.status)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

pub async fn update_order_status(pool: &PgPool, order_id: &str, status: OrderStatus) -> Result<()> {
    sqlx::query("UPDATE orderrecord SET status = $1, updated_at = now() WHERE order_id = $2")
        .bind(status)
        .bind(order_id)
        .execute(pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;
    Ok(())
}

/// "Today's trades": `created_at` on the current local trading
/// date and status in {Filled, PartialFilled, New, WaitToNew}.
pub async fn today_orders(pool: &PgPool, account_id: &str, local_date: NaiveDate) -> Result<Vec<OrderRecord>> {
    let start = local_date.and_hms_opt(0, 0, 0).unwrap().and_utc();
    let end = start + chrono::Duration::days(1);

    let orders: Vec<OrderRecord> = sqlx::query_as(
        r#"
        SELECT order_id, account_id, symbol, side, price, quantity, status, created_at, updated_at
        FROM orderrecord
        WHERE account_id = $1 AND created_at >= $2 AND created_at < $3
          AND status IN ('Filled', 'PartialFilled', 'New', 'WaitToNew')
        "#,
    )
    .bind(account_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(orders)
}

pub async fn history_orders(
    pool: &PgPool,
    account_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<OrderRecord>> {
    let orders: Vec<OrderRecord> = sqlx::query_as(
        r#"
        SELECT order_id, account_id, symbol, side, price, quantity, status, created_at, updated_at
        FROM orderrecord
        WHERE account_id = $1 AND created_at >= $2 AND created_at < $3
        ORDER BY created_at DESC
        "#,
    )
    .bind(account_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(orders)
}
