//! SignalHistory: append-only audit trail

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Executed,
    Rejected,
    Expired,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SignalHistory {
    pub id: i64,
    pub account_id: String,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: String,
    pub price: Decimal,
    pub score: i32,
    pub confidence: Decimal,
    pub indicators: serde_json::Value,
    pub strategy_name: String,
    pub execution_status: ExecutionStatus,
    pub executed_at: Option<DateTime<Utc>>,
    pub execution_price: Option<Decimal>,
    pub execution_quantity: Option<i64>,
    pub order_id: Option<String>,
    pub execution_error: Option<String>,
    pub pnl: Option<Decimal>,
    pub pnl_percent: Option<Decimal>,
    pub market_trend: Option<String>,
    pub volatility: Option<Decimal>,
    pub notes: Option<String>,
}
