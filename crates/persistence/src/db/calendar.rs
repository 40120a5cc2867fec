//! Trading-calendar lookups against the `trading_calendar` table. Session
//! windows are hardcoded defaults (Beijing local time); `trading_calendar`
//! rows override the weekday-is-open default for holidays and half-days.

use chrono::{NaiveDate, NaiveTime, Weekday};
use chrono_tz::Asia::Shanghai;
use meridian_core::{Error, Market, Result};
use sqlx::PgPool;

pub async fn is_trading_day(pool: &PgPool, market: Market, date: NaiveDate) -> Result<bool> {
    let row: Option<(bool,)> = sqlx::query_as(
        "SELECT is_open FROM trading_calendar WHERE market = $1 AND date = $2",
    )
    .bind(market.to_string())
    .bind(date)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(|(open,)| open).unwrap_or_else(|| !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)))
}

pub async fn set_trading_day(pool: &PgPool, market: Market, date: NaiveDate, is_open: bool) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO trading_calendar (market, date, is_open)
        VALUES ($1, $2, $3)
        ON CONFLICT (market, date) DO UPDATE SET is_open = EXCLUDED.is_open
        "#,
    )
    .bind(market.to_string())
    .bind(date)
    .bind(is_open)
    .execute(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Session windows are expressed in Beijing local time:
/// HK 09:30-12:00 & 13:00-15:00; US 21:30-04:00 (overnight, Beijing clock).
fn within_session_hours(market: Market, beijing_time: NaiveTime) -> bool {
    match market {
        Market::Hk => {
            let morning = NaiveTime::from_hms_opt(9, 30, 0).unwrap()..=NaiveTime::from_hms_opt(12, 0, 0).unwrap();
            let afternoon = NaiveTime::from_hms_opt(13, 0, 0).unwrap()..=NaiveTime::from_hms_opt(15, 0, 0).unwrap();
            morning.contains(&beijing_time) || afternoon.contains(&beijing_time)
        }
        Market::Us => {
            let evening_open = NaiveTime::from_hms_opt(21, 30, 0).unwrap();
            let morning_close = NaiveTime::from_hms_opt(4, 0, 0).unwrap();
            beijing_time >= evening_open || beijing_time <= morning_close
        }
    }
}

/// Combines the trading-day check (weekday default, calendar override) with
/// session-hour gating, both evaluated against `now_utc` converted to
/// Beijing local time.
pub async fn is_market_open(pool: &PgPool, market: Market, now_utc: chrono::DateTime<chrono::Utc>) -> Result<bool> {
    let beijing = now_utc.with_timezone(&Shanghai);
    let date = beijing.date_naive();
    if !is_trading_day(pool, market, date).await? {
        return Ok(false);
    }
    Ok(within_session_hours(market, beijing.time()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hk_morning_session_is_open() {
        assert!(within_session_hours(Market::Hk, NaiveTime::from_hms_opt(10, 0, 0).unwrap()));
        assert!(!within_session_hours(Market::Hk, NaiveTime::from_hms_opt(12, 30, 0).unwrap()));
    }

    #[test]
    fn us_overnight_session_wraps_midnight() {
        assert!(within_session_hours(Market::Us, NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
        assert!(within_session_hours(Market::Us, NaiveTime::from_hms_opt(1, 0, 0).unwrap()));
        assert!(!within_session_hours(Market::Us, NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }
}
