//! PositionStop: one active row per (account, symbol)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum PositionStatus {
    Active,
    HitStopLoss,
    HitTakeProfit,
    Closed,
}

impl PositionStatus {
    /// Transitions are monotonic: active → terminal, never reverse.
    pub fn can_transition_to(&self, next: PositionStatus) -> bool {
        match self {
            PositionStatus::Active => true,
            _ => *self == next,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PositionStop {
    pub account_id: String,
    pub symbol: String,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub atr: Decimal,
    pub strategy: String,
    pub status: PositionStatus,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    pub exit_reason: Option<String>,
}

impl PositionStop {
    /// Stop/target derived from ATR:
    /// stop_loss = price − 2.5·ATR, take_profit = price + 3.5·ATR.
    pub fn from_atr(
        account_id: impl Into<String>,
        symbol: impl Into<String>,
        entry_price: Decimal,
        atr: Decimal,
        strategy: impl Into<String>,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            symbol: symbol.into(),
            entry_price,
            stop_loss: entry_price - Decimal::new(25, 1) * atr,
            take_profit: entry_price + Decimal::new(35, 1) * atr,
            atr,
            strategy: strategy.into(),
            status: PositionStatus::Active,
            entry_time,
            exit_time: None,
            exit_price: None,
            exit_reason: None,
        }
    }

    pub fn close(
        &mut self,
        status: PositionStatus,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Result<(), crate::Error> {
        if !self.status.can_transition_to(status) {
            return Err(crate::Error::QueueIntegrityError(format!(
                "illegal PositionStop transition {:?} -> {:?}",
                self.status, status
            )));
        }
        self.status = status;
        self.exit_price = Some(exit_price);
        self.exit_time = Some(exit_time);
        self.exit_reason = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// Scenario: entry at $100, ATR = $2.
    /// Expected: stop_loss = 100 - 2.5*2 = 95, take_profit = 100 + 3.5*2 = 107.
    #[test]
    fn atr_derived_stops() {
        let ps = PositionStop::from_atr("acct", "AAPL.US", dec!(100), dec!(2), "entry", Utc::now());
        assert_eq!(ps.stop_loss, dec!(95));
        assert_eq!(ps.take_profit, dec!(107));
    }

    /// Scenario: position already closed.
    /// Expected: a further transition attempt is rejected (monotonicity).
    #[test]
    fn rejects_reverse_transition() {
        let mut ps = PositionStop::from_atr("acct", "AAPL.US", dec!(100), dec!(2), "entry", Utc::now());
        ps.close(PositionStatus::Closed, dec!(101), Utc::now(), "manual")
            .unwrap();
        let result = ps.close(PositionStatus::Active, dec!(101), Utc::now(), "oops");
        assert!(result.is_err());
    }
}
