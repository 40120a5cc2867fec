//! AccountState: in-memory cache of broker account snapshot

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrencyBalance {
    pub cash: Decimal,
    pub buy_power: Decimal,
    pub remaining_finance: Decimal,
    pub net_assets: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub quantity: i64,
    pub cost_price: Decimal,
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
}

impl PositionSnapshot {
    pub fn pnl_percent(&self) -> Decimal {
        if self.cost_price.is_zero() {
            return Decimal::ZERO;
        }
        let current_price = if self.quantity == 0 {
            self.cost_price
        } else {
            self.market_value / Decimal::from(self.quantity)
        };
        (current_price - self.cost_price) / self.cost_price
    }
}

/// Per-currency balances plus the position list, as returned by the
/// broker's `get_account` and cached by OE with a 30s TTL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountState {
    pub balances: HashMap<String, CurrencyBalance>,
    pub positions: Vec<PositionSnapshot>,
}

impl AccountState {
    pub fn position(&self, symbol: &str) -> Option<&PositionSnapshot> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    pub fn holds(&self, symbol: &str) -> bool {
        self.position(symbol).map(|p| p.quantity > 0).unwrap_or(false)
    }

    /// Target currency's available budget source: buy_power if positive,
    /// else cash if positive, else remaining_finance, else zero.
    pub fn available_budget(&self, currency: &str) -> Decimal {
        let Some(bal) = self.balances.get(currency) else {
            return Decimal::ZERO;
        };
        if bal.buy_power > Decimal::ZERO {
            bal.buy_power
        } else if bal.cash > Decimal::ZERO {
            bal.cash
        } else if bal.remaining_finance > Decimal::ZERO {
            bal.remaining_finance
        } else {
            Decimal::ZERO
        }
    }

    /// Cross-currency diagnostic: cash positive but buy_power
    /// negative implies margin debt drawn against another currency.
    pub fn cross_currency_margin_debt(&self, currency: &str) -> Option<Decimal> {
        let bal = self.balances.get(currency)?;
        if bal.cash > Decimal::ZERO && bal.buy_power < Decimal::ZERO {
            Some(bal.buy_power)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// Scenario: buy_power positive.
    /// Expected: budget source is buy_power, not cash.
    #[test]
    fn prefers_buy_power() {
        let mut state = AccountState::default();
        state.balances.insert(
            "USD".to_string(),
            CurrencyBalance { cash: dec!(100), buy_power: dec!(500), remaining_finance: dec!(0), net_assets: dec!(600) },
        );
        assert_eq!(state.available_budget("USD"), dec!(500));
    }

    /// Scenario: buy_power negative, cash positive, remaining_finance positive.
    /// Expected: falls back to cash, not remaining_finance.
    #[test]
    fn falls_back_to_cash() {
        let mut state = AccountState::default();
        state.balances.insert(
            "HKD".to_string(),
            CurrencyBalance { cash: dec!(200), buy_power: dec!(-50), remaining_finance: dec!(1000), net_assets: dec!(200) },
        );
        assert_eq!(state.available_budget("HKD"), dec!(200));
        assert_eq!(state.cross_currency_margin_debt("HKD"), Some(dec!(-50)));
    }

    /// Scenario: all three non-positive.
    /// Expected: budget is zero.
    #[test]
    fn zero_when_all_non_positive() {
        let mut state = AccountState::default();
        state.balances.insert(
            "USD".to_string(),
            CurrencyBalance { cash: dec!(0), buy_power: dec!(-10), remaining_finance: dec!(0), net_assets: dec!(0) },
        );
        assert_eq!(state.available_budget("USD"), Decimal::ZERO);
    }
}
