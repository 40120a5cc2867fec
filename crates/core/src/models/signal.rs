//! Signal: the queue payload shared between SG and OE

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The fourteen signal variants SG may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    StrongBuy,
    Buy,
    WeakBuy,
    Sell,
    StopLoss,
    TakeProfit,
    SmartTakeProfit,
    EarlyTakeProfit,
    GradualExit,
    PartialExit,
    RotationSell,
    UrgentSell,
    AddPosition,
}

impl SignalType {
    /// BUY-family signals are blocked by the dedup-cohort's position/
    /// today's-orders layers; SELL-family signals are not.
    pub fn is_buy_family(&self) -> bool {
        matches!(
            self,
            SignalType::StrongBuy
                | SignalType::Buy
                | SignalType::WeakBuy
                | SignalType::AddPosition
        )
    }

    pub fn is_sell_family(&self) -> bool {
        !self.is_buy_family()
    }

    pub fn side(&self) -> Side {
        if self.is_buy_family() {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    /// Stable lowercase-snake name, used for strategy tagging and
    /// notification text rather than `{:?}`'s PascalCase Debug output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::StrongBuy => "strong_buy",
            SignalType::Buy => "buy",
            SignalType::WeakBuy => "weak_buy",
            SignalType::Sell => "sell",
            SignalType::StopLoss => "stop_loss",
            SignalType::TakeProfit => "take_profit",
            SignalType::SmartTakeProfit => "smart_take_profit",
            SignalType::EarlyTakeProfit => "early_take_profit",
            SignalType::GradualExit => "gradual_exit",
            SignalType::PartialExit => "partial_exit",
            SignalType::RotationSell => "rotation_sell",
            SignalType::UrgentSell => "urgent_sell",
            SignalType::AddPosition => "add_position",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// Indicator snapshot attached to a signal for auditability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: Option<Decimal>,
    pub macd: Option<Decimal>,
    pub macd_signal: Option<Decimal>,
    pub bb_upper: Option<Decimal>,
    pub bb_middle: Option<Decimal>,
    pub bb_lower: Option<Decimal>,
    pub sma_20: Option<Decimal>,
    pub sma_50: Option<Decimal>,
    pub atr: Option<Decimal>,
    pub volume_ratio: Option<Decimal>,
}

/// A queue payload. Serialized bytes of this struct (minus `_original_json`)
/// are the zset member identity in the Signal Queue — see
/// `meridian_persistence::queue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub side: Side,
    pub score: i32,
    pub priority: i32,
    pub price: Decimal,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    #[serde(default)]
    pub indicators: IndicatorSnapshot,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub queued_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_after: Option<i64>,
    #[serde(default)]
    pub retry_count: u32,
    /// Counts only the insufficient-funds retry band (§4.3 funds-retry
    /// loop), kept separate from `retry_count` so a signal that passes
    /// through both bands doesn't deplete either one's budget.
    #[serde(default)]
    pub funds_retry_count: u32,
    #[serde(default)]
    pub failed_at: Option<DateTime<Utc>>,
    pub account: String,

    /// Attached by `SignalQueue::consume` after pop. NEVER part of the
    /// zset member identity: marking complete must re-send these exact
    /// bytes, not a re-serialization of this struct.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub _original_json: Option<String>,
}

impl Signal {
    /// Serialize to the canonical queue-member bytes: `_original_json` is
    /// never included, so re-serializing a consumed signal never produces
    /// the bytes that were originally published.
    pub fn to_member_bytes(&self) -> serde_json::Result<String> {
        let mut clone = self.clone();
        clone._original_json = None;
        serde_json::to_string(&clone)
    }

    pub fn extra_indicators(&self) -> HashMap<String, Decimal> {
        let mut map = HashMap::new();
        if let Some(v) = self.indicators.rsi {
            map.insert("rsi".to_string(), v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_signal() -> Signal {
        Signal {
            symbol: "AAPL.US".to_string(),
            signal_type: SignalType::StrongBuy,
            side: Side::Buy,
            score: 65,
            priority: 65,
            price: dec!(150.00),
            quantity: None,
            stop_loss: None,
            take_profit: None,
            indicators: IndicatorSnapshot::default(),
            reasons: vec!["rsi oversold".to_string()],
            reason: None,
            timestamp: Utc::now(),
            queued_at: Utc::now(),
            retry_after: None,
            retry_count: 0,
            funds_retry_count: 0,
            failed_at: None,
            account: "acct-1".to_string(),
            _original_json: None,
        }
    }

    /// Scenario: a freshly published signal has no `_original_json`.
    /// Expected: to_member_bytes() is stable across repeated calls.
    #[test]
    fn member_bytes_stable_before_consume() {
        let signal = sample_signal();
        let a = signal.to_member_bytes().unwrap();
        let b = signal.to_member_bytes().unwrap();
        assert_eq!(a, b);
    }

    /// Scenario: a consumed signal carries `_original_json`.
    /// Expected: to_member_bytes() on the *consumed* struct still equals
    /// the bytes captured at consume time (identity independent of the
    /// post-consume field) — re-serializing must not silently diverge.
    #[test]
    fn member_bytes_unaffected_by_original_json_field() {
        let mut signal = sample_signal();
        let original = signal.to_member_bytes().unwrap();
        signal._original_json = Some(original.clone());
        let after_consume = signal.to_member_bytes().unwrap();
        assert_eq!(original, after_consume);
    }

    #[test]
    fn buy_family_classification() {
        assert!(SignalType::StrongBuy.is_buy_family());
        assert!(SignalType::AddPosition.is_buy_family());
        assert!(!SignalType::StopLoss.is_buy_family());
        assert!(SignalType::RotationSell.is_sell_family());
    }
}
