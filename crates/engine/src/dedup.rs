//! Four-layer entry dedup, checked in order:
//! 1. queue: `has_pending(symbol, same_type, exclude_delayed=true)`
//! 2. opposite-direction conflict (a pending SELL blocks a BUY and vice versa)
//! 3. position: BUY-family blocked if already held (ADD_POSITION bypasses)
//! 4. today's orders: BUY-family blocked if `traded_today` contains the symbol
//! 5. cooldown: 300s window per (symbol, emission)

use chrono::{DateTime, Utc};
use meridian_core::{Result, Side, SignalType};
use meridian_persistence::SignalQueue;

use crate::cohort::CohortTracker;

/// 300-second per-(symbol, emission) window.
pub const ENTRY_COOLDOWN_SECONDS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupBlock {
    QueuePending,
    OppositeDirection,
    AlreadyHeld,
    TradedToday,
    Cooldown,
}

impl DedupBlock {
    pub fn reason(&self) -> &'static str {
        match self {
            DedupBlock::QueuePending => "queue already has pending signal of this type",
            DedupBlock::OppositeDirection => "queue has an opposite-direction signal for this symbol",
            DedupBlock::AlreadyHeld => "symbol already in current positions",
            DedupBlock::TradedToday => "symbol already traded today",
            DedupBlock::Cooldown => "symbol emitted within the cooldown window",
        }
    }
}

/// Runs all four dedup layers for a would-be entry signal. Returns the
/// first layer that blocks, or `None` if the signal is clear to publish.
pub async fn check_entry_dedup(
    queue: &SignalQueue,
    account: &str,
    cohort: &CohortTracker,
    symbol: &str,
    signal_type: SignalType,
    now: DateTime<Utc>,
) -> Result<Option<DedupBlock>> {
    if queue.has_pending(account, symbol, Some(signal_type), true).await? {
        return Ok(Some(DedupBlock::QueuePending));
    }

    let opposite_side = match signal_type.side() {
        Side::Buy => Side::Sell,
        Side::Sell => Side::Buy,
    };
    if queue.has_pending_side(account, symbol, opposite_side, true).await? {
        return Ok(Some(DedupBlock::OppositeDirection));
    }

    if signal_type.is_buy_family() && signal_type != SignalType::AddPosition {
        if cohort.cohort.current_positions.contains(symbol) {
            return Ok(Some(DedupBlock::AlreadyHeld));
        }
        if cohort.cohort.traded_today.contains(symbol) {
            return Ok(Some(DedupBlock::TradedToday));
        }
    }

    if cohort.cohort.in_cooldown(symbol, now, chrono::Duration::seconds(ENTRY_COOLDOWN_SECONDS)) {
        return Ok(Some(DedupBlock::Cooldown));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strings_are_distinct() {
        let all = [
            DedupBlock::QueuePending,
            DedupBlock::OppositeDirection,
            DedupBlock::AlreadyHeld,
            DedupBlock::TradedToday,
            DedupBlock::Cooldown,
        ];
        let reasons: std::collections::HashSet<_> = all.iter().map(|b| b.reason()).collect();
        assert_eq!(reasons.len(), all.len());
    }
}
