//! Market regime classifier: MA200 vote across the
//! active-window index symbols, cached for 10 minutes by the caller.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Bull,
    Bear,
    Range,
}

/// One index symbol's MA200 vote.
#[derive(Debug, Clone, Copy)]
pub struct IndexVote {
    /// True if the symbol is an "inverse" index (e.g. a VIX-family
    /// symbol) whose vote direction is flipped.
    pub inverse: bool,
    pub close: Decimal,
    pub ma200: Decimal,
}

impl IndexVote {
    /// A "positive" vote is close >= ma200 for a normal index, or
    /// close < ma200 for an inverse one.
    pub fn is_positive(&self) -> bool {
        let above = self.close >= self.ma200;
        if self.inverse {
            !above
        } else {
            above
        }
    }
}

const BULL_THRESHOLD: Decimal = Decimal::from_parts(60, 0, 0, false, 2); // 0.60
const BEAR_THRESHOLD: Decimal = Decimal::from_parts(40, 0, 0, false, 2); // 0.40

/// Classifies the regime from a set of index votes. Empty input (data
/// missing) classifies as RANGE
pub fn classify_regime(votes: &[IndexVote]) -> Regime {
    if votes.is_empty() {
        return Regime::Range;
    }
    let positive = votes.iter().filter(|v| v.is_positive()).count();
    let ratio = Decimal::from(positive) / Decimal::from(votes.len());
    if ratio >= BULL_THRESHOLD {
        Regime::Bull
    } else if ratio <= BEAR_THRESHOLD {
        Regime::Bear
    } else {
        Regime::Range
    }
}

/// Cached regime classification with a fixed TTL, refreshed explicitly
/// by the caller (SG's main scan loop) rather than on every read.
#[derive(Debug, Clone)]
pub struct CachedRegime {
    regime: Regime,
    computed_at: DateTime<Utc>,
    ttl: chrono::Duration,
}

impl CachedRegime {
    pub fn new(regime: Regime, computed_at: DateTime<Utc>, ttl_minutes: i64) -> Self {
        Self { regime, computed_at, ttl: chrono::Duration::minutes(ttl_minutes) }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.computed_at >= self.ttl
    }

    pub fn regime(&self) -> Regime {
        self.regime
    }
}

/// Selects which index symbols vote, given the account's active trading
/// window: HK-hours → HSI.HK only, US-hours → QQQ.US and
/// SPY.US, otherwise the union of both configured sets.
pub fn active_index_symbols<'a>(
    hk_active: bool,
    us_active: bool,
    hk_symbols: &'a [String],
    us_symbols: &'a [String],
) -> Vec<&'a str> {
    match (hk_active, us_active) {
        (true, false) => hk_symbols.iter().map(String::as_str).collect(),
        (false, true) => us_symbols.iter().map(String::as_str).collect(),
        _ => hk_symbols.iter().chain(us_symbols.iter()).map(String::as_str).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn vote(close: Decimal, ma200: Decimal) -> IndexVote {
        IndexVote { inverse: false, close, ma200 }
    }

    /// Scenario: all three index votes are above their MA200.
    /// Expected: BULL.
    #[test]
    fn all_positive_is_bull() {
        let votes = vec![vote(dec!(110), dec!(100)), vote(dec!(105), dec!(100)), vote(dec!(120), dec!(100))];
        assert_eq!(classify_regime(&votes), Regime::Bull);
    }

    /// Scenario: all three votes are below their MA200.
    /// Expected: BEAR.
    #[test]
    fn all_negative_is_bear() {
        let votes = vec![vote(dec!(90), dec!(100)), vote(dec!(95), dec!(100)), vote(dec!(80), dec!(100))];
        assert_eq!(classify_regime(&votes), Regime::Bear);
    }

    /// Scenario: split 1-of-2 vote.
    /// Expected: RANGE (ratio 0.5 is between thresholds).
    #[test]
    fn split_vote_is_range() {
        let votes = vec![vote(dec!(110), dec!(100)), vote(dec!(90), dec!(100))];
        assert_eq!(classify_regime(&votes), Regime::Range);
    }

    /// Scenario: no index data available.
    /// Expected: RANGE (fail-soft default).
    #[test]
    fn empty_votes_is_range() {
        assert_eq!(classify_regime(&[]), Regime::Range);
    }

    /// Scenario: an inverse-symbol vote (e.g. a VIX-family index) closes
    /// below its MA200.
    /// Expected: this counts as a positive vote (inverse flip).
    #[test]
    fn inverse_symbol_flips_vote() {
        let inverse_positive = IndexVote { inverse: true, close: dec!(90), ma200: dec!(100) };
        assert!(inverse_positive.is_positive());
    }

    /// Scenario: cached regime computed 11 minutes ago, TTL 10 minutes.
    /// Expected: is_stale reports true.
    #[test]
    fn cached_regime_expires_after_ttl() {
        let now = Utc::now();
        let cached = CachedRegime::new(Regime::Bull, now - chrono::Duration::minutes(11), 10);
        assert!(cached.is_stale(now));
    }
}
