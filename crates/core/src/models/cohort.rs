//! DeduplicationCohort: SG's in-memory dedup state, rebuilt via merge
//! semantics every scan — always union in new DB results rather than
//! replacing the whole structure on refresh.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct DeduplicationCohort {
    /// Symbols with a pending-or-filled order today (merged from DB).
    pub traded_today: HashSet<String>,
    /// Symbols currently held (merged from account snapshot).
    pub current_positions: HashSet<String>,
    /// Last emit timestamp per symbol, used for the 300s cooldown layer.
    pub signal_history: HashMap<String, DateTime<Utc>>,
}

impl DeduplicationCohort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union new DB/account data into the cohort without discarding
    /// in-memory additions made since the last refresh (e.g. a signal
    /// just published whose order hasn't hit the DB yet).
    pub fn merge_traded_today(&mut self, db_symbols: impl IntoIterator<Item = String>) {
        self.traded_today.extend(db_symbols);
    }

    pub fn merge_current_positions(&mut self, account_symbols: impl IntoIterator<Item = String>) {
        self.current_positions = account_symbols.into_iter().collect();
        // current_positions reflects ground truth from the broker snapshot
        // each refresh (unlike traded_today, there is no in-memory-only
        // addition to preserve: a position only exists once the buy fills,
        // at which point it is already in the snapshot).
    }

    pub fn record_emission(&mut self, symbol: impl Into<String>, at: DateTime<Utc>) {
        self.signal_history.insert(symbol.into(), at);
    }

    /// Prune emissions older than 1 hour, called every 10 scan iterations.
    pub fn prune_older_than(&mut self, now: DateTime<Utc>, max_age: chrono::Duration) {
        self.signal_history.retain(|_, ts| now - *ts <= max_age);
    }

    pub fn in_cooldown(&self, symbol: &str, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.signal_history
            .get(symbol)
            .map(|ts| now - *ts < window)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario: a signal was just published (in-memory) for AAPL.US;
    /// the DB refresh doesn't yet include it (lag).
    /// Expected: merge keeps the in-memory entry instead of discarding it.
    #[test]
    fn merge_preserves_in_memory_additions() {
        let mut cohort = DeduplicationCohort::new();
        cohort.traded_today.insert("AAPL.US".to_string());
        cohort.merge_traded_today(vec!["MSFT.US".to_string()]);
        assert!(cohort.traded_today.contains("AAPL.US"));
        assert!(cohort.traded_today.contains("MSFT.US"));
    }

    /// Scenario: symbol emitted 100 seconds ago, cooldown window is 300s.
    /// Expected: still in cooldown.
    #[test]
    fn cooldown_window() {
        let mut cohort = DeduplicationCohort::new();
        let now = Utc::now();
        cohort.record_emission("AAPL.US", now - chrono::Duration::seconds(100));
        assert!(cohort.in_cooldown("AAPL.US", now, chrono::Duration::seconds(300)));
        assert!(!cohort.in_cooldown("AAPL.US", now, chrono::Duration::seconds(50)));
    }
}
