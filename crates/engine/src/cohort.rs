//! `CohortTracker`: SG's owning wrapper around `meridian_core::DeduplicationCohort`,
//! adding the ADD_POSITION-specific bookkeeping that the shared cohort type
//! doesn't carry: ADD_POSITION bypasses the per-symbol daily cap but applies
//! its own 60-minute cooldown and a limit of 2 adds/day/symbol (see DESIGN.md).
//!
//! Owned by SG's main scan loop under a single-writer convention: only the
//! main loop mutates it on fixed intervals, realtime handlers only read.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use meridian_core::DeduplicationCohort;

#[derive(Debug, Clone, Default)]
pub struct CohortTracker {
    pub cohort: DeduplicationCohort,
    add_position_last: HashMap<String, DateTime<Utc>>,
    add_position_count_today: HashMap<String, u32>,
    day_marker: Option<NaiveDate>,
}

impl CohortTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the per-day ADD_POSITION counters at a local-date boundary.
    /// Idempotent within the same day — repeated calls with the same
    /// `today` are no-ops.
    pub fn roll_day_if_needed(&mut self, today: NaiveDate) {
        if self.day_marker != Some(today) {
            self.add_position_count_today.clear();
            self.day_marker = Some(today);
        }
    }

    pub fn record_add_position(&mut self, symbol: impl Into<String>, at: DateTime<Utc>) {
        let symbol = symbol.into();
        self.add_position_last.insert(symbol.clone(), at);
        *self.add_position_count_today.entry(symbol).or_insert(0) += 1;
    }

    /// Spec §4.5.4: "last add for symbol was ≥60 min ago", plus the Open
    /// Question resolution's 2-adds/day/symbol cap.
    pub fn add_position_eligible(&self, symbol: &str, now: DateTime<Utc>, cooldown_minutes: i64, max_per_day: u32) -> bool {
        let count = self.add_position_count_today.get(symbol).copied().unwrap_or(0);
        if count >= max_per_day {
            return false;
        }
        match self.add_position_last.get(symbol) {
            Some(last) => now.signed_duration_since(*last) >= chrono::Duration::minutes(cooldown_minutes),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario: two adds already recorded today, cap is 2.
    /// Expected: a third is rejected regardless of cooldown elapsed.
    #[test]
    fn day_cap_blocks_third_add() {
        let mut tracker = CohortTracker::new();
        let today = Utc::now().date_naive();
        tracker.roll_day_if_needed(today);
        tracker.record_add_position("AAPL.US", Utc::now() - chrono::Duration::hours(2));
        tracker.record_add_position("AAPL.US", Utc::now() - chrono::Duration::hours(1));
        assert!(!tracker.add_position_eligible("AAPL.US", Utc::now(), 60, 2));
    }

    /// Scenario: one add 30 minutes ago, cooldown is 60 minutes.
    /// Expected: blocked until the cooldown elapses.
    #[test]
    fn cooldown_blocks_recent_add() {
        let mut tracker = CohortTracker::new();
        tracker.record_add_position("700.HK", Utc::now() - chrono::Duration::minutes(30));
        assert!(!tracker.add_position_eligible("700.HK", Utc::now(), 60, 2));
    }

    /// Scenario: a new trading day rolls over.
    /// Expected: yesterday's count no longer blocks today's adds.
    #[test]
    fn day_roll_resets_counter() {
        let mut tracker = CohortTracker::new();
        let day1 = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        tracker.roll_day_if_needed(day1);
        tracker.record_add_position("AAPL.US", Utc::now() - chrono::Duration::hours(3));
        tracker.record_add_position("AAPL.US", Utc::now() - chrono::Duration::hours(2));
        tracker.roll_day_if_needed(day2);
        assert!(tracker.add_position_eligible("AAPL.US", Utc::now(), 60, 2));
    }
}
