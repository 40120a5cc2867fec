//! Redis-backed Signal Queue. Three keyspaces per account —
//! `main`, `processing`, `failed` — implemented as sorted sets: `main`'s
//! score is `-priority` (ascending ZPOPMIN-style pop returns the highest
//! priority first); `processing`'s score is the unix timestamp the entry
//! was moved in (zombie-timeout detection); `failed`'s score is the unix
//! timestamp of failure.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use meridian_core::{Error, Result, Side, Signal, SignalType};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

pub mod vixy_kv;

pub use vixy_kv::{VixyKv, VixySnapshot};

const RETRY_BACKOFF_MINUTES: [i64; 5] = [1, 2, 4, 8, 8];

pub struct SignalQueue {
    conn: ConnectionManager,
    key_prefix: String,
    max_size: usize,
    max_retries: u32,
}

impl SignalQueue {
    pub async fn connect(redis_url: &str, key_prefix: impl Into<String>, max_size: usize, max_retries: u32) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| Error::QueueError(e.to_string()))?;
        let conn = ConnectionManager::new(client).await.map_err(|e| Error::QueueError(e.to_string()))?;
        Ok(Self { conn, key_prefix: key_prefix.into(), max_size, max_retries })
    }

    fn main_key(&self, account: &str) -> String {
        format!("{}:{account}", self.key_prefix)
    }

    fn processing_key(&self, account: &str) -> String {
        format!("{}:processing:{account}", self.key_prefix)
    }

    fn failed_key(&self, account: &str) -> String {
        format!("{}:failed:{account}", self.key_prefix)
    }

    fn parse(bytes: &str) -> Result<Signal> {
        serde_json::from_str(bytes).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Invariant 1: the zset member is the *original* serialized
    /// bytes, independent of `_original_json`, so re-serializing a consumed
    /// signal still matches what was published.
    pub async fn publish(&self, account: &str, signal: &Signal) -> Result<bool> {
        let mut conn = self.conn.clone();
        let main_key = self.main_key(account);

        let size: usize = conn.zcard(&main_key).await.map_err(|e| Error::QueueError(e.to_string()))?;
        if size >= self.max_size {
            warn!(account, size, "signal queue at capacity, rejecting publish");
            return Ok(false);
        }

        let bytes = signal.to_member_bytes().map_err(|e| Error::SerializationError(e.to_string()))?;
        let score = -(signal.priority as f64);
        let _: () = conn.zadd(&main_key, bytes, score).await.map_err(|e| Error::QueueError(e.to_string()))?;
        Ok(true)
    }

    /// Pops the highest-priority eligible (non-delayed) signal, moving it
    /// atomically-enough into `processing`: a signal is never in both at
    /// once — the window between ZREM and ZADD here is covered because the
    /// `processing` insert uses the same member bytes that were just
    /// removed, so a concurrent popper can't also remove them.
    pub async fn consume(&self, account: &str, zombie_timeout_secs: i64) -> Result<Option<Signal>> {
        self.recover_zombie_signals(account, zombie_timeout_secs).await?;

        let mut conn = self.conn.clone();
        let main_key = self.main_key(account);
        let now = Utc::now().timestamp();

        // Scan a bounded window of the highest-priority candidates; the
        // first whose retry_after has elapsed (or is unset) wins.
        let candidates: Vec<String> = conn
            .zrange(&main_key, 0, 49)
            .await
            .map_err(|e| Error::QueueError(e.to_string()))?;

        for bytes in candidates {
            let Ok(signal) = Self::parse(&bytes) else {
                warn!(account, "dropping unparsable signal queue member");
                let _: i64 = conn.zrem(&main_key, &bytes).await.unwrap_or(0);
                continue;
            };
            if let Some(retry_after) = signal.retry_after {
                if retry_after > now {
                    continue;
                }
            }

            let removed: i64 = conn.zrem(&main_key, &bytes).await.map_err(|e| Error::QueueError(e.to_string()))?;
            if removed == 0 {
                // another worker already popped it; try the next candidate
                continue;
            }

            let processing_key = self.processing_key(account);
            let _: () = conn
                .zadd(&processing_key, &bytes, now as f64)
                .await
                .map_err(|e| Error::QueueError(e.to_string()))?;

            let mut signal = signal;
            signal._original_json = Some(bytes);
            return Ok(Some(signal));
        }

        Ok(None)
    }

    pub async fn mark_completed(&self, account: &str, signal: &Signal) -> Result<()> {
        let Some(bytes) = &signal._original_json else {
            return Err(Error::QueueIntegrityError("mark_completed called without _original_json".to_string()));
        };
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .zrem(self.processing_key(account), bytes)
            .await
            .map_err(|e| Error::QueueError(e.to_string()))?;
        if removed == 0 {
            warn!(account, symbol = %signal.symbol, "mark_completed removed zero processing entries");
        }
        Ok(())
    }

    pub async fn mark_failed(&self, account: &str, signal: &Signal, err: &Error, retry: bool) -> Result<()> {
        let mut conn = self.conn.clone();
        if let Some(bytes) = &signal._original_json {
            let _: i64 = conn.zrem(self.processing_key(account), bytes).await.map_err(|e| Error::QueueError(e.to_string()))?;
        }

        let is_funds_permanent = matches!(err, Error::InsufficientFunds { .. }) && signal.retry_count >= self.max_retries;
        if retry && signal.retry_count < self.max_retries && !is_funds_permanent {
            let idx = (signal.retry_count as usize).min(RETRY_BACKOFF_MINUTES.len() - 1);
            let mut next = signal.clone();
            next.priority = (next.priority - 10).max(0);
            self.requeue_with_delay(account, &mut next, RETRY_BACKOFF_MINUTES[idx]).await?;
            return Ok(());
        }

        let mut failed = signal.clone();
        failed.failed_at = Some(Utc::now());
        failed._original_json = None;
        let bytes = failed.to_member_bytes().map_err(|e| Error::SerializationError(e.to_string()))?;
        let now = Utc::now().timestamp() as f64;
        let _: () = conn.zadd(self.failed_key(account), bytes, now).await.map_err(|e| Error::QueueError(e.to_string()))?;
        Ok(())
    }

    pub async fn requeue_with_delay(&self, account: &str, signal: &mut Signal, minutes: i64) -> Result<()> {
        signal.retry_after = Some(Utc::now().timestamp() + minutes * 60);
        signal.retry_count += 1;
        signal._original_json = None;
        self.publish(account, signal).await?;
        Ok(())
    }

    /// Same delayed-requeue mechanics as `requeue_with_delay`, but bumps
    /// `funds_retry_count` instead of `retry_count`: the insufficient-funds
    /// band (§4.3) doesn't count toward the normal transient-retry ladder,
    /// and vice versa.
    pub async fn requeue_funds_retry(&self, account: &str, signal: &mut Signal, minutes: i64) -> Result<()> {
        signal.retry_after = Some(Utc::now().timestamp() + minutes * 60);
        signal.funds_retry_count += 1;
        signal._original_json = None;
        self.publish(account, signal).await?;
        Ok(())
    }

    pub async fn has_pending(&self, account: &str, symbol: &str, signal_type: Option<SignalType>, exclude_delayed: bool) -> Result<bool> {
        let mut conn = self.conn.clone();
        let now = Utc::now().timestamp();

        for key in [self.main_key(account), self.processing_key(account)] {
            let members: Vec<String> = conn.zrange(&key, 0, -1).await.map_err(|e| Error::QueueError(e.to_string()))?;
            for bytes in members {
                let Ok(sig) = Self::parse(&bytes) else { continue };
                if sig.symbol != symbol {
                    continue;
                }
                if let Some(t) = signal_type {
                    if sig.signal_type != t {
                        continue;
                    }
                }
                if exclude_delayed {
                    if let Some(retry_after) = sig.retry_after {
                        if retry_after > now {
                            continue;
                        }
                    }
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Layer 2 of entry dedup: true if `main`/`processing`
    /// already holds any signal for `symbol` on the given `side`, used to
    /// detect an opposite-direction conflict (a pending SELL blocks a BUY
    /// emission and vice versa).
    pub async fn has_pending_side(&self, account: &str, symbol: &str, side: Side, exclude_delayed: bool) -> Result<bool> {
        let mut conn = self.conn.clone();
        let now = Utc::now().timestamp();

        for key in [self.main_key(account), self.processing_key(account)] {
            let members: Vec<String> = conn.zrange(&key, 0, -1).await.map_err(|e| Error::QueueError(e.to_string()))?;
            for bytes in members {
                let Ok(sig) = Self::parse(&bytes) else { continue };
                if sig.symbol != symbol || sig.side != side {
                    continue;
                }
                if exclude_delayed {
                    if let Some(retry_after) = sig.retry_after {
                        if retry_after > now {
                            continue;
                        }
                    }
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn get_pending_symbols(&self, account: &str) -> Result<HashSet<String>> {
        let mut conn = self.conn.clone();
        let mut out = HashSet::new();
        for key in [self.main_key(account), self.processing_key(account)] {
            let members: Vec<String> = conn.zrange(&key, 0, -1).await.map_err(|e| Error::QueueError(e.to_string()))?;
            for bytes in members {
                if let Ok(sig) = Self::parse(&bytes) {
                    out.insert(sig.symbol);
                }
            }
        }
        Ok(out)
    }

    async fn scan_signals(&self, key: &str) -> Result<Vec<Signal>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrange(key, 0, -1).await.map_err(|e| Error::QueueError(e.to_string()))?;
        Ok(members.iter().filter_map(|b| Self::parse(b).ok()).collect())
    }

    pub async fn get_delayed_signals(&self, account: &str, min_score: i32, max_age: Duration) -> Result<Vec<Signal>> {
        let now = Utc::now();
        let signals = self.scan_signals(&self.main_key(account)).await?;
        Ok(signals
            .into_iter()
            .filter(|s| s.retry_after.is_some() && s.score >= min_score)
            .filter(|s| now.signed_duration_since(s.queued_at).to_std().map(|d| d <= max_age).unwrap_or(false))
            .collect())
    }

    pub async fn get_failed_signals(&self, account: &str, min_score: i32, max_age: Duration) -> Result<Vec<Signal>> {
        let now = Utc::now();
        let signals = self.scan_signals(&self.failed_key(account)).await?;
        Ok(signals
            .into_iter()
            .filter(|s| s.score >= min_score)
            .filter(|s| {
                s.failed_at
                    .map(|f| now.signed_duration_since(f).to_std().map(|d| d <= max_age).unwrap_or(false))
                    .unwrap_or(false)
            })
            .collect())
    }

    /// Moves a failed signal back to `main`, clearing retry state. Matches
    /// on symbol + original `queued_at` since the failed copy's bytes don't
    /// equal the caller's in-memory copy once fields were cleared.
    pub async fn recover_failed(&self, account: &str, signal: &Signal) -> Result<bool> {
        let mut conn = self.conn.clone();
        let failed_key = self.failed_key(account);
        let members: Vec<String> = conn.zrange(&failed_key, 0, -1).await.map_err(|e| Error::QueueError(e.to_string()))?;

        for bytes in members {
            let Ok(found) = Self::parse(&bytes) else { continue };
            if found.symbol != signal.symbol || found.queued_at != signal.queued_at {
                continue;
            }
            let removed: i64 = conn.zrem(&failed_key, &bytes).await.map_err(|e| Error::QueueError(e.to_string()))?;
            if removed == 0 {
                continue;
            }
            let mut recovered = found;
            recovered.retry_after = None;
            recovered.retry_count = 0;
            recovered.funds_retry_count = 0;
            recovered.failed_at = None;
            self.publish(account, &recovered).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Strips `retry_after` from every delayed entry in `main`, making them
    /// immediately eligible. Called right after a successful sell, so a
    /// buy waiting on freed capital doesn't sit out its original delay.
    pub async fn wake_up_delayed(&self, account: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let main_key = self.main_key(account);
        let members: Vec<String> = conn.zrange(&main_key, 0, -1).await.map_err(|e| Error::QueueError(e.to_string()))?;

        let mut woken = 0i64;
        for bytes in members {
            let Ok(mut signal) = Self::parse(&bytes) else { continue };
            if signal.retry_after.is_none() {
                continue;
            }
            let removed: i64 = conn.zrem(&main_key, &bytes).await.map_err(|e| Error::QueueError(e.to_string()))?;
            if removed == 0 {
                continue;
            }
            signal.retry_after = None;
            signal._original_json = None;
            let new_bytes = signal.to_member_bytes().map_err(|e| Error::SerializationError(e.to_string()))?;
            let score = -(signal.priority as f64);
            let _: () = conn.zadd(&main_key, new_bytes, score).await.map_err(|e| Error::QueueError(e.to_string()))?;
            woken += 1;
        }
        Ok(woken)
    }

    pub async fn count_delayed(&self, account: &str) -> Result<i64> {
        let signals = self.scan_signals(&self.main_key(account)).await?;
        Ok(signals.iter().filter(|s| s.retry_after.is_some()).count() as i64)
    }

    /// Idempotent: once an entry is recovered (moved back to `main`), it is
    /// no longer present in `processing`, so a second call in the same
    /// window finds nothing to recover for it.
    pub async fn recover_zombie_signals(&self, account: &str, timeout_secs: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        let processing_key = self.processing_key(account);
        let now = Utc::now().timestamp();

        let stale: Vec<String> = if timeout_secs <= 0 {
            conn.zrange(&processing_key, 0, -1).await.map_err(|e| Error::QueueError(e.to_string()))?
        } else {
            conn.zrangebyscore(&processing_key, 0, now - timeout_secs)
                .await
                .map_err(|e| Error::QueueError(e.to_string()))?
        };

        let mut recovered = 0i64;
        let main_key = self.main_key(account);
        for bytes in stale {
            let removed: i64 = conn.zrem(&processing_key, &bytes).await.map_err(|e| Error::QueueError(e.to_string()))?;
            if removed == 0 {
                continue;
            }
            let Ok(signal) = Self::parse(&bytes) else { continue };
            let score = -(signal.priority as f64);
            let _: () = conn.zadd(&main_key, bytes, score).await.map_err(|e| Error::QueueError(e.to_string()))?;
            recovered += 1;
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario: retry_count already at max_retries.
    /// Expected: the backoff index clamps to the last entry instead of
    /// panicking on out-of-bounds.
    #[test]
    fn backoff_table_clamps_at_max_retries() {
        let idx = (10usize).min(RETRY_BACKOFF_MINUTES.len() - 1);
        assert_eq!(RETRY_BACKOFF_MINUTES[idx], 8);
    }
}
