//! Operator notifications, with a per-(reason, symbol) cooldown so a
//! flapping condition doesn't spam the webhook. The cooldown tracker's
//! TTL/eviction shape mirrors the persistence crate's in-process cache.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a notification unless `reason:symbol` is still within cooldown.
    /// Returns `true` if a notification was actually sent.
    async fn notify(&self, reason: &str, symbol: &str, severity: Severity, text: &str) -> bool;
}

/// Tracks the last-sent time per `reason:symbol` cooldown key. Evicted
/// lazily on insert and on periodic `gc()`.
struct CooldownTracker {
    last_sent: RwLock<HashMap<String, Instant>>,
    cooldown: Duration,
}

impl CooldownTracker {
    fn new(cooldown: Duration) -> Self {
        Self { last_sent: RwLock::new(HashMap::new()), cooldown }
    }

    fn key(reason: &str, symbol: &str) -> String {
        format!("{reason}:{symbol}")
    }

    /// True if `reason:symbol` is clear to fire, and marks it as sent.
    fn try_acquire(&self, reason: &str, symbol: &str) -> bool {
        let key = Self::key(reason, symbol);
        let now = Instant::now();
        let mut guard = match self.last_sent.write() {
            Ok(g) => g,
            Err(_) => return true,
        };
        if let Some(last) = guard.get(&key) {
            if now.duration_since(*last) < self.cooldown {
                return false;
            }
        }
        guard.insert(key, now);
        true
    }

    fn gc(&self, max_age: Duration) {
        if let Ok(mut guard) = self.last_sent.write() {
            let cutoff = Instant::now().checked_sub(max_age).unwrap_or_else(Instant::now);
            guard.retain(|_, ts| *ts >= cutoff);
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
    severity: Severity,
}

/// POSTs `{text, severity}` to a webhook URL. 429 responses (the sink's own
/// rate limit) are dropped silently rather than retried.
pub struct WebhookNotifier {
    http: Client,
    webhook_url: Option<String>,
    cooldown: CooldownTracker,
}

impl WebhookNotifier {
    pub fn new(webhook_url: Option<String>, cooldown_seconds: i64) -> Self {
        Self {
            http: Client::new(),
            webhook_url,
            cooldown: CooldownTracker::new(Duration::from_secs(cooldown_seconds.max(0) as u64)),
        }
    }

    /// Drop stale cooldown entries older than `max_age` (default 24h).
    pub fn gc(&self, max_age: Duration) {
        self.cooldown.gc(max_age);
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, reason: &str, symbol: &str, severity: Severity, text: &str) -> bool {
        if !self.cooldown.try_acquire(reason, symbol) {
            debug!(reason, symbol, "notification suppressed by cooldown");
            return false;
        }

        let Some(url) = &self.webhook_url else {
            debug!("no webhook configured, dropping notification: {text}");
            return false;
        };

        let payload = WebhookPayload { text, severity };
        match self.http.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().as_u16() == 429 => {
                debug!("webhook rate-limited, dropping notification silently");
                false
            }
            Ok(resp) if !resp.status().is_success() => {
                warn!(status = %resp.status(), "webhook notification failed");
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!("webhook request error: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario: two notifications for the same reason+symbol within the
    /// cooldown window. Expected: the second is suppressed.
    #[test]
    fn cooldown_suppresses_repeat_within_window() {
        let tracker = CooldownTracker::new(Duration::from_secs(3600));
        assert!(tracker.try_acquire("stop_loss", "AAPL.US"));
        assert!(!tracker.try_acquire("stop_loss", "AAPL.US"));
    }

    /// Scenario: different symbol, same reason. Expected: independent keys,
    /// not suppressed.
    #[test]
    fn cooldown_is_per_symbol() {
        let tracker = CooldownTracker::new(Duration::from_secs(3600));
        assert!(tracker.try_acquire("stop_loss", "AAPL.US"));
        assert!(tracker.try_acquire("stop_loss", "MSFT.US"));
    }
}
