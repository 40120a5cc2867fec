//! VIXY panic circuit breaker: a VIXY.US realtime tick above
//! the threshold gates all BUY-family entry signals until it recovers.

use async_trait::async_trait;
use meridian_core::Result;
use meridian_networking::notify::{Notifier, Severity};
use meridian_persistence::{VixyKv, VixySnapshot};
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Abstracts the `market:vixy:*` KV write so `PanicMonitor` is testable
/// without a live Redis connection.
#[async_trait]
pub trait VixyStore: Send + Sync {
    async fn write(&self, snapshot: &VixySnapshot) -> Result<()>;
}

#[async_trait]
impl VixyStore for VixyKv {
    async fn write(&self, snapshot: &VixySnapshot) -> Result<()> {
        VixyKv::write(self, snapshot).await
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct State {
    current_price: Decimal,
    ma200: Option<Decimal>,
    panic: bool,
}

/// Owned by SG's realtime push handler: realtime handlers may read and
/// update this shared state, while only the main loop mutates the dedup
/// cohort on fixed intervals — this is a separate piece of state the
/// realtime task owns outright.
pub struct PanicMonitor {
    threshold: Decimal,
    state: State,
}

impl PanicMonitor {
    pub fn new(threshold: Decimal) -> Self {
        Self { threshold, state: State::default() }
    }

    pub fn is_panicking(&self) -> bool {
        self.state.panic
    }

    /// Processes one VIXY.US tick. Persists the KV snapshot and fires a
    /// (cooldown-gated) notification on a panic-state transition.
    pub async fn on_tick(
        &mut self,
        current_price: Decimal,
        ma200: Option<Decimal>,
        kv: &dyn VixyStore,
        notifier: &dyn Notifier,
    ) {
        self.state.current_price = current_price;
        if ma200.is_some() {
            self.state.ma200 = ma200;
        }

        let was_panicking = self.state.panic;
        if current_price > self.threshold && !was_panicking {
            self.state.panic = true;
            warn!(%current_price, threshold = %self.threshold, "vixy panic threshold crossed");
            notifier
                .notify(
                    "vixy_panic",
                    "VIXY.US",
                    Severity::Critical,
                    &format!("VIXY.US at {current_price} crossed panic threshold {}; BUY-family signals gated", self.threshold),
                )
                .await;
        } else if current_price <= self.threshold && was_panicking {
            self.state.panic = false;
            info!(%current_price, "vixy panic cleared");
        }

        let snapshot = VixySnapshot { current_price: self.state.current_price, ma200: self.state.ma200, panic: self.state.panic };
        if let Err(err) = kv.write(&snapshot).await {
            warn!(%err, "failed to persist vixy kv snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingNotifier(AtomicUsize);

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, _reason: &str, _symbol: &str, _severity: Severity, _text: &str) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    struct RecordingKv(Mutex<Vec<VixySnapshot>>);

    #[async_trait]
    impl VixyStore for RecordingKv {
        async fn write(&self, snapshot: &VixySnapshot) -> Result<()> {
            self.0.lock().unwrap().push(snapshot.clone());
            Ok(())
        }
    }

    /// Scenario: price crosses above threshold, then a second above-
    /// threshold tick arrives, then it recovers.
    /// Expected: panic flips true on the first crossing and notifies
    /// once; the second tick while still panicking does not notify
    /// again; recovery flips panic back to false.
    #[tokio::test]
    async fn crossing_threshold_sets_panic_and_notifies_once() {
        let mut monitor = PanicMonitor::new(dec!(30.0));
        let notifier = CountingNotifier(AtomicUsize::new(0));
        let kv = RecordingKv(Mutex::new(Vec::new()));

        monitor.on_tick(dec!(31.0), None, &kv, &notifier).await;
        assert!(monitor.is_panicking());
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);

        monitor.on_tick(dec!(32.0), None, &kv, &notifier).await;
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1, "no repeat notification while still panicking");

        monitor.on_tick(dec!(29.0), None, &kv, &notifier).await;
        assert!(!monitor.is_panicking());

        assert_eq!(kv.0.lock().unwrap().len(), 3);
    }
}
