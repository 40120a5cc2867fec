//! Shared process wiring: one `AppContext` per account process, built
//! once at startup and handed to either the signal-generator or the
//! order-executor loop.

use std::sync::Arc;

use meridian_core::{Config, Error, Result};
use meridian_networking::{Broker, HttpBroker, Notifier, WebhookNotifier};
use meridian_persistence::{AccountCache, Database, SignalQueue, VixyKv};

/// Everything a service binary needs once config is resolved: broker
/// transport, relational store, signal queue, account cache, and the
/// notification sink. `broker`/`notifier` are `Arc<dyn _>` so both the
/// scan loop and the rotation loop can share one connection pool each
/// instead of opening their own.
pub struct AppContext {
    pub config: Config,
    pub broker: Arc<dyn Broker>,
    pub db: Database,
    pub queue: SignalQueue,
    pub cache: AccountCache,
    pub notifier: Arc<dyn Notifier>,
    pub vixy_kv: VixyKv,
}

impl AppContext {
    pub async fn build(config: Config) -> Result<Self> {
        let broker = Arc::new(HttpBroker::new(
            config.broker_base_url.clone(),
            config.broker_app_key.clone(),
            config.broker_app_secret.clone(),
            config.broker_access_token.clone(),
        ));

        let db = Database::connect(&config.database_dsn).await?;
        let queue = SignalQueue::connect(
            &config.redis_url,
            config.signal_queue_key.clone(),
            config.signal_queue_max_size,
            config.signal_max_retries,
        )
        .await?;
        let cache = AccountCache::default();
        let notifier: Arc<dyn Notifier> =
            Arc::new(WebhookNotifier::new(config.notification_webhook_url.clone(), config.slack_cooldown_seconds));

        let redis_client = redis::Client::open(config.redis_url.as_str()).map_err(|e| Error::QueueError(e.to_string()))?;
        let vixy_conn = redis::aio::ConnectionManager::new(redis_client)
            .await
            .map_err(|e| Error::QueueError(e.to_string()))?;
        let vixy_kv = VixyKv::new(vixy_conn);

        Ok(Self { config, broker, db, queue, cache, notifier, vixy_kv })
    }
}
