//! `market:vixy:*` KV snapshot: lets components other than
//! the one subscribed to VIXY.US realtime ticks read the current panic
//! state without subscribing themselves. TTL 10 minutes.

use meridian_core::{Error, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const KEY: &str = "market:vixy:snapshot";
const TTL_SECONDS: u64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VixySnapshot {
    pub current_price: Decimal,
    pub ma200: Option<Decimal>,
    pub panic: bool,
}

pub struct VixyKv {
    conn: ConnectionManager,
}

impl VixyKv {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn write(&self, snapshot: &VixySnapshot) -> Result<()> {
        let mut conn = self.conn.clone();
        let bytes = serde_json::to_string(snapshot)?;
        conn.set_ex::<_, _, ()>(KEY, bytes, TTL_SECONDS).await.map_err(|e| Error::QueueError(e.to_string()))?;
        Ok(())
    }

    pub async fn read(&self) -> Result<Option<VixySnapshot>> {
        let mut conn = self.conn.clone();
        let bytes: Option<String> = conn.get(KEY).await.map_err(|e| Error::QueueError(e.to_string()))?;
        match bytes {
            Some(b) => Ok(Some(serde_json::from_str(&b)?)),
            None => Ok(None),
        }
    }
}
