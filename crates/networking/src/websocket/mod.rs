//! Realtime quote push over an authenticated WebSocket channel, with a
//! reconnect loop, ping keepalive, and broadcast fan-out to subscribers.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use meridian_core::Error;
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::broker::Quote;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(3);
const PING_INTERVAL: Duration = Duration::from_secs(15);

enum Command {
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct PushMessage {
    #[serde(default)]
    quotes: Vec<Quote>,
}

/// A long-lived WebSocket connection to the broker's quote push channel.
///
/// Owns a background task that reconnects on disconnect; quotes fan out to
/// every subscriber of `subscribe_stream()`'s broadcast receiver (the main
/// scan loop and the realtime rotation handler both listen independently).
/// Must be `close()`d before drop — there's no GC to release the socket
/// for us.
pub struct WebSocketClient {
    quote_tx: broadcast::Sender<Quote>,
    commands: mpsc::UnboundedSender<Command>,
    handle: Option<JoinHandle<()>>,
    closed: bool,
}

impl WebSocketClient {
    pub fn spawn(url: impl Into<String>) -> Self {
        let url = url.into();
        let (quote_tx, _) = broadcast::channel(4096);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let task_tx = quote_tx.clone();
        let handle = tokio::spawn(run(url, task_tx, cmd_rx));

        Self { quote_tx, commands: cmd_tx, handle: Some(handle), closed: false }
    }

    pub fn subscribe_stream(&self) -> broadcast::Receiver<Quote> {
        self.quote_tx.subscribe()
    }

    pub fn subscribe(&self, symbols: Vec<String>) {
        let _ = self.commands.send(Command::Subscribe(symbols));
    }

    pub fn unsubscribe(&self, symbols: Vec<String>) {
        let _ = self.commands.send(Command::Unsubscribe(symbols));
    }

    /// Abort the background task and wait for it to exit.
    pub async fn close(&mut self) {
        self.closed = true;
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for WebSocketClient {
    fn drop(&mut self) {
        if !self.closed {
            warn!("WebSocketClient dropped without close(); connection left for the runtime to reap");
        }
    }
}

async fn run(url: String, quote_tx: broadcast::Sender<Quote>, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
    let mut pending_subs: Vec<String> = Vec::new();

    loop {
        match connect_and_listen(&url, &quote_tx, &mut cmd_rx, &mut pending_subs).await {
            Ok(()) => {
                info!("quote WS closed normally, command channel dropped");
                return;
            }
            Err(e) => warn!("quote WS error: {e}, reconnecting in {:?}", RECONNECT_DELAY),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn connect_and_listen(
    url: &str,
    quote_tx: &broadcast::Sender<Quote>,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    pending_subs: &mut Vec<String>,
) -> Result<(), Error> {
    let connected = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url))
        .await
        .map_err(|_| Error::TransientBrokerError("quote WS connect timeout".to_string()))?
        .map_err(|e| Error::TransientBrokerError(format!("quote WS connect error: {e}")))?;

    let (ws, _response) = connected;
    let (mut write, mut read) = ws.split();

    if !pending_subs.is_empty() {
        let msg = serde_json::json!({ "op": "subscribe", "symbols": pending_subs });
        write
            .send(Message::Text(msg.to_string()))
            .await
            .map_err(|e| Error::TransientBrokerError(e.to_string()))?;
    }

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Subscribe(symbols)) => {
                        let msg = serde_json::json!({ "op": "subscribe", "symbols": symbols });
                        write.send(Message::Text(msg.to_string())).await
                            .map_err(|e| Error::TransientBrokerError(e.to_string()))?;
                        pending_subs.extend(symbols);
                    }
                    Some(Command::Unsubscribe(symbols)) => {
                        let msg = serde_json::json!({ "op": "unsubscribe", "symbols": symbols });
                        write.send(Message::Text(msg.to_string())).await
                            .map_err(|e| Error::TransientBrokerError(e.to_string()))?;
                        pending_subs.retain(|s| !symbols.contains(s));
                    }
                    None => return Ok(()),
                }
            }
            _ = tokio::time::sleep(PING_INTERVAL) => {
                write.send(Message::Ping(Vec::new())).await
                    .map_err(|e| Error::TransientBrokerError(e.to_string()))?;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<PushMessage>(&text) {
                            Ok(push) => {
                                for quote in push.quotes {
                                    let _ = quote_tx.send(quote);
                                }
                            }
                            Err(e) => debug!("unparsable quote push payload: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(Error::TransientBrokerError("quote WS closed by peer".to_string()));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(Error::TransientBrokerError(e.to_string())),
                }
            }
        }
    }
}
