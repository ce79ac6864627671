//! Single WebSocket connection with auto-reconnect and ping keep-alive.
//!
//! Each `WsConnection` runs as a tokio task that:
//! 1. Connects to the endpoint.
//! 2. Replays the current subscription set (asked from a callback, so
//!    subscriptions added while connected survive a reconnect).
//! 3. Reads text messages and forwards them to a callback.
//! 4. Sends periodic ping messages.
//! 5. Automatically reconnects on disconnection with exponential backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Callback invoked for each received text message.
///
/// Parameters: `(connection_id, message_text)`
pub type OnMessageCallback = Arc<dyn Fn(usize, &str) + Send + Sync>;

/// Callback producing the messages to send right after every (re)connect.
pub type ResubscribeCallback = Arc<dyn Fn() -> Vec<String> + Send + Sync>;

/// Ping payload format.
#[derive(Debug, Clone)]
pub enum PingPayload {
    /// Send a text frame (e.g. `"ping"`).
    Text(String),
    /// Use the standard WebSocket ping frame.
    WebSocketPing,
}

/// Configuration for a single WebSocket connection.
#[derive(Clone)]
pub struct WsConnConfig {
    /// Full WebSocket URL (e.g. `ws://127.0.0.1:6671/ws`).
    pub url: String,
    /// Messages to send after every successful connect.
    pub resubscribe: Option<ResubscribeCallback>,
    /// Extra HTTP headers for the handshake.
    pub extra_headers: HashMap<String, String>,
    /// Interval between ping messages.
    pub ping_interval: Option<Duration>,
    /// Ping message format.
    pub ping_payload: Option<PingPayload>,
    /// Connection identifier (used in log lines).
    pub id: usize,
}

impl std::fmt::Debug for WsConnConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnConfig")
            .field("url", &self.url)
            .field("resubscribe", &self.resubscribe.is_some())
            .field("ping_interval", &self.ping_interval)
            .field("id", &self.id)
            .finish()
    }
}

/// A single WebSocket connection managed by a background tokio task.
pub struct WsConnection {
    /// Connection configuration.
    pub config: WsConnConfig,
    /// Channel to send outbound messages.
    outbound_tx: Option<mpsc::Sender<String>>,
    /// Shutdown signal sender.
    shutdown_tx: Option<watch::Sender<bool>>,
    /// Task join handle.
    task: Option<tokio::task::JoinHandle<()>>,
}

impl WsConnection {
    /// Create a new (not yet started) connection.
    pub fn new(config: WsConnConfig) -> Self {
        Self {
            config,
            outbound_tx: None,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Start the connection task. Text frames are forwarded to `on_text`.
    pub fn start(&mut self, on_text: OnMessageCallback) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(256);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            connection_loop(config, on_text, outbound_rx, shutdown_rx).await;
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.outbound_tx = Some(outbound_tx);
        self.task = Some(task);
    }

    /// A cloneable handle for sending text messages on this connection.
    pub fn sender(&self) -> Option<mpsc::Sender<String>> {
        self.outbound_tx.clone()
    }

    /// Send a text message on this connection.
    pub async fn send(&self, msg: String) -> anyhow::Result<()> {
        if let Some(tx) = &self.outbound_tx {
            tx.send(msg).await?;
        }
        Ok(())
    }

    /// Stop the connection and wait for the task to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Connect, replay subscriptions, read and ping until shutdown, reconnecting on failure.
async fn connection_loop(
    config: WsConnConfig,
    on_text: OnMessageCallback,
    mut outbound_rx: mpsc::Receiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = Duration::from_millis(100);
    let max_backoff = Duration::from_secs(30);
    let conn_id = config.id;

    loop {
        if *shutdown_rx.borrow() {
            info!("[ws-{conn_id}] shutdown requested");
            return;
        }

        info!("[ws-{conn_id}] connecting to {}", config.url);

        let ws_stream = match connect_ws(&config).await {
            Ok(s) => {
                backoff = Duration::from_millis(100);
                info!("[ws-{conn_id}] connected");
                s
            }
            Err(e) => {
                error!("[ws-{conn_id}] connection failed: {e}, retrying in {backoff:?}");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {},
                    _ = shutdown_rx.changed() => return,
                }
                backoff = (backoff * 2).min(max_backoff);
                continue;
            }
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();

        if let Some(ref resubscribe) = config.resubscribe {
            let mut failed = false;
            for msg in resubscribe() {
                debug!("[ws-{conn_id}] subscribing: {msg}");
                if let Err(e) = ws_write.send(Message::Text(msg.into())).await {
                    error!("[ws-{conn_id}] subscribe send failed: {e}");
                    failed = true;
                    break;
                }
            }
            if failed {
                continue;
            }
        }

        let ping_interval = config.ping_interval.map(tokio::time::interval);

        tokio::pin! {
            let ping_tick = async {
                if let Some(mut interval) = ping_interval {
                    interval.tick().await;
                    loop {
                        interval.tick().await;
                    }
                } else {
                    std::future::pending::<()>().await
                }
            };
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("[ws-{conn_id}] shutdown signal received");
                    let _ = ws_write.close().await;
                    return;
                }

                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            on_text(conn_id, &text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("[ws-{conn_id}] received close frame");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("[ws-{conn_id}] read error: {e}");
                            break;
                        }
                        None => {
                            warn!("[ws-{conn_id}] stream ended");
                            break;
                        }
                        _ => {} // Binary, Pong, Frame
                    }
                }

                Some(msg) = outbound_rx.recv() => {
                    if let Err(e) = ws_write.send(Message::Text(msg.into())).await {
                        error!("[ws-{conn_id}] send error: {e}");
                        break;
                    }
                }

                _ = &mut ping_tick => {
                    let ping_msg = match &config.ping_payload {
                        Some(PingPayload::Text(t)) => Message::Text(t.clone().into()),
                        Some(PingPayload::WebSocketPing) | None => {
                            Message::Ping(vec![].into())
                        }
                    };
                    if let Err(e) = ws_write.send(ping_msg).await {
                        error!("[ws-{conn_id}] ping send error: {e}");
                        break;
                    }
                }
            }
        }

        warn!("[ws-{conn_id}] disconnected, reconnecting in {backoff:?}");
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {},
            _ = shutdown_rx.changed() => return,
        }
        backoff = (backoff * 2).min(max_backoff);
    }
}

/// Establish a WebSocket connection (plain or TLS, depending on the scheme).
async fn connect_ws(
    config: &WsConnConfig,
) -> anyhow::Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
> {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};

    let mut request = config.url.as_str().into_client_request()?;
    for (key, value) in &config.extra_headers {
        request.headers_mut().insert(
            HeaderName::from_bytes(key.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
    }

    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

/// Extract the host from a URL string.
pub fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_extraction() {
        assert_eq!(extract_host("ws://127.0.0.1:6671/ws"), "127.0.0.1");
        assert_eq!(extract_host("not a url"), "");
    }
}
