//! Client-facing WebSocket server.
//!
//! Each accepted connection becomes one [`SessionRouter`]. The connection
//! task reads client frames and hands them to the router; a writer task
//! drains the router's outbound queue into the socket.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::protocol::Outbound;
use crate::session::{SessionDeps, SessionRouter};

pub struct TradeServer {
    listener: TcpListener,
    deps: SessionDeps,
}

impl TradeServer {
    pub async fn bind(addr: &str, deps: SessionDeps) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self { listener, deps })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` fires. Open sessions are told to
    /// stop through the same signal.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("[server] listening on {}", self.local_addr()?);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let deps = self.deps.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            let ws = match tokio_tungstenite::accept_async(stream).await {
                                Ok(ws) => ws,
                                Err(e) => {
                                    warn!("[server] handshake with {peer} failed: {e}");
                                    return;
                                }
                            };
                            if let Err(e) = serve_connection(ws, deps, shutdown).await {
                                warn!("[server] session from {peer} ended with error: {e:#}");
                            }
                        });
                    }
                    Err(e) => {
                        error!("[server] accept failed: {e}");
                        break;
                    }
                },
            }
        }
        info!("[server] stopped");
        Ok(())
    }
}

/// Run one client session over an accepted WebSocket until the client
/// disconnects or `shutdown` fires.
pub async fn serve_connection<S>(
    ws: WebSocketStream<S>,
    deps: SessionDeps,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let conn_id = Uuid::new_v4().to_string();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    let (stop_tx, stop_rx) = watch::channel(false);
    let router = SessionRouter::new(&conn_id, deps, out_tx, stop_rx);
    let tasks = router.start().await?;

    let (mut sink, mut source) = ws.split();
    let writer_id = conn_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let text = match frame.encode() {
                Ok(text) => text,
                Err(e) => {
                    warn!("[session {writer_id}] encode failed: {e}");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                debug!("[session {writer_id}] write failed: {e}");
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => router.handle_text(text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("[session {conn_id}] read error: {e}");
                    break;
                }
            },
        }
    }

    let _ = stop_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
    router.close().await;
    drop(router);
    writer.abort();
    info!("[session {conn_id}] disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hours::TradingHours;
    use crate::testing::{MockFeed, MockGateway, MockSnapshots};
    use ft_core::config::TradeConfig;
    use std::sync::Arc;
    use std::time::Duration;

    fn deps(feed: Arc<MockFeed>) -> SessionDeps {
        SessionDeps {
            gateway: Arc::new(MockGateway::new()),
            feed,
            snapshots: Arc::new(MockSnapshots::new()),
            trade: TradeConfig::default(),
            hours: TradingHours::always_open(),
        }
    }

    async fn next_text<S>(ws: &mut WebSocketStream<S>, pred: impl Fn(&str) -> bool) -> String
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(t))) if pred(t.as_str()) => return t.as_str().to_string(),
                    Some(Ok(_)) => continue,
                    other => panic!("connection ended: {other:?}"),
                }
            }
        })
        .await
        .expect("timed out")
    }

    #[tokio::test]
    async fn serves_client_sessions() {
        let feed = Arc::new(MockFeed::new());
        let server = TradeServer::bind("127.0.0.1:0", deps(feed.clone()))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(server.run(stop_rx));

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();

        ws.send(Message::Text("ping".into())).await.unwrap();
        assert_eq!(next_text(&mut ws, |t| t == "pong").await, "pong");

        ws.send(Message::Text("{bad".into())).await.unwrap();
        let err = next_text(&mut ws, |t| t.contains(r#""type":"error""#)).await;
        let v: serde_json::Value = serde_json::from_str(&err).unwrap();
        assert_eq!(v["data"]["code"], -3);

        ws.close(None).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while feed.unsubscribed().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        stop_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
