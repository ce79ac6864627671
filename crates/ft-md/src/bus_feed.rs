//! Market-data bus client.
//!
//! One WebSocket connection to the bus carries the subscriptions of every
//! session in the process. Incoming frames are parsed on the connection task
//! and routed to per-session channels by connection id.
//!
//! ```text
//! bus WS ──► parse_message ──► Routes ──► ticks[conn_id]  ──► session tick relay
//!                                    └──► orders[conn_id] ──► session status relay
//! ```
//!
//! The route table doubles as the subscription set replayed after a
//! reconnect.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ahash::AHashMap;
use anyhow::Result;
use async_trait::async_trait;
use ft_core::config::FeedConfig;
use ft_core::error::FtError;
use ft_core::types::{OrderStatusUpdate, Tick};
use ft_core::ws::{OnMessageCallback, PingPayload, ResubscribeCallback, WsConnConfig, WsConnection};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use crate::json_parser::{self, FeedPayload};
use crate::{MarketDataFeed, OrderStatusReceiver, TickReceiver};

struct TickRoute {
    code: String,
    tx: UnboundedSender<Tick>,
}

/// Per-connection-id subscriptions.
#[derive(Default)]
struct Routes {
    ticks: AHashMap<String, TickRoute>,
    orders: AHashMap<String, UnboundedSender<OrderStatusUpdate>>,
}

impl Routes {
    /// Deliver one parsed frame. Routes whose receiver is gone are pruned.
    fn dispatch(&mut self, conn_id: Option<&str>, payload: FeedPayload) {
        match payload {
            FeedPayload::Tick(tick) => match conn_id {
                Some(id) => {
                    if let Some(route) = self.ticks.get(id) {
                        if route.tx.send(tick).is_err() {
                            self.ticks.remove(id);
                        }
                    }
                }
                None => self
                    .ticks
                    .retain(|_, r| r.code != tick.code || r.tx.send(tick.clone()).is_ok()),
            },
            FeedPayload::OrderStatus(update) => match conn_id {
                Some(id) => {
                    if let Some(tx) = self.orders.get(id) {
                        if tx.send(update).is_err() {
                            self.orders.remove(id);
                        }
                    }
                }
                None => self.orders.retain(|_, tx| tx.send(update.clone()).is_ok()),
            },
        }
    }

    fn subscribe_messages(&self) -> Vec<String> {
        let ticks = self
            .ticks
            .iter()
            .map(|(id, r)| json_parser::build_tick_subscribe(id, &r.code));
        let orders = self
            .orders
            .keys()
            .map(|id| json_parser::build_order_subscribe(id));
        ticks.chain(orders).collect()
    }
}

/// WebSocket client of the market-data bus.
pub struct BusFeed {
    routes: Arc<Mutex<Routes>>,
    outbound: mpsc::Sender<String>,
    conn: tokio::sync::Mutex<WsConnection>,
}

impl BusFeed {
    /// Start the bus connection. Subscriptions can be added immediately;
    /// they are sent as soon as the socket is up.
    pub fn connect(config: &FeedConfig) -> Result<Self> {
        let routes = Arc::new(Mutex::new(Routes::default()));

        let replay_routes = Arc::clone(&routes);
        let resubscribe: ResubscribeCallback = Arc::new(move || {
            replay_routes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .subscribe_messages()
        });

        let dispatch_routes = Arc::clone(&routes);
        let on_text: OnMessageCallback = Arc::new(move |_conn_id, text| {
            match json_parser::parse_message(text) {
                Some(msg) => dispatch_routes
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .dispatch(msg.conn_id.as_deref(), msg.payload),
                None => debug!("[bus-feed] ignored frame: {text}"),
            }
        });

        let mut conn = WsConnection::new(WsConnConfig {
            url: config.bus_url.clone(),
            resubscribe: Some(resubscribe),
            extra_headers: Default::default(),
            ping_interval: Some(Duration::from_secs(config.ping_interval_secs.max(1))),
            ping_payload: Some(PingPayload::Text("ping".into())),
            id: 0,
        });
        conn.start(on_text);
        let outbound = conn
            .sender()
            .ok_or_else(|| FtError::Feed("bus connection did not start".into()))?;

        info!(
            "[bus-feed] started for {}",
            ft_core::ws::client::extract_host(&config.bus_url)
        );
        Ok(Self {
            routes,
            outbound,
            conn: tokio::sync::Mutex::new(conn),
        })
    }

    /// Queue a control message for the bus.
    async fn send(&self, msg: String) -> Result<()> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| FtError::Feed("bus connection closed".into()))?;
        Ok(())
    }

    fn routes(&self) -> std::sync::MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the bus connection.
    pub async fn stop(&self) {
        self.conn.lock().await.stop().await;
        info!("[bus-feed] stopped");
    }
}

#[async_trait]
impl MarketDataFeed for BusFeed {
    async fn subscribe_ticks(&self, conn_id: &str, code: &str) -> Result<TickReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes().ticks.insert(
            conn_id.to_string(),
            TickRoute {
                code: code.to_string(),
                tx,
            },
        );
        self.send(json_parser::build_tick_subscribe(conn_id, code))
            .await?;
        info!("[bus-feed] {conn_id} subscribed to ticks of {code}");
        Ok(rx)
    }

    async fn subscribe_order_status(&self, conn_id: &str) -> Result<OrderStatusReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes().orders.insert(conn_id.to_string(), tx);
        self.send(json_parser::build_order_subscribe(conn_id)).await?;
        info!("[bus-feed] {conn_id} subscribed to order status");
        Ok(rx)
    }

    async fn unsubscribe(&self, conn_id: &str) -> Result<()> {
        let had_any = {
            let mut routes = self.routes();
            let t = routes.ticks.remove(conn_id).is_some();
            let o = routes.orders.remove(conn_id).is_some();
            t || o
        };
        if !had_any {
            return Ok(());
        }
        if let Err(e) = self.send(json_parser::build_unsubscribe(conn_id)).await {
            warn!("[bus-feed] unsubscribe {conn_id} not sent: {e}");
        }
        info!("[bus-feed] {conn_id} unsubscribed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(code: &str, close: f64) -> Tick {
        Tick {
            code: code.into(),
            time: 1,
            close,
            ..Default::default()
        }
    }

    #[test]
    fn routes_by_conn_id() {
        let mut routes = Routes::default();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        routes.ticks.insert("a".into(), TickRoute { code: "MXFL1".into(), tx: tx1 });
        routes.ticks.insert("b".into(), TickRoute { code: "MXFL1".into(), tx: tx2 });

        routes.dispatch(Some("a"), FeedPayload::Tick(tick("MXFL1", 1.0)));
        assert_eq!(rx1.try_recv().unwrap().close, 1.0);
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn broadcast_tick_matches_code() {
        let mut routes = Routes::default();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        routes.ticks.insert("a".into(), TickRoute { code: "MXFL1".into(), tx: tx1 });
        routes.ticks.insert("b".into(), TickRoute { code: "TXFL1".into(), tx: tx2 });

        routes.dispatch(None, FeedPayload::Tick(tick("TXFL1", 2.0)));
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap().close, 2.0);
    }

    #[test]
    fn dead_routes_are_pruned() {
        let mut routes = Routes::default();
        let (tx, rx) = mpsc::unbounded_channel();
        routes.orders.insert("a".into(), tx);
        drop(rx);
        routes.dispatch(
            Some("a"),
            FeedPayload::OrderStatus(OrderStatusUpdate {
                order_id: "o".into(),
                status: ft_core::enums::OrderStatus::Filled,
                order_time: 0,
                price: None,
            }),
        );
        assert!(routes.orders.is_empty());
    }

    #[test]
    fn replay_covers_all_subscriptions() {
        let mut routes = Routes::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (otx, _orx) = mpsc::unbounded_channel();
        routes.ticks.insert("a".into(), TickRoute { code: "MXFL1".into(), tx });
        routes.orders.insert("a".into(), otx);
        assert_eq!(routes.subscribe_messages().len(), 2);
    }
}
