//! In-memory gateway, feed and snapshot source.
//!
//! Used by the test suites of this crate and by anyone wiring a session
//! without a brokerage behind it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ahash::AHashMap;
use anyhow::{Result, bail};
use async_trait::async_trait;
use ft_core::enums::{OrderAction, OrderStatus};
use ft_core::time_util;
use ft_core::types::{
    GatewayReply, IndexStatus, KBar, Order, OrderStatusUpdate, Position, Tick, TradeIndex,
};
use ft_md::{MarketDataFeed, OrderStatusReceiver, SnapshotSource, TickReceiver};
use ft_td::OrderGateway;
use tokio::sync::mpsc::{self, UnboundedSender};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Buy(Order),
    Sell(Order),
    Cancel(String),
}

enum Scripted {
    Reject(String),
    Transport(String),
}

/// Gateway that accepts every order with a sequential id unless told
/// otherwise, and records every call.
#[derive(Default)]
pub struct MockGateway {
    next_id: AtomicU64,
    calls: Mutex<Vec<GatewayCall>>,
    place_script: Mutex<VecDeque<Scripted>>,
    cancel_script: Mutex<VecDeque<Scripted>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next placement is answered with an explicit error.
    pub fn reject_next_place(&self, reason: &str) {
        lock(&self.place_script).push_back(Scripted::Reject(reason.into()));
    }

    /// The next placement fails at the transport level.
    pub fn fail_next_place(&self, reason: &str) {
        lock(&self.place_script).push_back(Scripted::Transport(reason.into()));
    }

    /// The next cancel is answered with an explicit error.
    pub fn fail_next_cancel(&self, reason: &str) {
        lock(&self.cancel_script).push_back(Scripted::Reject(reason.into()));
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.calls).clone()
    }

    pub fn placed(&self) -> Vec<Order> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                GatewayCall::Buy(o) | GatewayCall::Sell(o) => Some(o.clone()),
                GatewayCall::Cancel(_) => None,
            })
            .collect()
    }

    pub fn buys(&self) -> usize {
        self.count(|c| matches!(c, GatewayCall::Buy(_)))
    }

    pub fn sells(&self) -> usize {
        self.count(|c| matches!(c, GatewayCall::Sell(_)))
    }

    pub fn cancels(&self) -> usize {
        self.count(|c| matches!(c, GatewayCall::Cancel(_)))
    }

    fn count(&self, f: impl Fn(&GatewayCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| f(c)).count()
    }

    fn place(&self, call: GatewayCall) -> Result<GatewayReply> {
        lock(&self.calls).push(call);
        match lock(&self.place_script).pop_front() {
            Some(Scripted::Transport(reason)) => bail!("{reason}"),
            Some(Scripted::Reject(reason)) => Ok(GatewayReply {
                error: reason,
                ..Default::default()
            }),
            None => {
                let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                Ok(GatewayReply {
                    order_id: format!("mock-{n}"),
                    status: OrderStatus::PendingSubmit,
                    error: String::new(),
                    order_time: time_util::now_ms() as i64,
                })
            }
        }
    }
}

#[async_trait]
impl OrderGateway for MockGateway {
    async fn buy(&self, order: &Order) -> Result<GatewayReply> {
        self.place(GatewayCall::Buy(order.clone()))
    }

    async fn sell(&self, order: &Order) -> Result<GatewayReply> {
        self.place(GatewayCall::Sell(order.clone()))
    }

    async fn cancel(&self, order_id: &str) -> Result<GatewayReply> {
        lock(&self.calls).push(GatewayCall::Cancel(order_id.to_string()));
        match lock(&self.cancel_script).pop_front() {
            Some(Scripted::Transport(reason)) => bail!("{reason}"),
            Some(Scripted::Reject(reason)) => Ok(GatewayReply {
                order_id: order_id.to_string(),
                error: reason,
                ..Default::default()
            }),
            None => Ok(GatewayReply {
                order_id: order_id.to_string(),
                status: OrderStatus::Cancelled,
                ..Default::default()
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FeedRoutes {
    ticks: AHashMap<String, UnboundedSender<Tick>>,
    orders: AHashMap<String, UnboundedSender<OrderStatusUpdate>>,
}

/// Feed whose ticks and status updates are pushed by the test.
#[derive(Default)]
pub struct MockFeed {
    routes: Mutex<FeedRoutes>,
    unsubscribed: Mutex<Vec<String>>,
    fail_subscribe: Mutex<bool>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscriptions fail from now on.
    pub fn fail_subscriptions(&self) {
        *lock(&self.fail_subscribe) = true;
    }

    /// Deliver a tick to every tick subscriber. Returns how many got it.
    pub fn push_tick(&self, tick: Tick) -> usize {
        let mut routes = lock(&self.routes);
        routes.ticks.retain(|_, tx| tx.send(tick.clone()).is_ok());
        routes.ticks.len()
    }

    /// Deliver a status update to every order subscriber.
    pub fn push_status(&self, update: OrderStatusUpdate) -> usize {
        let mut routes = lock(&self.routes);
        routes.orders.retain(|_, tx| tx.send(update.clone()).is_ok());
        routes.orders.len()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        lock(&self.unsubscribed).clone()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.routes).ticks.len()
    }
}

#[async_trait]
impl MarketDataFeed for MockFeed {
    async fn subscribe_ticks(&self, conn_id: &str, _code: &str) -> Result<TickReceiver> {
        if *lock(&self.fail_subscribe) {
            bail!("tick subscription refused");
        }
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.routes).ticks.insert(conn_id.to_string(), tx);
        Ok(rx)
    }

    async fn subscribe_order_status(&self, conn_id: &str) -> Result<OrderStatusReceiver> {
        if *lock(&self.fail_subscribe) {
            bail!("order subscription refused");
        }
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.routes).orders.insert(conn_id.to_string(), tx);
        Ok(rx)
    }

    async fn unsubscribe(&self, conn_id: &str) -> Result<()> {
        {
            let mut routes = lock(&self.routes);
            routes.ticks.remove(conn_id);
            routes.orders.remove(conn_id);
        }
        lock(&self.unsubscribed).push(conn_id.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Snapshot source answering with fixed data.
#[derive(Default)]
pub struct MockSnapshots {
    pub index: TradeIndex,
    pub positions: Vec<Position>,
    pub kbars: Vec<KBar>,
}

impl MockSnapshots {
    pub fn new() -> Self {
        Self {
            index: TradeIndex {
                tse: IndexStatus {
                    price: 17500.0,
                    ..Default::default()
                },
                ..Default::default()
            },
            positions: vec![Position {
                code: "MXFL1".into(),
                direction: OrderAction::Buy.to_string(),
                quantity: 1,
                price: 17800.0,
                last_price: 17810.0,
                pnl: 500.0,
            }],
            kbars: vec![KBar {
                time: 1,
                open: 17800.0,
                high: 17810.0,
                low: 17790.0,
                close: 17805.0,
                volume: 12,
            }],
        }
    }
}

#[async_trait]
impl SnapshotSource for MockSnapshots {
    async fn trade_index(&self) -> Result<TradeIndex> {
        Ok(self.index.clone())
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        Ok(self.positions.clone())
    }

    async fn kbars(&self, _code: &str, _days: u32) -> Result<Vec<KBar>> {
        Ok(self.kbars.clone())
    }
}
