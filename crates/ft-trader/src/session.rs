//! Session router.
//!
//! One router per client connection. It owns the session's order registry,
//! waiting list, assist bookkeeping and bus, and runs these tasks until the
//! session's shutdown signal fires:
//!
//! ```text
//! feed ticks  ──► tick relay ───► client (tick)
//!                     └─────────► assist tick queues ──► AssistTrader tasks
//! feed status ──► status relay ─► registry merge ──► client (order) + bus
//! snapshots   ──► trade index / positions / K-bars ──► client
//! bus         ──► bus relay ────► client (order, error), tick queue release
//! housekeeping ─► waiting-list prune, assist promotion
//! supervisor  ──► registry sweep (cancel overdue orders)
//! ```
//!
//! Client commands are handled on the caller's task, one at a time.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use ahash::AHashMap;
use anyhow::{Context, Result};
use ft_core::config::TradeConfig;
use ft_core::enums::OrderStatus;
use ft_core::time_util;
use ft_core::types::{AssistTarget, Order, OrderStatusUpdate, Tick};
use ft_md::{MarketDataFeed, OrderStatusReceiver, SnapshotSource, TickReceiver};
use ft_td::OrderGateway;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::admission::{self, AdmissionState, Rejection};
use crate::assist::AssistTrader;
use crate::events::{TradeBus, TradeEvent};
use crate::hours::TradingHours;
use crate::protocol::{self, ErrorCode, Outbound, OutboundSender, ServerMessage};
use crate::registry::{Deadlines, OrderRegistry};
use crate::supervisor::TimeoutSupervisor;
use crate::waiting::WaitingList;

/// Capacity of each assist trader's tick queue.
const ASSIST_TICK_QUEUE: usize = 1024;

const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Process-wide collaborators shared by every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub gateway: Arc<dyn OrderGateway>,
    pub feed: Arc<dyn MarketDataFeed>,
    pub snapshots: Arc<dyn SnapshotSource>,
    pub trade: TradeConfig,
    pub hours: TradingHours,
}

pub struct SessionRouter {
    conn_id: String,
    deps: SessionDeps,
    registry: Arc<OrderRegistry>,
    waiting: WaitingList,
    /// Assisted primaries not yet filled, keyed by order id.
    assist_waiting: Mutex<AHashMap<String, AssistTarget>>,
    /// Tick queues of live assist traders, keyed by primary order id.
    assist_ticks: RwLock<AHashMap<String, mpsc::Sender<Tick>>>,
    bus: TradeBus,
    out: OutboundSender,
    shutdown: watch::Receiver<bool>,
}

impl SessionRouter {
    pub fn new(
        conn_id: &str,
        deps: SessionDeps,
        out: OutboundSender,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        let registry = Arc::new(OrderRegistry::new(
            Arc::clone(&deps.gateway),
            Deadlines {
                open: deps.trade.open_timeout(),
                close: deps.trade.close_timeout(),
            },
        ));
        Arc::new(Self {
            conn_id: conn_id.to_string(),
            deps,
            registry,
            waiting: WaitingList::new(),
            assist_waiting: Mutex::new(AHashMap::new()),
            assist_ticks: RwLock::new(AHashMap::new()),
            bus: TradeBus::new(),
            out,
            shutdown,
        })
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn registry(&self) -> &Arc<OrderRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &TradeBus {
        &self.bus
    }

    fn push(&self, msg: ServerMessage) {
        if self.out.send(Outbound::Message(msg)).is_err() {
            debug!("[session {}] writer gone, dropping message", self.conn_id);
        }
    }

    fn push_error(&self, code: ErrorCode, text: impl Into<String>) {
        self.push(ServerMessage::error(code, text));
    }

    fn assist_waiting(&self) -> MutexGuard<'_, AHashMap<String, AssistTarget>> {
        self.assist_waiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live assist traders.
    pub fn assists_running(&self) -> usize {
        self.assist_ticks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn waiting_orders(&self) -> usize {
        self.waiting.len()
    }

    pub fn assist_targets_pending(&self) -> usize {
        self.assist_waiting().len()
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Handle one inbound text frame.
    pub async fn handle_text(&self, text: &str) {
        if text == "ping" {
            let _ = self.out.send(Outbound::Pong);
            return;
        }
        match protocol::decode_command(text) {
            Ok(cmd) => {
                let _ = self.process_client_order(cmd).await;
            }
            Err(e) => {
                warn!("[session {}] bad command: {e}", self.conn_id);
                self.push_error(ErrorCode::DecodeFailed, e.to_string());
            }
        }
    }

    fn admission_state(&self) -> AdmissionState {
        AdmissionState {
            in_trading_hours: self.deps.hours.is_open_now(),
            waiting_orders: self.waiting.len(),
            assists: self.assists_running() + self.assist_targets_pending(),
            max_assist_quantity: self.deps.trade.max_assist_quantity,
            max_order_quantity: self.deps.trade.max_order_quantity,
        }
    }

    /// Admit a command and place it as `quantity` unit orders, each in its own
    /// group. Returns the accepted orders; placement failures are reported to
    /// the client per unit.
    pub async fn process_client_order(
        &self,
        cmd: protocol::ClientCommand,
    ) -> Result<Vec<Order>, Rejection> {
        if let Err(rejection) = admission::admit(&cmd, &self.admission_state()) {
            info!("[session {}] command rejected: {rejection}", self.conn_id);
            self.push_error(rejection.code(), rejection.to_string());
            return Err(rejection);
        }

        let mut placed = Vec::new();
        for _ in 0..cmd.quantity {
            let mut order = Order::new(&cmd.instrument_code, cmd.action, cmd.price, 1);
            order.group_id = Uuid::new_v4().to_string();
            order.manual = true;

            if let Err(e) = self.registry.place(&mut order).await {
                self.push_error(
                    ErrorCode::PlaceOrderFailed,
                    format!("{} {} {}: {e}", order.action, order.code, order.price),
                );
                continue;
            }
            match cmd.automation_option {
                Some(option) => {
                    self.assist_waiting().insert(
                        order.order_id.clone(),
                        AssistTarget {
                            order: order.clone(),
                            option,
                        },
                    );
                }
                None => self.waiting.add(&order.order_id),
            }
            self.push(ServerMessage::Order(order.clone()));
            placed.push(order);
        }
        Ok(placed)
    }

    // -----------------------------------------------------------------------
    // Feed
    // -----------------------------------------------------------------------

    /// Relay a tick to the client and every live assist trader.
    pub fn on_tick(&self, tick: Tick) {
        self.fan_out_tick(&tick);
        self.push(ServerMessage::Tick(tick));
    }

    /// Offer `tick` to every assist tick queue without waiting. Returns how
    /// many queues took it.
    pub fn fan_out_tick(&self, tick: &Tick) -> usize {
        let queues = self.assist_ticks.read().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        for (primary_id, tx) in queues.iter() {
            match tx.try_send(tick.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("[session {}] assist {primary_id} tick queue full", self.conn_id)
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Merge a feed status update and propagate it if the status changed.
    pub fn on_status_update(&self, update: OrderStatusUpdate) {
        let Some(order) = self.registry.apply_status(&update) else {
            return;
        };
        if !order.status.is_cancellable() {
            self.waiting.remove(&order.order_id);
        }
        if let Some(target) = self.assist_waiting().get_mut(&order.order_id) {
            target.order.status = order.status;
            target.order.price = order.price;
            if order.status == OrderStatus::Filled {
                target.order.trade_time = time_util::now_ms();
            }
        }
        self.push(ServerMessage::Order(order.clone()));
        self.bus.publish(TradeEvent::OrderStatus(order));
    }

    // -----------------------------------------------------------------------
    // Housekeeping
    // -----------------------------------------------------------------------

    /// Drop waiting-list ids whose order is gone or finished.
    pub fn prune_waiting(&self) -> usize {
        self.waiting.retain(|id| {
            self.registry
                .lookup(id)
                .is_some_and(|o| o.status.is_cancellable())
        })
    }

    /// Start traders for filled assisted primaries and forget the ones that
    /// ended without a fill. Returns how many traders were started.
    pub fn promote_assist_targets(&self) -> usize {
        let ready: Vec<AssistTarget> = {
            let mut pending = self.assist_waiting();
            let mut ready = Vec::new();
            pending.retain(|id, target| match target.order.status {
                OrderStatus::Filled => {
                    ready.push(target.clone());
                    false
                }
                s if !s.is_cancellable() => {
                    info!("[session {}] assisted order {id} ended {s}", self.conn_id);
                    false
                }
                _ => true,
            });
            ready
        };
        let started = ready.len();
        for target in ready {
            self.start_assist(target);
        }
        started
    }

    /// Open a tick queue for `target` and spawn its trader.
    pub fn start_assist(&self, target: AssistTarget) {
        let primary_id = target.order.order_id.clone();
        let (tx, rx) = mpsc::channel(ASSIST_TICK_QUEUE);
        let first = {
            let mut queues = self.assist_ticks.write().unwrap_or_else(PoisonError::into_inner);
            queues.insert(primary_id.clone(), tx);
            queues.len() == 1
        };
        if first {
            self.push(ServerMessage::AssistStatus { running: true });
        }
        let trader = AssistTrader::new(target, Arc::clone(&self.registry), self.bus.clone());
        tokio::spawn(trader.run(rx, self.shutdown.clone()));
        info!("[session {}] assist started for {primary_id}", self.conn_id);
    }

    /// Close the tick queue of a finished trader. Releasing an unknown or
    /// already released queue is a no-op and returns `false`.
    pub fn release_tick_queue(&self, primary_id: &str) -> bool {
        let (removed, now_empty) = {
            let mut queues = self.assist_ticks.write().unwrap_or_else(PoisonError::into_inner);
            let removed = queues.remove(primary_id).is_some();
            (removed, queues.is_empty())
        };
        if removed && now_empty {
            self.push(ServerMessage::AssistStatus { running: false });
        }
        removed
    }

    pub fn on_bus_event(&self, event: TradeEvent) {
        match event {
            TradeEvent::OrderStatus(_) => {}
            TradeEvent::PlaceOrder(order) => self.push(ServerMessage::Order(order)),
            TradeEvent::AssistDone { primary_order_id } => {
                self.release_tick_queue(&primary_order_id);
            }
            TradeEvent::AssistFailed {
                primary_order_id,
                reason,
            } => self.push_error(
                ErrorCode::AssistOrderFailed,
                format!("assist {primary_order_id}: {reason}"),
            ),
        }
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub async fn push_trade_index(&self) {
        match self.deps.snapshots.trade_index().await {
            Ok(index) => self.push(ServerMessage::TradeIndex(index)),
            Err(e) => warn!("[session {}] trade index: {e:#}", self.conn_id),
        }
    }

    /// Positions are only pushed during trading hours.
    pub async fn push_positions(&self) {
        if !self.deps.hours.is_open_now() {
            return;
        }
        match self.deps.snapshots.positions().await {
            Ok(positions) => self.push(ServerMessage::Position(positions)),
            Err(e) => warn!("[session {}] positions: {e:#}", self.conn_id),
        }
    }

    pub async fn push_kbars(&self) {
        let code = &self.deps.trade.instrument_code;
        match self.deps.snapshots.kbars(code, self.deps.trade.kbar_days).await {
            Ok(bars) => self.push(ServerMessage::Kbar(bars)),
            Err(e) => warn!("[session {}] kbars {code}: {e:#}", self.conn_id),
        }
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Subscribe to the feed and spawn the session's tasks.
    ///
    /// A failed feed subscription aborts the session before any task starts.
    pub async fn start(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>> {
        let code = &self.deps.trade.instrument_code;
        let ticks = self
            .deps
            .feed
            .subscribe_ticks(&self.conn_id, code)
            .await
            .with_context(|| format!("tick subscription for {code} failed"))?;
        let statuses = self
            .deps
            .feed
            .subscribe_order_status(&self.conn_id)
            .await
            .context("order status subscription failed")?;

        let trade = &self.deps.trade;
        let mut handles = vec![
            tokio::spawn(Arc::clone(self).tick_relay(ticks)),
            tokio::spawn(Arc::clone(self).status_relay(statuses)),
            tokio::spawn(Arc::clone(self).bus_relay()),
        ];

        let me = Arc::clone(self);
        handles.push(tokio::spawn(every(
            Duration::from_secs(trade.trade_index_interval_secs),
            self.shutdown.clone(),
            move || {
                let me = Arc::clone(&me);
                async move { me.push_trade_index().await }
            },
        )));
        let me = Arc::clone(self);
        handles.push(tokio::spawn(every(
            Duration::from_secs(trade.position_interval_secs),
            self.shutdown.clone(),
            move || {
                let me = Arc::clone(&me);
                async move { me.push_positions().await }
            },
        )));
        let me = Arc::clone(self);
        handles.push(tokio::spawn(every(
            Duration::from_secs(trade.kbar_interval_secs),
            self.shutdown.clone(),
            move || {
                let me = Arc::clone(&me);
                async move { me.push_kbars().await }
            },
        )));
        let me = Arc::clone(self);
        handles.push(tokio::spawn(every(
            trade.sweep_interval(),
            self.shutdown.clone(),
            move || {
                let me = Arc::clone(&me);
                async move {
                    me.prune_waiting();
                    me.promote_assist_targets();
                }
            },
        )));

        let supervisor = TimeoutSupervisor::new(
            Arc::clone(&self.registry),
            trade.sweep_interval().max(MIN_PERIOD),
            self.out.clone(),
        );
        handles.push(tokio::spawn(supervisor.run(self.shutdown.clone())));

        info!("[session {}] started for {code}", self.conn_id);
        Ok(handles)
    }

    async fn tick_relay(self: Arc<Self>, mut ticks: TickReceiver) {
        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                tick = ticks.recv() => match tick {
                    Some(tick) => self.on_tick(tick),
                    None => {
                        warn!("[session {}] tick stream ended", self.conn_id);
                        break;
                    }
                },
            }
        }
    }

    async fn status_relay(self: Arc<Self>, mut statuses: OrderStatusReceiver) {
        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                update = statuses.recv() => match update {
                    Some(update) => self.on_status_update(update),
                    None => {
                        warn!("[session {}] order status stream ended", self.conn_id);
                        break;
                    }
                },
            }
        }
    }

    async fn bus_relay(self: Arc<Self>) {
        let mut events = self.bus.subscribe();
        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                event = events.recv() => match event {
                    Some(event) => self.on_bus_event(event),
                    None => break,
                },
            }
        }
    }

    /// Release the session's feed subscriptions.
    pub async fn close(&self) {
        if let Err(e) = self.deps.feed.unsubscribe(&self.conn_id).await {
            warn!("[session {}] unsubscribe failed: {e:#}", self.conn_id);
        }
        info!(
            "[session {}] closed with {} tracked order(s)",
            self.conn_id,
            self.registry.len()
        );
    }
}

/// Run `f` immediately and then every `period` until shutdown.
async fn every<F, Fut>(period: Duration, mut shutdown: watch::Receiver<bool>, mut f: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period.max(MIN_PERIOD));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => f().await,
        }
    }
}
