//! Assist trader.
//!
//! Closes the position opened by one filled primary order. Each trader runs
//! as its own task, fed by a bounded tick queue from the session and by the
//! session bus for order-status changes.
//!
//! ```text
//! Armed ──tick──► Idle ◄──closing leg cancelled/failed── OrderPlaced
//!                  │                                       ▲
//!                  └───────────── trigger fires ───────────┘
//!
//! any state ──closing legs filled == primary quantity──► Done
//! ```

use std::sync::Arc;

use ahash::AHashMap;
use ft_core::bus::Subscription;
use ft_core::enums::{AutomationType, OrderStatus};
use ft_core::types::{AssistTarget, Order, Tick};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::events::{TradeBus, TradeEvent};
use crate::registry::OrderRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistState {
    /// Started; no tick seen yet.
    Armed,
    /// Watching ticks for a trigger.
    Idle,
    /// A closing order is outstanding.
    OrderPlaced,
    Done,
}

pub struct AssistTrader {
    target: AssistTarget,
    registry: Arc<OrderRegistry>,
    bus: TradeBus,
    updates: Subscription<TradeEvent>,
    closing: AHashMap<String, Order>,
    waiting_order: Option<String>,
    state: AssistState,
}

impl AssistTrader {
    /// `target.order` must be the filled primary, with `trade_time` set to
    /// the local time of the fill.
    pub fn new(target: AssistTarget, registry: Arc<OrderRegistry>, bus: TradeBus) -> Self {
        let updates = bus.subscribe();
        Self {
            target,
            registry,
            bus,
            updates,
            closing: AHashMap::new(),
            waiting_order: None,
            state: AssistState::Armed,
        }
    }

    pub fn state(&self) -> AssistState {
        self.state
    }

    pub fn primary(&self) -> &Order {
        &self.target.order
    }

    /// Quantity of the closing legs filled so far.
    pub fn filled_quantity(&self) -> i64 {
        self.closing
            .values()
            .filter(|o| o.status == OrderStatus::Filled)
            .map(|o| o.quantity)
            .sum()
    }

    /// Whether `tick` fires the closing trigger.
    pub fn should_fire(&self, tick: &Tick) -> bool {
        let opt = &self.target.option;
        match opt.automation_type {
            AutomationType::ByBalance => self.balance_hit(tick),
            AutomationType::ByTimePeriod => self.period_elapsed(tick),
            AutomationType::ByTimePeriodAndBalance => {
                self.balance_hit(tick) || self.period_elapsed(tick)
            }
        }
    }

    /// A zero offset disables that side of the band.
    fn balance_hit(&self, tick: &Tick) -> bool {
        let opt = &self.target.option;
        let fill = self.target.order.price;
        let price = tick.close;
        let (low, high) = (opt.by_balance_low, opt.by_balance_high);
        if self.target.order.is_long() {
            (low > 0.0 && price < fill - low) || (high > 0.0 && price > fill + high)
        } else {
            (low > 0.0 && price > fill + low) || (high > 0.0 && price < fill - high)
        }
    }

    fn period_elapsed(&self, tick: &Tick) -> bool {
        let filled_at = self.target.order.trade_time as i64;
        let elapsed_ms = tick.time.saturating_sub(filled_at).max(0) as u128;
        elapsed_ms > self.target.option.time_period().as_millis()
    }

    /// Apply a merged status change. Orders outside this trader's group are
    /// ignored.
    pub fn on_order_update(&mut self, order: &Order) {
        let Some(leg) = self.closing.get_mut(&order.order_id) else {
            return;
        };
        leg.status = order.status;
        leg.price = order.price;
        if self.waiting_order.as_deref() == Some(order.order_id.as_str())
            && !order.status.is_cancellable()
        {
            debug!(
                "[assist] {} closing leg {} ended {}",
                self.target.order.order_id, order.order_id, order.status
            );
            self.waiting_order = None;
            if self.state != AssistState::Done {
                self.state = AssistState::Idle;
            }
        }
    }

    fn drain_updates(&mut self) {
        while let Some(event) = self.updates.try_recv() {
            if let TradeEvent::OrderStatus(order) = event {
                self.on_order_update(&order);
            }
        }
    }

    /// Finish once the closing legs cover the primary quantity.
    fn check_done(&mut self) -> bool {
        if self.state == AssistState::Done {
            return true;
        }
        if self.filled_quantity() < self.target.order.quantity {
            return false;
        }
        self.updates.unsubscribe();
        self.state = AssistState::Done;
        info!(
            "[assist] {} closed {}x{}",
            self.target.order.order_id, self.target.order.code, self.target.order.quantity
        );
        self.bus.publish(TradeEvent::AssistDone {
            primary_order_id: self.target.order.order_id.clone(),
        });
        true
    }

    /// Evaluate one tick. Returns the closing order if one was placed.
    pub async fn on_tick(&mut self, tick: &Tick) -> Option<Order> {
        self.drain_updates();
        if self.check_done() || self.waiting_order.is_some() {
            return None;
        }
        if self.state == AssistState::Armed {
            self.state = AssistState::Idle;
        }
        if !self.should_fire(tick) {
            return None;
        }
        self.place_closing(tick).await
    }

    async fn place_closing(&mut self, tick: &Tick) -> Option<Order> {
        let primary = &self.target.order;
        let remaining = primary.quantity - self.filled_quantity();
        let mut order = Order::new(&primary.code, primary.action.opposite(), tick.close, remaining);
        order.group_id = primary.group_id.clone();
        let primary_id = primary.order_id.clone();

        match self.registry.place(&mut order).await {
            Ok(_) => {
                info!("[assist] {primary_id} placed closing {order}");
                self.closing.insert(order.order_id.clone(), order.clone());
                self.waiting_order = Some(order.order_id.clone());
                self.state = AssistState::OrderPlaced;
                self.bus.publish(TradeEvent::PlaceOrder(order.clone()));
                Some(order)
            }
            Err(e) => {
                warn!("[assist] {primary_id} closing order failed: {e}");
                self.state = AssistState::Idle;
                self.bus.publish(TradeEvent::AssistFailed {
                    primary_order_id: primary_id,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    /// Drive the trader until it is done, its tick queue closes, or the
    /// session shuts down.
    pub async fn run(mut self, mut ticks: mpsc::Receiver<Tick>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "[assist] started for {} ({:?})",
            self.target.order, self.target.option.automation_type
        );
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                tick = ticks.recv() => match tick {
                    Some(tick) => {
                        self.on_tick(&tick).await;
                        if self.state == AssistState::Done {
                            break;
                        }
                    }
                    None => break,
                },
                event = self.updates.recv(), if self.updates.is_active() => {
                    if let Some(TradeEvent::OrderStatus(order)) = event {
                        self.on_order_update(&order);
                        if self.check_done() {
                            break;
                        }
                    }
                }
            }
        }
        debug!("[assist] {} stopped in {:?}", self.target.order.order_id, self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Deadlines;
    use crate::testing::MockGateway;
    use ft_core::enums::OrderAction;
    use ft_core::types::{HalfAutomationOption, OrderStatusUpdate};
    use std::time::Duration;

    const FILL_TIME: u64 = 1_700_000_000_000;

    fn registry(gw: &Arc<MockGateway>) -> Arc<OrderRegistry> {
        Arc::new(OrderRegistry::new(
            gw.clone(),
            Deadlines {
                open: Duration::from_secs(10),
                close: Duration::from_secs(30),
            },
        ))
    }

    fn target(action: OrderAction, quantity: i64, option: HalfAutomationOption) -> AssistTarget {
        let mut order = Order::new("MXFL1", action, 100.0, quantity);
        order.order_id = "primary".into();
        order.group_id = "g-1".into();
        order.status = OrderStatus::Filled;
        order.trade_time = FILL_TIME;
        AssistTarget { order, option }
    }

    fn balance(low: f64, high: f64) -> HalfAutomationOption {
        HalfAutomationOption {
            automation_type: AutomationType::ByBalance,
            by_balance_high: high,
            by_balance_low: low,
            by_time_period_secs: 0,
        }
    }

    fn period(secs: u64) -> HalfAutomationOption {
        HalfAutomationOption {
            automation_type: AutomationType::ByTimePeriod,
            by_balance_high: 0.0,
            by_balance_low: 0.0,
            by_time_period_secs: secs,
        }
    }

    fn tick(close: f64, after_ms: i64) -> Tick {
        Tick {
            code: "MXFL1".into(),
            time: FILL_TIME as i64 + after_ms,
            close,
            ..Default::default()
        }
    }

    fn trader(t: AssistTarget) -> (AssistTrader, Arc<MockGateway>, Arc<OrderRegistry>, TradeBus) {
        let gw = Arc::new(MockGateway::new());
        let reg = registry(&gw);
        let bus = TradeBus::new();
        (AssistTrader::new(t, reg.clone(), bus.clone()), gw, reg, bus)
    }

    fn filled(reg: &OrderRegistry, id: &str) -> Order {
        reg.apply_status(&OrderStatusUpdate {
            order_id: id.into(),
            status: OrderStatus::Filled,
            order_time: 0,
            price: None,
        })
        .unwrap()
    }

    #[test]
    fn balance_band_long() {
        let (t, ..) = trader(target(OrderAction::Buy, 1, balance(2.0, 2.0)));
        assert!(t.should_fire(&tick(97.9, 0)));
        assert!(!t.should_fire(&tick(98.1, 0)));
        assert!(!t.should_fire(&tick(101.9, 0)));
        assert!(t.should_fire(&tick(102.1, 0)));
    }

    #[test]
    fn balance_band_short_is_mirrored() {
        let (t, ..) = trader(target(OrderAction::SellFirst, 1, balance(2.0, 2.0)));
        assert!(t.should_fire(&tick(102.1, 0)));
        assert!(!t.should_fire(&tick(101.9, 0)));
        assert!(t.should_fire(&tick(97.9, 0)));
        assert!(!t.should_fire(&tick(98.1, 0)));
    }

    #[test]
    fn zero_offset_disables_side() {
        let (t, ..) = trader(target(OrderAction::Buy, 1, balance(2.0, 0.0)));
        assert!(!t.should_fire(&tick(150.0, 0)));
        assert!(t.should_fire(&tick(97.0, 0)));
    }

    #[test]
    fn time_period_measured_from_fill() {
        let (t, ..) = trader(target(OrderAction::Buy, 1, period(300)));
        assert!(!t.should_fire(&tick(100.0, 60_000)));
        assert!(!t.should_fire(&tick(100.0, 300_000)));
        assert!(t.should_fire(&tick(100.0, 301_000)));
    }

    #[test]
    fn combined_rule() {
        let opt = HalfAutomationOption {
            automation_type: AutomationType::ByTimePeriodAndBalance,
            by_balance_high: 2.0,
            by_balance_low: 2.0,
            by_time_period_secs: 60,
        };
        let (t, ..) = trader(target(OrderAction::Buy, 1, opt));
        assert!(t.should_fire(&tick(97.0, 1_000)));
        assert!(!t.should_fire(&tick(100.0, 1_000)));
        assert!(t.should_fire(&tick(100.0, 61_000)));
    }

    #[tokio::test]
    async fn places_opposite_leg_and_waits() {
        let (mut t, gw, _reg, bus) = trader(target(OrderAction::Buy, 2, balance(2.0, 2.0)));
        let mut events = bus.subscribe();

        assert!(t.on_tick(&tick(99.0, 0)).await.is_none());
        assert_eq!(t.state(), AssistState::Idle);

        let closing = t.on_tick(&tick(97.5, 0)).await.unwrap();
        assert_eq!(closing.action, OrderAction::Sell);
        assert_eq!(closing.quantity, 2);
        assert_eq!(closing.price, 97.5);
        assert_eq!(closing.group_id, "g-1");
        assert_eq!(t.state(), AssistState::OrderPlaced);
        assert_eq!(events.try_recv(), Some(TradeEvent::PlaceOrder(closing)));

        // At most one closing attempt in flight.
        assert!(t.on_tick(&tick(90.0, 0)).await.is_none());
        assert_eq!(gw.sells(), 1);
    }

    #[tokio::test]
    async fn completes_when_closing_leg_fills() {
        let (mut t, _gw, reg, bus) = trader(target(OrderAction::Buy, 1, balance(2.0, 2.0)));
        let mut events = bus.subscribe();
        let closing = t.on_tick(&tick(97.0, 0)).await.unwrap();
        let _ = events.try_recv();

        bus.publish(TradeEvent::OrderStatus(filled(&reg, &closing.order_id)));
        assert!(t.on_tick(&tick(97.0, 0)).await.is_none());
        assert_eq!(t.state(), AssistState::Done);
        assert_eq!(t.filled_quantity(), 1);
        // Drain our own status event, then the completion notice.
        let done = std::iter::from_fn(|| events.try_recv())
            .find(|e| matches!(e, TradeEvent::AssistDone { .. }));
        assert_eq!(
            done,
            Some(TradeEvent::AssistDone {
                primary_order_id: "primary".into()
            })
        );
    }

    #[tokio::test]
    async fn cancelled_leg_rearms_trigger() {
        let (mut t, gw, reg, bus) = trader(target(OrderAction::Buy, 1, balance(2.0, 2.0)));
        let closing = t.on_tick(&tick(97.0, 0)).await.unwrap();

        let cancelled = reg
            .apply_status(&OrderStatusUpdate {
                order_id: closing.order_id.clone(),
                status: OrderStatus::Cancelled,
                order_time: 0,
                price: None,
            })
            .unwrap();
        bus.publish(TradeEvent::OrderStatus(cancelled));

        let retry = t.on_tick(&tick(96.0, 0)).await.unwrap();
        assert_ne!(retry.order_id, closing.order_id);
        assert_eq!(gw.sells(), 2);
    }

    #[tokio::test]
    async fn failed_placement_is_published() {
        let (mut t, gw, _reg, bus) = trader(target(OrderAction::SellFirst, 1, period(1)));
        let mut events = bus.subscribe();
        gw.reject_next_place("market closed");

        assert!(t.on_tick(&tick(100.0, 5_000)).await.is_none());
        assert_eq!(t.state(), AssistState::Idle);
        assert!(matches!(
            events.try_recv(),
            Some(TradeEvent::AssistFailed { reason, .. }) if reason.contains("market closed")
        ));
        assert_eq!(gw.buys(), 1);
    }
}
