//! Order registry.
//!
//! Tracks every accepted order of a session until it can no longer be
//! cancelled. All gateway calls (placement and cancel) go through here and are
//! serialized by one async placement lock; the maps themselves sit behind
//! short-lived std mutexes that are never held across an `.await`.
//!
//! `trade_time == 0` marks the zero-window: a cancel has been sent for the
//! order and no status update has arrived since. The next status update
//! re-arms it with the current time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ahash::{AHashMap, AHashSet};
use ft_core::enums::OrderStatus;
use ft_core::error::FtError;
use ft_core::time_util::{self, elapsed_ms};
use ft_core::types::{GatewayReply, Order, OrderStatusUpdate};
use ft_td::OrderGateway;
use tracing::{debug, info, warn};

/// How long an order may stay cancellable before it is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    /// `Buy` / `SellFirst` legs.
    pub open: Duration,
    /// `Sell` / `BuyLater` legs.
    pub close: Duration,
}

impl Deadlines {
    fn for_order(&self, order: &Order) -> Duration {
        if order.action.is_opening() {
            self.open
        } else {
            self.close
        }
    }
}

/// Outcome of one registry sweep, per affected order.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepEvent {
    /// No longer cancellable; dropped from the registry.
    Evicted(Order),
    /// Overdue; the gateway acknowledged the cancel.
    CancelIssued { order_id: String },
    /// Overdue; the cancel failed and will be retried on the next sweep.
    CancelFailed { order_id: String, reason: String },
}

pub struct OrderRegistry {
    gateway: Arc<dyn OrderGateway>,
    orders: Mutex<AHashMap<String, Order>>,
    cancel_issued: Mutex<AHashSet<String>>,
    place_lock: tokio::sync::Mutex<()>,
    deadlines: Deadlines,
}

impl OrderRegistry {
    pub fn new(gateway: Arc<dyn OrderGateway>, deadlines: Deadlines) -> Self {
        Self {
            gateway,
            orders: Mutex::new(AHashMap::new()),
            cancel_issued: Mutex::new(AHashSet::new()),
            place_lock: tokio::sync::Mutex::new(()),
            deadlines,
        }
    }

    fn orders(&self) -> MutexGuard<'_, AHashMap<String, Order>> {
        self.orders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_marks(&self) -> MutexGuard<'_, AHashSet<String>> {
        self.cancel_issued.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit `order` to the gateway and track it.
    ///
    /// On success `order` carries the gateway id, status and order time and
    /// is stamped with the current time. On failure it is marked `Failed` and
    /// not tracked.
    pub async fn place(&self, order: &mut Order) -> Result<GatewayReply, FtError> {
        let _guard = self.place_lock.lock().await;

        let reply = match self.gateway.submit(order).await {
            Ok(reply) => reply,
            Err(e) => {
                order.status = OrderStatus::Failed;
                warn!("[registry] place {order} failed: {e:#}");
                return Err(FtError::Gateway(format!("{e:#}")));
            }
        };

        if reply.is_error() || reply.order_id.is_empty() || reply.status == OrderStatus::Failed {
            order.status = OrderStatus::Failed;
            let reason = if reply.error.is_empty() {
                format!("gateway answered {} without an order id", reply.status)
            } else {
                reply.error.clone()
            };
            warn!("[registry] place {order} rejected: {reason}");
            return Err(FtError::Gateway(reason));
        }

        order.order_id = reply.order_id.clone();
        // An accepted order with no reported status is still in flight.
        order.status = match reply.status {
            OrderStatus::Unknown => OrderStatus::PendingSubmit,
            s => s,
        };
        order.order_time = reply.order_time;
        order.trade_time = time_util::now_ms();
        self.record(order.clone());
        info!("[registry] tracking {order}");
        Ok(reply)
    }

    /// Track an accepted order. Orders without a gateway id are ignored.
    pub fn record(&self, order: Order) {
        if !order.is_accepted() {
            warn!("[registry] refusing to track unaccepted {order}");
            return;
        }
        self.orders().insert(order.order_id.clone(), order);
    }

    pub fn lookup(&self, order_id: &str) -> Option<Order> {
        self.orders().get(order_id).cloned()
    }

    pub fn remove(&self, order_id: &str) -> Option<Order> {
        let removed = self.orders().remove(order_id);
        self.cancel_marks().remove(order_id);
        removed
    }

    pub fn len(&self) -> usize {
        self.orders().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders().is_empty()
    }

    pub fn is_cancel_issued(&self, order_id: &str) -> bool {
        self.cancel_marks().contains(order_id)
    }

    /// Merge a feed status update. Returns the merged order only when its
    /// status changed.
    pub fn apply_status(&self, update: &OrderStatusUpdate) -> Option<Order> {
        self.apply_status_at(update, time_util::now_ms())
    }

    pub fn apply_status_at(&self, update: &OrderStatusUpdate, now_ms: u64) -> Option<Order> {
        let mut orders = self.orders();
        let Some(entry) = orders.get_mut(&update.order_id) else {
            debug!("[registry] status for untracked order {}", update.order_id);
            return None;
        };
        if update.status == OrderStatus::Unknown || update.status.rank() < entry.status.rank() {
            debug!(
                "[registry] ignoring {} -> {} for {}",
                entry.status, update.status, update.order_id
            );
            return None;
        }
        self.cancel_marks().remove(&update.order_id);

        if entry.trade_time == 0 {
            entry.trade_time = now_ms;
        }
        if entry.status == update.status || entry.status.is_terminal() {
            return None;
        }

        entry.status = update.status;
        if update.order_time != 0 {
            entry.order_time = update.order_time;
        }
        if let Some(price) = update.price {
            if matches!(update.status, OrderStatus::Filled | OrderStatus::PartFilled) {
                entry.price = price;
            }
        }
        Some(entry.clone())
    }

    /// Evict finished orders and cancel overdue ones.
    ///
    /// An overdue order gets exactly one cancel per armed window: it is marked
    /// and its `trade_time` zeroed before the gateway call, and only a status
    /// update or a failed cancel clears the mark.
    pub async fn sweep(&self, now_ms: u64) -> Vec<SweepEvent> {
        let mut events = Vec::new();
        let mut overdue = Vec::new();
        {
            let mut orders = self.orders();
            let mut marks = self.cancel_marks();
            orders.retain(|id, order| {
                if order.status.is_cancellable() {
                    return true;
                }
                marks.remove(id);
                events.push(SweepEvent::Evicted(order.clone()));
                false
            });
            for (id, order) in orders.iter_mut() {
                if marks.contains(id) {
                    continue;
                }
                if elapsed_ms(order.trade_time, now_ms) > self.deadlines.for_order(order) {
                    marks.insert(id.clone());
                    order.trade_time = 0;
                    overdue.push(id.clone());
                }
            }
        }

        for order_id in overdue {
            let result = {
                let _guard = self.place_lock.lock().await;
                self.gateway.cancel(&order_id).await
            };
            let failure = match result {
                Ok(reply) if reply.is_error() => Some(reply.error),
                Ok(reply) if reply.status != OrderStatus::Cancelled => {
                    Some(format!("cancel answered {}", reply.status))
                }
                Ok(_) => None,
                Err(e) => Some(format!("{e:#}")),
            };
            match failure {
                None => {
                    info!("[registry] cancel issued for overdue order {order_id}");
                    events.push(SweepEvent::CancelIssued { order_id });
                }
                Some(reason) => {
                    self.cancel_marks().remove(&order_id);
                    warn!("[registry] cancel {order_id} failed: {reason}");
                    events.push(SweepEvent::CancelFailed { order_id, reason });
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGateway;
    use ft_core::enums::OrderAction;

    const SECS: u64 = 1000;

    fn registry(gw: &Arc<MockGateway>) -> OrderRegistry {
        OrderRegistry::new(
            gw.clone(),
            Deadlines {
                open: Duration::from_secs(10),
                close: Duration::from_secs(30),
            },
        )
    }

    fn update(id: &str, status: OrderStatus) -> OrderStatusUpdate {
        OrderStatusUpdate {
            order_id: id.into(),
            status,
            order_time: 0,
            price: None,
        }
    }

    async fn placed(reg: &OrderRegistry, action: OrderAction) -> Order {
        let mut order = Order::new("MXFL1", action, 17800.0, 1);
        reg.place(&mut order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn place_records_accepted_order() {
        let gw = Arc::new(MockGateway::new());
        let reg = registry(&gw);
        let order = placed(&reg, OrderAction::Buy).await;
        assert!(order.is_accepted());
        assert!(order.trade_time > 0);
        assert_eq!(reg.lookup(&order.order_id), Some(order.clone()));
        assert_eq!(gw.buys(), 1);
    }

    #[tokio::test]
    async fn failed_place_is_not_recorded() {
        let gw = Arc::new(MockGateway::new());
        gw.reject_next_place("insufficient margin");
        let reg = registry(&gw);
        let mut order = Order::new("MXFL1", OrderAction::SellFirst, 17800.0, 1);
        assert!(reg.place(&mut order).await.is_err());
        assert_eq!(order.status, OrderStatus::Failed);
        assert!(reg.is_empty());
        assert_eq!(gw.sells(), 1);
    }

    #[test]
    fn unaccepted_orders_are_not_recorded() {
        let gw = Arc::new(MockGateway::new());
        let reg = registry(&gw);
        reg.record(Order::new("MXFL1", OrderAction::Buy, 1.0, 1));
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn status_merge_pushes_only_changes() {
        let gw = Arc::new(MockGateway::new());
        let reg = registry(&gw);
        let order = placed(&reg, OrderAction::Buy).await;
        let id = order.order_id.as_str();

        assert_eq!(
            reg.apply_status(&update(id, OrderStatus::Submitted)).map(|o| o.status),
            Some(OrderStatus::Submitted)
        );
        assert!(reg.apply_status(&update(id, OrderStatus::Submitted)).is_none());
        let filled = reg.apply_status(&update(id, OrderStatus::Filled)).unwrap();
        assert_eq!(filled.status, OrderStatus::Filled);
        assert_eq!(filled.trade_time, order.trade_time);
        assert!(reg.apply_status(&update("nope", OrderStatus::Filled)).is_none());
        // Terminal statuses stick.
        assert!(reg.apply_status(&update(id, OrderStatus::Submitted)).is_none());
    }

    #[tokio::test]
    async fn unknown_or_backward_status_is_ignored() {
        let gw = Arc::new(MockGateway::new());
        let reg = registry(&gw);
        let order = placed(&reg, OrderAction::Buy).await;
        let id = order.order_id.as_str();
        reg.apply_status(&update(id, OrderStatus::Submitted)).unwrap();

        assert!(reg.apply_status(&update(id, OrderStatus::parse("Inactive"))).is_none());
        assert!(reg.apply_status(&update(id, OrderStatus::PreSubmitted)).is_none());
        assert_eq!(reg.lookup(id).unwrap().status, OrderStatus::Submitted);

        // Still live, so the timeout sweep cancels it instead of evicting it.
        let events = reg.sweep(order.trade_time + 11 * SECS).await;
        assert_eq!(
            events,
            vec![SweepEvent::CancelIssued {
                order_id: order.order_id.clone()
            }]
        );
        assert_eq!(gw.cancels(), 1);
    }

    #[tokio::test]
    async fn remove_clears_cancel_mark() {
        let gw = Arc::new(MockGateway::new());
        let reg = registry(&gw);
        let order = placed(&reg, OrderAction::Buy).await;
        reg.sweep(order.trade_time + 11 * SECS).await;
        assert!(reg.is_cancel_issued(&order.order_id));

        assert_eq!(reg.remove(&order.order_id).map(|o| o.order_id), Some(order.order_id.clone()));
        assert!(!reg.is_cancel_issued(&order.order_id));
        assert!(reg.remove(&order.order_id).is_none());
    }

    #[tokio::test]
    async fn fill_price_is_merged() {
        let gw = Arc::new(MockGateway::new());
        let reg = registry(&gw);
        let order = placed(&reg, OrderAction::Buy).await;
        let mut u = update(&order.order_id, OrderStatus::Filled);
        u.price = Some(17801.0);
        assert_eq!(reg.apply_status(&u).unwrap().price, 17801.0);
    }

    #[tokio::test]
    async fn overdue_order_is_cancelled_once() {
        let gw = Arc::new(MockGateway::new());
        let reg = registry(&gw);
        let order = placed(&reg, OrderAction::Buy).await;
        let t0 = order.trade_time;

        assert!(reg.sweep(t0 + 5 * SECS).await.is_empty());
        assert_eq!(gw.cancels(), 0);

        let events = reg.sweep(t0 + 11 * SECS).await;
        assert_eq!(
            events,
            vec![SweepEvent::CancelIssued {
                order_id: order.order_id.clone()
            }]
        );
        assert_eq!(gw.cancels(), 1);
        assert!(reg.is_cancel_issued(&order.order_id));
        assert_eq!(reg.lookup(&order.order_id).unwrap().trade_time, 0);

        // No response yet: no second cancel.
        assert!(reg.sweep(t0 + 12 * SECS).await.is_empty());
        assert!(reg.sweep(t0 + 60 * SECS).await.is_empty());
        assert_eq!(gw.cancels(), 1);
    }

    #[tokio::test]
    async fn status_update_rearms_cancelled_window() {
        let gw = Arc::new(MockGateway::new());
        let reg = registry(&gw);
        let order = placed(&reg, OrderAction::Buy).await;
        let t0 = order.trade_time;
        reg.sweep(t0 + 11 * SECS).await;

        let rearm = t0 + 12 * SECS;
        reg.apply_status_at(&update(&order.order_id, OrderStatus::Submitted), rearm);
        assert!(!reg.is_cancel_issued(&order.order_id));
        assert_eq!(reg.lookup(&order.order_id).unwrap().trade_time, rearm);

        assert!(reg.sweep(rearm + 5 * SECS).await.is_empty());
        reg.sweep(rearm + 11 * SECS).await;
        assert_eq!(gw.cancels(), 2);
    }

    #[tokio::test]
    async fn failed_cancel_is_retried() {
        let gw = Arc::new(MockGateway::new());
        let reg = registry(&gw);
        let order = placed(&reg, OrderAction::Buy).await;
        let t0 = order.trade_time;

        gw.fail_next_cancel("order not found");
        let events = reg.sweep(t0 + 11 * SECS).await;
        assert!(matches!(events[0], SweepEvent::CancelFailed { .. }));
        assert!(!reg.is_cancel_issued(&order.order_id));
        assert!(reg.lookup(&order.order_id).is_some());

        let events = reg.sweep(t0 + 12 * SECS).await;
        assert!(matches!(events[0], SweepEvent::CancelIssued { .. }));
        assert_eq!(gw.cancels(), 2);
    }

    #[tokio::test]
    async fn closing_legs_use_their_own_deadline() {
        let gw = Arc::new(MockGateway::new());
        let reg = registry(&gw);
        let order = placed(&reg, OrderAction::Sell).await;
        let t0 = order.trade_time;
        assert!(reg.sweep(t0 + 11 * SECS).await.is_empty());
        assert_eq!(reg.sweep(t0 + 31 * SECS).await.len(), 1);
    }

    #[tokio::test]
    async fn finished_orders_are_evicted() {
        let gw = Arc::new(MockGateway::new());
        let reg = registry(&gw);
        let order = placed(&reg, OrderAction::Buy).await;
        reg.apply_status(&update(&order.order_id, OrderStatus::Filled));

        let events = reg.sweep(order.trade_time + SECS).await;
        assert!(matches!(&events[0], SweepEvent::Evicted(o) if o.order_id == order.order_id));
        assert!(reg.is_empty());
        assert_eq!(gw.cancels(), 0);
    }
}
