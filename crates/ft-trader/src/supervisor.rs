//! Periodic registry sweep.

use std::sync::Arc;
use std::time::Duration;

use ft_core::time_util;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::protocol::{ErrorCode, OutboundSender, ServerMessage};
use crate::registry::{OrderRegistry, SweepEvent};

/// Sweeps the registry on a fixed period, cancelling overdue orders and
/// reporting failed cancels to the client.
pub struct TimeoutSupervisor {
    registry: Arc<OrderRegistry>,
    interval: Duration,
    out: OutboundSender,
}

impl TimeoutSupervisor {
    pub fn new(registry: Arc<OrderRegistry>, interval: Duration, out: OutboundSender) -> Self {
        Self {
            registry,
            interval,
            out,
        }
    }

    /// Run one sweep and report its outcome.
    pub async fn sweep_once(&self, now_ms: u64) {
        for event in self.registry.sweep(now_ms).await {
            match event {
                SweepEvent::Evicted(order) => debug!("[supervisor] evicted {order}"),
                SweepEvent::CancelIssued { order_id } => {
                    info!("[supervisor] overdue order {order_id} cancelled")
                }
                SweepEvent::CancelFailed { order_id, reason } => {
                    let _ = self.out.send(
                        ServerMessage::error(
                            ErrorCode::CancelFailed,
                            format!("cancel {order_id} failed: {reason}"),
                        )
                        .into(),
                    );
                }
            }
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => self.sweep_once(time_util::now_ms()).await,
            }
        }
        debug!("[supervisor] stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Outbound;
    use crate::registry::Deadlines;
    use crate::testing::MockGateway;
    use ft_core::enums::OrderAction;
    use ft_core::types::Order;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn failed_cancel_is_reported() {
        let gw = Arc::new(MockGateway::new());
        let registry = Arc::new(OrderRegistry::new(
            gw.clone(),
            Deadlines {
                open: Duration::from_secs(10),
                close: Duration::from_secs(30),
            },
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sup = TimeoutSupervisor::new(registry.clone(), Duration::from_secs(1), tx);

        let mut order = Order::new("MXFL1", OrderAction::Buy, 17800.0, 1);
        registry.place(&mut order).await.unwrap();
        gw.fail_next_cancel("rejected");
        sup.sweep_once(order.trade_time + 11_000).await;

        match rx.try_recv().unwrap() {
            Outbound::Message(ServerMessage::Error(e)) => {
                assert_eq!(e.code, ErrorCode::CancelFailed.code());
                assert!(e.text.contains(&order.order_id));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(registry.lookup(&order.order_id).is_some());
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let gw = Arc::new(MockGateway::new());
        let registry = Arc::new(OrderRegistry::new(
            gw,
            Deadlines {
                open: Duration::from_secs(10),
                close: Duration::from_secs(30),
            },
        ));
        let (tx, _rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(
            TimeoutSupervisor::new(registry, Duration::from_millis(10), tx).run(stop_rx),
        );
        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
