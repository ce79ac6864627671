//! Events carried on a session's in-process bus.

use ft_core::bus::Bus;
use ft_core::types::Order;

#[derive(Debug, Clone, PartialEq)]
pub enum TradeEvent {
    /// An order's merged status changed.
    OrderStatus(Order),
    /// An assist trader placed a closing order.
    PlaceOrder(Order),
    /// An assist trader closed its whole position.
    AssistDone { primary_order_id: String },
    /// An assist trader could not place its closing order.
    AssistFailed {
        primary_order_id: String,
        reason: String,
    },
}

pub type TradeBus = Bus<TradeEvent>;
