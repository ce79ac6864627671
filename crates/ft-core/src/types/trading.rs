//! Trading-related data structures: orders, gateway replies, positions and
//! the automation options attached to assisted orders.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::enums::{AutomationType, OrderAction, OrderStatus};

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// A futures order, from the moment it is built until it reaches a terminal
/// status.
///
/// `order_id` stays empty until the gateway accepts the order. `trade_time` is
/// the local wall clock (ms since epoch) of the last status transition; `0`
/// means a cancel request is outstanding and not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub group_id: String,
    pub code: String,
    pub action: OrderAction,
    pub price: f64,
    pub quantity: i64,
    pub status: OrderStatus,
    /// Gateway-assigned order time (ms since epoch, `0` if unknown).
    pub order_time: i64,
    #[serde(skip)]
    pub trade_time: u64,
    /// `true` for client-initiated orders, `false` for system ones.
    pub manual: bool,
}

impl Order {
    /// A not-yet-placed order.
    pub fn new(code: &str, action: OrderAction, price: f64, quantity: i64) -> Self {
        Self {
            order_id: String::new(),
            group_id: String::new(),
            code: code.to_string(),
            action,
            price,
            quantity,
            status: OrderStatus::Unknown,
            order_time: 0,
            trade_time: 0,
            manual: false,
        }
    }

    /// Whether the gateway has accepted this order.
    pub fn is_accepted(&self) -> bool {
        !self.order_id.is_empty()
    }

    /// `true` if this order, as a primary leg, holds a long position.
    pub fn is_long(&self) -> bool {
        matches!(self.action, OrderAction::Buy | OrderAction::BuyLater)
    }
}

impl std::fmt::Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Order({} {} {} {:.2}x{} {} id={})",
            self.code, self.action, self.group_id, self.price, self.quantity, self.status, self.order_id
        )
    }
}

// ---------------------------------------------------------------------------
// Gateway reply (gateway → registry)
// ---------------------------------------------------------------------------

/// Result of a buy / sell / cancel call on the brokerage gateway.
///
/// A non-empty `error` is an explicit rejection even when the call itself
/// succeeded at the transport level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayReply {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub error: String,
    /// Order time assigned by the gateway (ms since epoch).
    #[serde(default)]
    pub order_time: i64,
}

impl GatewayReply {
    /// Whether the gateway flagged the request as failed.
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Order status update (market data bus → registry)
// ---------------------------------------------------------------------------

/// A status change pushed by the market-data bus for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusUpdate {
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub order_time: i64,
    /// Fill price, when the brokerage reports one.
    #[serde(default)]
    pub price: Option<f64>,
}

// ---------------------------------------------------------------------------
// Automation
// ---------------------------------------------------------------------------

/// Trigger policy attached to an assisted order.
///
/// `by_balance_high` / `by_balance_low` are price offsets from the primary
/// fill price; `by_time_period_secs` bounds how long the position may stay
/// open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HalfAutomationOption {
    pub automation_type: AutomationType,
    #[serde(default)]
    pub by_balance_high: f64,
    #[serde(default)]
    pub by_balance_low: f64,
    #[serde(default)]
    pub by_time_period_secs: u64,
}

impl HalfAutomationOption {
    pub fn time_period(&self) -> Duration {
        Duration::from_secs(self.by_time_period_secs)
    }
}

/// A primary order together with the policy that closes it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistTarget {
    pub order: Order,
    pub option: HalfAutomationOption,
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A position snapshot from the brokerage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub code: String,
    /// `"Buy"` or `"Sell"`, as reported by the brokerage.
    pub direction: String,
    pub quantity: i64,
    /// Average entry price.
    pub price: f64,
    pub last_price: f64,
    pub pnl: f64,
}
