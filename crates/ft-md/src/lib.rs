//! # ft-md
//!
//! Market data for the futures trading engine.
//!
//! Two seams are defined here and consumed by the session router:
//!
//! - [`MarketDataFeed`]: live ticks for one instrument and live order-status
//!   updates, both keyed by a per-session connection id.
//! - [`SnapshotSource`]: periodic snapshots (trade index, positions, K-bars).
//!
//! ## Implementations
//!
//! - [`bus_feed::BusFeed`]: WebSocket client of the market-data bus
//! - [`snapshot::RestSnapshots`]: REST client of the snapshot service
//!
//! ## Shared infrastructure
//!
//! - [`json_parser`]: bus message parsing and subscription messages
//! - [`json_util`]: JSON parsing helpers

pub mod bus_feed;
pub mod json_parser;
pub mod json_util;
pub mod snapshot;

use anyhow::Result;
use async_trait::async_trait;
use ft_core::types::{KBar, OrderStatusUpdate, Position, Tick, TradeIndex};
use tokio::sync::mpsc::UnboundedReceiver;

/// Live tick stream for one subscription.
pub type TickReceiver = UnboundedReceiver<Tick>;

/// Live order-status stream for one subscription.
pub type OrderStatusReceiver = UnboundedReceiver<OrderStatusUpdate>;

/// Trait implemented by market data feeds.
///
/// Subscriptions are keyed by the caller's connection id; one
/// [`unsubscribe`](MarketDataFeed::unsubscribe) releases all of them. The
/// returned receivers end (yield `None`) once unsubscribed.
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Subscribe `conn_id` to the ticks of instrument `code`.
    async fn subscribe_ticks(&self, conn_id: &str, code: &str) -> Result<TickReceiver>;

    /// Subscribe `conn_id` to order-status updates.
    async fn subscribe_order_status(&self, conn_id: &str) -> Result<OrderStatusReceiver>;

    /// Release every subscription held by `conn_id`. Unknown ids are a no-op.
    async fn unsubscribe(&self, conn_id: &str) -> Result<()>;
}

/// Trait implemented by snapshot services.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Current index snapshot.
    async fn trade_index(&self) -> Result<TradeIndex>;

    /// Current futures positions of the account.
    async fn positions(&self) -> Result<Vec<Position>>;

    /// One-minute K-bars of `code` over the last `days` trade days.
    async fn kbars(&self, code: &str, days: u32) -> Result<Vec<KBar>>;
}
