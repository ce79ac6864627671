//! # ft-td
//!
//! Order execution against the brokerage trade-execution gateway.
//!
//! The [`OrderGateway`] trait is the only seam the rest of the engine sees:
//! buy, sell and cancel by order, each answering with the gateway's order id,
//! status and error text. [`rest::RestGateway`] implements it over the
//! gateway's signed REST API.

pub mod rest;

use anyhow::Result;
use async_trait::async_trait;
use ft_core::trading::{GatewayReply, Order};

/// Trait implemented by every brokerage gateway client.
///
/// All methods take `&self` so one client can be shared by the session
/// router, the timeout supervisor and every assist trader concurrently.
///
/// A transport failure is an `Err`; an order the gateway refused comes back
/// as `Ok` with a non-empty [`GatewayReply::error`].
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit a buy-side order (`Buy` or `BuyLater`).
    async fn buy(&self, order: &Order) -> Result<GatewayReply>;

    /// Submit a sell-side order (`Sell` or `SellFirst`).
    async fn sell(&self, order: &Order) -> Result<GatewayReply>;

    /// Cancel an accepted order by id.
    async fn cancel(&self, order_id: &str) -> Result<GatewayReply>;

    /// Route `order` to [`buy`](OrderGateway::buy) or
    /// [`sell`](OrderGateway::sell) according to its action.
    async fn submit(&self, order: &Order) -> Result<GatewayReply> {
        if order.action.is_buy_side() {
            self.buy(order).await
        } else {
            self.sell(order).await
        }
    }
}
