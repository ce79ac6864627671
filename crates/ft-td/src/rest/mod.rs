//! REST client for the brokerage trade-execution gateway.
//!
//! # REST endpoints
//!
//! | Operation | Method | Path                    |
//! |-----------|--------|-------------------------|
//! | Buy       | POST   | `/api/v1/order/buy`     |
//! | Sell      | POST   | `/api/v1/order/sell`    |
//! | Cancel    | POST   | `/api/v1/order/cancel`  |
//!
//! Parameters travel as a signed query string (see [`auth`]); the API key
//! goes in the `X-API-KEY` header. Every endpoint answers with
//! `{"order_id": "...", "status": "...", "error": "..."}`.

pub mod auth;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ft_core::config::GatewayConfig;
use ft_core::enums::OrderStatus;
use ft_core::time_util;
use ft_core::trading::{GatewayReply, Order};
use tracing::{debug, info, warn};

use crate::OrderGateway;

/// Signed REST client for the brokerage gateway.
///
/// `reqwest::Client` pools connections internally, so a single instance can
/// serve every task in the process.
pub struct RestGateway {
    http: reqwest::Client,
    api_key: String,
    secret_key: String,
    base_url: String,
}

impl RestGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build gateway HTTP client")?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// POST a signed request to `path` and parse the gateway reply.
    async fn post_signed(&self, path: &str, params: &[(&str, &str)]) -> Result<GatewayReply> {
        let timestamp = time_util::now_ms().to_string();
        let mut signed: Vec<(&str, &str)> = params.to_vec();
        signed.push(("timestamp", &timestamp));
        let query = auth::build_signed_query(&signed, &self.secret_key);
        let url = format!("{}{path}?{query}", self.base_url);

        let body: serde_json::Value = self
            .http
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .send()
            .await
            .with_context(|| format!("gateway request {path} failed"))?
            .error_for_status()
            .with_context(|| format!("gateway {path} HTTP error"))?
            .json()
            .await
            .with_context(|| format!("gateway {path} returned invalid JSON"))?;

        debug!("[gateway] {path} -> {body}");
        Ok(parse_reply(&body))
    }

    async fn place(&self, path: &str, order: &Order) -> Result<GatewayReply> {
        let price = order.price.to_string();
        let quantity = order.quantity.to_string();
        let reply = self
            .post_signed(
                path,
                &[
                    ("code", order.code.as_str()),
                    ("price", &price),
                    ("quantity", &quantity),
                ],
            )
            .await?;

        if reply.is_error() {
            warn!(
                "[gateway] {} {} {}x{} rejected: {}",
                order.action, order.code, order.price, order.quantity, reply.error
            );
        } else {
            info!(
                "[gateway] order placed: {} {} {}x{} → id={} status={}",
                order.action, order.code, order.price, order.quantity, reply.order_id, reply.status
            );
        }
        Ok(reply)
    }
}

#[async_trait]
impl OrderGateway for RestGateway {
    async fn buy(&self, order: &Order) -> Result<GatewayReply> {
        self.place("/api/v1/order/buy", order).await
    }

    async fn sell(&self, order: &Order) -> Result<GatewayReply> {
        self.place("/api/v1/order/sell", order).await
    }

    async fn cancel(&self, order_id: &str) -> Result<GatewayReply> {
        let reply = self
            .post_signed("/api/v1/order/cancel", &[("order_id", order_id)])
            .await?;
        info!(
            "[gateway] cancel {order_id} → status={} error={:?}",
            reply.status, reply.error
        );
        Ok(reply)
    }
}

// ---------------------------------------------------------------------------
// JSON → typed helpers
// ---------------------------------------------------------------------------

/// Parse a gateway reply body. Missing fields fall back to their defaults.
fn parse_reply(v: &serde_json::Value) -> GatewayReply {
    GatewayReply {
        order_id: v
            .get("order_id")
            .and_then(|id| id.as_str())
            .unwrap_or_default()
            .to_string(),
        status: v
            .get("status")
            .and_then(|s| s.as_str())
            .map(OrderStatus::parse)
            .unwrap_or_default(),
        error: v
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or_default()
            .to_string(),
        order_time: v.get("order_time").and_then(|t| t.as_i64()).unwrap_or(0),
    }
}
