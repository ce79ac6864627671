//! REST client of the snapshot service.
//!
//! | Snapshot    | Method | Path                                   |
//! |-------------|--------|----------------------------------------|
//! | Trade index | GET    | `/api/v1/trade-index`                  |
//! | Positions   | GET    | `/api/v1/positions`                    |
//! | K-bars      | GET    | `/api/v1/kbars?code=MXFL1&days=2`      |

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ft_core::types::{KBar, Position, TradeIndex};
use serde::de::DeserializeOwned;

use crate::SnapshotSource;

/// Snapshot service client.
pub struct RestSnapshots {
    http: reqwest::Client,
    base_url: String,
}

impl RestSnapshots {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build snapshot HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let value = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("snapshot request {path} failed"))?
            .error_for_status()
            .with_context(|| format!("snapshot {path} HTTP error"))?
            .json()
            .await
            .with_context(|| format!("snapshot {path} returned invalid JSON"))?;
        Ok(value)
    }
}

#[async_trait]
impl SnapshotSource for RestSnapshots {
    async fn trade_index(&self) -> Result<TradeIndex> {
        self.get("/api/v1/trade-index", &[]).await
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        self.get("/api/v1/positions", &[]).await
    }

    async fn kbars(&self, code: &str, days: u32) -> Result<Vec<KBar>> {
        self.get(
            "/api/v1/kbars",
            &[("code", code.to_string()), ("days", days.to_string())],
        )
        .await
    }
}
