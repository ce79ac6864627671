//! Configuration parsing for the futures trading engine.
//!
//! Every component reads its settings from a single JSON config file. Only
//! the gateway credentials and the service URLs are mandatory; everything
//! else has a production default.
//!
//! # Example config
//!
//! ```json
//! {
//!   "meta": { "module_name": "ft-runner", "log_path": "/var/log/ft" },
//!   "server": { "listen_addr": "0.0.0.0:8080" },
//!   "gateway": {
//!     "base_url": "http://127.0.0.1:6670",
//!     "api_key": "...",
//!     "secret_key": "..."
//!   },
//!   "feed": {
//!     "bus_url": "ws://127.0.0.1:6671/ws",
//!     "snapshot_url": "http://127.0.0.1:6671"
//!   },
//!   "trade": {
//!     "instrument_code": "MXFL1",
//!     "open_timeout_secs": 10,
//!     "close_timeout_secs": 30,
//!     "trading_hours": [
//!       { "start": "08:45", "end": "13:45" },
//!       { "start": "15:00", "end": "05:00" }
//!     ]
//!   }
//! }
//! ```

use std::time::Duration;

use chrono::NaiveTime;
use serde::Deserialize;

use crate::error::FtError;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    #[serde(default)]
    pub meta: ModuleMeta,

    /// Client-facing WebSocket server.
    #[serde(default)]
    pub server: ServerConfig,

    /// Brokerage trade-execution gateway.
    pub gateway: GatewayConfig,

    /// Market-data bus and snapshot service.
    pub feed: FeedConfig,

    /// Order execution and assist-trading parameters.
    #[serde(default)]
    pub trade: TradeConfig,
}

impl AppConfig {
    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), FtError> {
        if self.gateway.base_url.is_empty() {
            return Err(FtError::Config("gateway.base_url is empty".into()));
        }
        if self.feed.bus_url.is_empty() {
            return Err(FtError::Config("feed.bus_url is empty".into()));
        }
        if self.trade.instrument_code.is_empty() {
            return Err(FtError::Config("trade.instrument_code is empty".into()));
        }
        if self.trade.max_order_quantity <= 0 {
            return Err(FtError::Config("trade.max_order_quantity must be > 0".into()));
        }
        if self.trade.sweep_interval_ms == 0 {
            return Err(FtError::Config("trade.sweep_interval_ms must be > 0".into()));
        }
        for window in &self.trade.trading_hours {
            window.parse()?;
        }
        Ok(())
    }
}

/// Module metadata block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Client-facing WebSocket server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Brokerage gateway credentials and endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// REST base URL (e.g. `http://127.0.0.1:6670`).
    pub base_url: String,

    /// API key sent in the `X-API-KEY` header.
    pub api_key: String,

    /// Secret for HMAC-SHA256 request signing.
    pub secret_key: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_gateway_timeout_ms")]
    pub timeout_ms: u64,
}

/// Market-data bus settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// WebSocket URL of the market-data bus.
    pub bus_url: String,

    /// REST base URL of the snapshot service (trade index, positions, K-bars).
    #[serde(default)]
    pub snapshot_url: String,

    /// Keep-alive ping interval in seconds.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

/// A daily window during which orders may be placed, as `"HH:MM"` local
/// time. A window whose end is before its start wraps past midnight.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradingWindow {
    pub start: String,
    pub end: String,
}

impl TradingWindow {
    pub fn parse(&self) -> Result<(NaiveTime, NaiveTime), FtError> {
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s, "%H:%M")
                .map_err(|e| FtError::Config(format!("bad trading hour {s:?}: {e}")))
        };
        Ok((parse(&self.start)?, parse(&self.end)?))
    }
}

/// Order execution and assist-trading parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeConfig {
    /// Instrument every session trades (e.g. `MXFL1`).
    #[serde(default = "default_instrument_code")]
    pub instrument_code: String,

    /// Seconds an opening leg may sit unfilled before it is cancelled.
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,

    /// Seconds a closing leg may sit unfilled before it is cancelled.
    #[serde(default = "default_close_timeout_secs")]
    pub close_timeout_secs: u64,

    /// Timeout sweep / assist promotion period in milliseconds.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Trade-index push period in seconds.
    #[serde(default = "default_trade_index_interval_secs")]
    pub trade_index_interval_secs: u64,

    /// Position snapshot push period in seconds.
    #[serde(default = "default_position_interval_secs")]
    pub position_interval_secs: u64,

    /// K-bar refresh period in seconds.
    #[serde(default = "default_kbar_interval_secs")]
    pub kbar_interval_secs: u64,

    /// Number of trade days of K-bars sent on backfill.
    #[serde(default = "default_kbar_days")]
    pub kbar_days: u32,

    /// Largest quantity a single assisted command may request.
    #[serde(default = "default_max_assist_quantity")]
    pub max_assist_quantity: i64,

    /// Largest quantity any single command may request.
    #[serde(default = "default_max_order_quantity")]
    pub max_order_quantity: i64,

    /// Windows during which order placement is permitted.
    #[serde(default = "default_trading_hours")]
    pub trading_hours: Vec<TradingWindow>,
}

impl TradeConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            instrument_code: default_instrument_code(),
            open_timeout_secs: default_open_timeout_secs(),
            close_timeout_secs: default_close_timeout_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            trade_index_interval_secs: default_trade_index_interval_secs(),
            position_interval_secs: default_position_interval_secs(),
            kbar_interval_secs: default_kbar_interval_secs(),
            kbar_days: default_kbar_days(),
            max_assist_quantity: default_max_assist_quantity(),
            max_order_quantity: default_max_order_quantity(),
            trading_hours: default_trading_hours(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_listen_addr() -> String {
    "0.0.0.0:8080".into()
}

fn default_gateway_timeout_ms() -> u64 {
    5000
}

fn default_ping_interval_secs() -> u64 {
    20
}

fn default_instrument_code() -> String {
    "MXFL1".into()
}

fn default_open_timeout_secs() -> u64 {
    10
}

fn default_close_timeout_secs() -> u64 {
    30
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_trade_index_interval_secs() -> u64 {
    3
}

fn default_position_interval_secs() -> u64 {
    5
}

fn default_kbar_interval_secs() -> u64 {
    60
}

fn default_kbar_days() -> u32 {
    2
}

fn default_max_assist_quantity() -> i64 {
    4
}

fn default_max_order_quantity() -> i64 {
    20
}

/// TAIFEX day and night sessions.
fn default_trading_hours() -> Vec<TradingWindow> {
    vec![
        TradingWindow {
            start: "08:45".into(),
            end: "13:45".into(),
        },
        TradingWindow {
            start: "15:00".into(),
            end: "05:00".into(),
        },
    ]
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
