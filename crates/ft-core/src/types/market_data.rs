//! Market data structures: ticks, K-bars and index snapshots.
//!
//! # Timestamp convention
//!
//! All timestamps are in **milliseconds since Unix epoch** (ms).

use serde::{Deserialize, Serialize};

use super::enums::TickType;

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// A single futures trade print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Tick {
    pub code: String,
    pub time: i64,
    #[serde(default)]
    pub open: f64,
    pub close: f64,
    #[serde(default)]
    pub high: f64,
    #[serde(default)]
    pub low: f64,
    /// Volume of this print.
    #[serde(default)]
    pub volume: i64,
    /// Cumulative volume of the session.
    #[serde(default)]
    pub total_volume: i64,
    #[serde(default)]
    pub tick_type: TickType,
}

// ---------------------------------------------------------------------------
// KBar
// ---------------------------------------------------------------------------

/// One-minute OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KBar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

// ---------------------------------------------------------------------------
// Trade index
// ---------------------------------------------------------------------------

/// Snapshot of one market index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub price: f64,
    pub change: f64,
    pub change_rate: f64,
    #[serde(default)]
    pub break_out: bool,
}

/// The indexes an operator watches while trading the futures contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TradeIndex {
    pub tse: IndexStatus,
    pub otc: IndexStatus,
    pub nasdaq: IndexStatus,
    pub nf: IndexStatus,
}

// ---------------------------------------------------------------------------
// Display impls
// ---------------------------------------------------------------------------

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = match self.tick_type {
            TickType::Buy => "BUY",
            TickType::Sell => "SELL",
        };
        write!(
            f,
            "Tick({} {side} {:.2}x{} total={} t={})",
            self.code, self.close, self.volume, self.total_volume, self.time
        )
    }
}
