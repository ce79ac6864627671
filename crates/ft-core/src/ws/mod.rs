//! WebSocket client with auto-reconnect.

pub mod client;

pub use client::{OnMessageCallback, PingPayload, ResubscribeCallback, WsConnConfig, WsConnection};
