//! # ft-core
//!
//! Core crate for the futures trading engine, providing:
//!
//! - **Types** (`types`): order actions and statuses, orders, ticks, K-bars,
//!   automation options
//! - **Event bus** (`bus`): typed in-process publish/subscribe
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): domain-specific `FtError` via thiserror
//! - **WebSocket** (`ws`): WS client with auto-reconnect
//! - **Time utilities** (`time_util`): epoch-millisecond clock helpers
//! - **Logging** (`logging`): tracing-based structured logging

pub mod bus;
pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
