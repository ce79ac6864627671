//! Typed error definitions for the futures trading engine.
//!
//! Provides [`FtError`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. All variants implement `std::error::Error`
//! via `thiserror`, so they integrate with `anyhow::Result`.

use thiserror::Error;

/// Domain-specific errors for the futures trading engine.
#[derive(Debug, Error)]
pub enum FtError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// The brokerage gateway could not be reached or rejected the request.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Market data feed subscription error.
    #[error("feed error: {0}")]
    Feed(String),

    /// Malformed client protocol message.
    #[error("protocol error: {0}")]
    Protocol(String),
}
