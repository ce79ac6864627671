//! # ft-trader
//!
//! Order execution and assist trading for client sessions.
//!
//! - [`server`]: client-facing WebSocket server, one session per connection
//! - [`session`]: session router (guard chain, unit-order expansion, relays)
//! - [`registry`] / [`supervisor`]: in-flight order tracking and timeout
//!   cancellation
//! - [`assist`]: per-position assist traders that place the closing leg
//! - [`protocol`]: client wire format and error codes
//! - `testing`: in-memory gateway, feed and snapshot source (tests and the
//!   `testing` feature only)

pub mod admission;
pub mod assist;
pub mod events;
pub mod hours;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod supervisor;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod waiting;

pub use server::TradeServer;
pub use session::{SessionDeps, SessionRouter};
