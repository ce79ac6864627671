//! Core data types shared by every crate: enums, orders and market data.

pub mod enums;
pub mod market_data;
pub mod trading;

pub use enums::*;
pub use market_data::*;
pub use trading::*;
