//! Enumerations used throughout the futures trading engine.
//!
//! All enums serialize with their variant names (`"Buy"`, `"SellFirst"`,
//! `"PendingSubmit"`, ...) so the same strings appear on the brokerage
//! gateway, the market-data bus and the client protocol.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Order action
// ---------------------------------------------------------------------------

/// What an order does to the position.
///
/// `Buy` / `SellFirst` open a position (long / short); `Sell` / `BuyLater`
/// close it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderAction {
    Buy,
    Sell,
    SellFirst,
    BuyLater,
}

impl OrderAction {
    /// `true` for the legs that open a position.
    pub fn is_opening(self) -> bool {
        matches!(self, Self::Buy | Self::SellFirst)
    }

    /// `true` if the gateway executes this action as a buy.
    pub fn is_buy_side(self) -> bool {
        matches!(self, Self::Buy | Self::BuyLater)
    }

    /// The action that closes (or re-opens) the leg created by `self`.
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
            Self::SellFirst => Self::BuyLater,
            Self::BuyLater => Self::SellFirst,
        }
    }
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "Buy"),
            Self::Sell => write!(f, "Sell"),
            Self::SellFirst => write!(f, "SellFirst"),
            Self::BuyLater => write!(f, "BuyLater"),
        }
    }
}

// ---------------------------------------------------------------------------
// Order status
// ---------------------------------------------------------------------------

/// Order status as reported by the brokerage.
///
/// Progresses `Unknown → PendingSubmit → PreSubmitted → Submitted` and ends in
/// one of `Filled`, `PartFilled`, `Cancelled`, `Failed`. Of those, only
/// `PartFilled` can still move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    #[default]
    Unknown,
    PendingSubmit,
    PreSubmitted,
    Submitted,
    Filled,
    PartFilled,
    Cancelled,
    Failed,
}

impl OrderStatus {
    /// Whether a cancel request for an order in this status is meaningful.
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            Self::PendingSubmit | Self::PreSubmitted | Self::Submitted | Self::PartFilled
        )
    }

    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Failed)
    }

    /// Position in the finality order. A status never moves to a lower rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::PendingSubmit => 1,
            Self::PreSubmitted => 2,
            Self::Submitted => 3,
            Self::PartFilled => 4,
            Self::Filled | Self::Cancelled | Self::Failed => 5,
        }
    }

    /// Map a gateway status string (case-insensitive) to a status.
    ///
    /// Unrecognized strings map to [`OrderStatus::Unknown`].
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "pendingsubmit" | "pending_submit" => Self::PendingSubmit,
            "presubmitted" | "pre_submitted" => Self::PreSubmitted,
            "submitted" => Self::Submitted,
            "filled" => Self::Filled,
            "partfilled" | "part_filled" | "partially_filled" => Self::PartFilled,
            "cancelled" | "canceled" => Self::Cancelled,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Tick direction
// ---------------------------------------------------------------------------

/// Which side of the book a tick traded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TickType {
    /// Traded at the ask (outer).
    #[default]
    Buy,
    /// Traded at the bid (inner).
    Sell,
}

// ---------------------------------------------------------------------------
// Automation
// ---------------------------------------------------------------------------

/// Trigger policy of an assist trader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AutomationType {
    ByBalance,
    ByTimePeriod,
    ByTimePeriodAndBalance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellable_set() {
        assert!(OrderStatus::PendingSubmit.is_cancellable());
        assert!(OrderStatus::PreSubmitted.is_cancellable());
        assert!(OrderStatus::Submitted.is_cancellable());
        assert!(OrderStatus::PartFilled.is_cancellable());
        assert!(!OrderStatus::Unknown.is_cancellable());
        assert!(!OrderStatus::Filled.is_cancellable());
        assert!(!OrderStatus::Cancelled.is_cancellable());
        assert!(!OrderStatus::Failed.is_cancellable());
    }

    #[test]
    fn terminal_set() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::PartFilled.is_terminal());
        assert!(!OrderStatus::Submitted.is_terminal());
    }

    #[test]
    fn finality_rank() {
        assert!(OrderStatus::Unknown.rank() < OrderStatus::PendingSubmit.rank());
        assert!(OrderStatus::PreSubmitted.rank() < OrderStatus::Submitted.rank());
        assert!(OrderStatus::Submitted.rank() < OrderStatus::PartFilled.rank());
        assert!(OrderStatus::PartFilled.rank() < OrderStatus::Filled.rank());
        assert_eq!(OrderStatus::Cancelled.rank(), OrderStatus::Failed.rank());
    }

    #[test]
    fn parse_gateway_strings() {
        assert_eq!(OrderStatus::parse("Filled"), OrderStatus::Filled);
        assert_eq!(OrderStatus::parse("CANCELED"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::parse("PendingSubmit"), OrderStatus::PendingSubmit);
        assert_eq!(OrderStatus::parse("whatever"), OrderStatus::Unknown);
    }

    #[test]
    fn opposite_actions() {
        assert_eq!(OrderAction::Buy.opposite(), OrderAction::Sell);
        assert_eq!(OrderAction::SellFirst.opposite(), OrderAction::BuyLater);
        assert!(OrderAction::BuyLater.is_buy_side());
        assert!(!OrderAction::SellFirst.is_buy_side());
        assert!(OrderAction::SellFirst.is_opening());
        assert!(!OrderAction::Sell.is_opening());
    }
}
