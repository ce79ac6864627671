//! Guard chain applied to every client command before any order is placed.
//!
//! Guards run in a fixed order and the first failing one decides the
//! rejection, so a command always yields at most one error.

use thiserror::Error;

use crate::protocol::{ClientCommand, ErrorCode};

/// Why a command was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("outside trading hours")]
    NotTradingHours,
    #[error("{0} previous order(s) still pending")]
    OrderPending(usize),
    #[error("assist trader still running")]
    AssistBusy,
    #[error("assisted orders are limited to quantity {max}, got {quantity}")]
    AssistQuantity { max: i64, quantity: i64 },
    #[error("orders are limited to quantity {max}, got {quantity}")]
    OrderQuantity { max: i64, quantity: i64 },
}

impl Rejection {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotTradingHours => ErrorCode::NotTradingHours,
            Self::OrderPending(_) => ErrorCode::OrderPending,
            Self::AssistBusy => ErrorCode::AssistBusy,
            Self::AssistQuantity { .. } => ErrorCode::AssistQuantity,
            Self::OrderQuantity { .. } => ErrorCode::DecodeFailed,
        }
    }
}

/// Session state the guards look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionState {
    pub in_trading_hours: bool,
    pub waiting_orders: usize,
    /// Open assist tick queues plus assisted orders awaiting their fill.
    pub assists: usize,
    pub max_assist_quantity: i64,
    pub max_order_quantity: i64,
}

pub fn admit(cmd: &ClientCommand, state: &AdmissionState) -> Result<(), Rejection> {
    if !state.in_trading_hours {
        return Err(Rejection::NotTradingHours);
    }
    if state.waiting_orders > 0 {
        return Err(Rejection::OrderPending(state.waiting_orders));
    }
    if state.assists > 0 {
        return Err(Rejection::AssistBusy);
    }
    if cmd.automation_option.is_some() && cmd.quantity > state.max_assist_quantity {
        return Err(Rejection::AssistQuantity {
            max: state.max_assist_quantity,
            quantity: cmd.quantity,
        });
    }
    if cmd.quantity > state.max_order_quantity {
        return Err(Rejection::OrderQuantity {
            max: state.max_order_quantity,
            quantity: cmd.quantity,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ft_core::enums::{AutomationType, OrderAction};
    use ft_core::types::HalfAutomationOption;

    fn cmd(quantity: i64, assisted: bool) -> ClientCommand {
        ClientCommand {
            instrument_code: "MXFL1".into(),
            action: OrderAction::Buy,
            price: 17800.0,
            quantity,
            automation_option: assisted.then_some(HalfAutomationOption {
                automation_type: AutomationType::ByTimePeriod,
                by_balance_high: 0.0,
                by_balance_low: 0.0,
                by_time_period_secs: 300,
            }),
        }
    }

    fn open() -> AdmissionState {
        AdmissionState {
            in_trading_hours: true,
            waiting_orders: 0,
            assists: 0,
            max_assist_quantity: 4,
            max_order_quantity: 20,
        }
    }

    #[test]
    fn accepts_when_idle() {
        assert_eq!(admit(&cmd(3, false), &open()), Ok(()));
        assert_eq!(admit(&cmd(4, true), &open()), Ok(()));
        assert_eq!(admit(&cmd(10, false), &open()), Ok(()));
    }

    #[test]
    fn assist_quantity_cap() {
        let err = admit(&cmd(5, true), &open()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AssistQuantity);
    }

    #[test]
    fn order_quantity_limit() {
        assert_eq!(admit(&cmd(20, false), &open()), Ok(()));
        let err = admit(&cmd(i64::MAX, false), &open()).unwrap_err();
        assert_eq!(
            err,
            Rejection::OrderQuantity {
                max: 20,
                quantity: i64::MAX
            }
        );
        assert_eq!(err.code(), ErrorCode::DecodeFailed);
    }

    #[test]
    fn guards_apply_in_order() {
        let state = AdmissionState {
            in_trading_hours: false,
            waiting_orders: 1,
            assists: 1,
            ..open()
        };
        assert_eq!(admit(&cmd(5, true), &state), Err(Rejection::NotTradingHours));

        let state = AdmissionState {
            in_trading_hours: true,
            ..state
        };
        assert_eq!(admit(&cmd(5, true), &state), Err(Rejection::OrderPending(1)));

        let state = AdmissionState {
            waiting_orders: 0,
            ..state
        };
        assert_eq!(admit(&cmd(5, true), &state), Err(Rejection::AssistBusy));
    }
}
