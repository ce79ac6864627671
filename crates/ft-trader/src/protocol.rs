//! Client wire protocol.
//!
//! Every frame is JSON text. Inbound frames carry one [`ClientCommand`];
//! outbound frames are a [`ServerMessage`] encoded as
//! `{"type": "<kind>", "data": ...}`. The literal text frame `ping` is
//! answered with `pong`.

use ft_core::enums::{AutomationType, OrderAction};
use ft_core::error::FtError;
use ft_core::types::{HalfAutomationOption, KBar, Order, Position, Tick, TradeIndex};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Error codes reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    NotTradingHours = -1,
    OrderPending = -2,
    DecodeFailed = -3,
    AssistBusy = -4,
    AssistQuantity = -5,
    PlaceOrderFailed = -6,
    CancelFailed = -7,
    AssistOrderFailed = -8,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// An order command from the client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCommand {
    pub instrument_code: String,
    pub action: OrderAction,
    pub price: f64,
    pub quantity: i64,
    #[serde(default)]
    pub automation_option: Option<HalfAutomationOption>,
}

impl ClientCommand {
    fn validate(&self) -> Result<(), FtError> {
        if self.instrument_code.trim().is_empty() {
            return Err(FtError::Protocol("instrumentCode is empty".into()));
        }
        if self.quantity <= 0 {
            return Err(FtError::Protocol(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(FtError::Protocol(format!("invalid price {}", self.price)));
        }
        if let Some(opt) = &self.automation_option {
            let uses_balance = matches!(
                opt.automation_type,
                AutomationType::ByBalance | AutomationType::ByTimePeriodAndBalance
            );
            let uses_time = matches!(
                opt.automation_type,
                AutomationType::ByTimePeriod | AutomationType::ByTimePeriodAndBalance
            );
            if uses_balance && (opt.by_balance_high < 0.0 || opt.by_balance_low < 0.0) {
                return Err(FtError::Protocol("balance offsets must not be negative".into()));
            }
            if uses_time && opt.by_time_period_secs == 0 {
                return Err(FtError::Protocol("time period must be positive".into()));
            }
        }
        Ok(())
    }
}

/// Decode and validate one inbound text frame.
pub fn decode_command(text: &str) -> Result<ClientCommand, FtError> {
    let cmd: ClientCommand =
        serde_json::from_str(text).map_err(|e| FtError::Protocol(e.to_string()))?;
    cmd.validate()?;
    Ok(cmd)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub code: i32,
    pub text: String,
}

/// Messages pushed to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Tick(Tick),
    Order(Order),
    TradeIndex(TradeIndex),
    Position(Vec<Position>),
    Kbar(Vec<KBar>),
    AssistStatus { running: bool },
    Error(ErrorPayload),
}

impl ServerMessage {
    pub fn error(code: ErrorCode, text: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            code: code.code(),
            text: text.into(),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tick(_) => "tick",
            Self::Order(_) => "order",
            Self::TradeIndex(_) => "trade_index",
            Self::Position(_) => "position",
            Self::Kbar(_) => "kbar",
            Self::AssistStatus { .. } => "assist_status",
            Self::Error(_) => "error",
        }
    }
}

/// One frame queued for the session writer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Pong,
}

impl Outbound {
    pub fn encode(&self) -> Result<String, FtError> {
        match self {
            Self::Message(msg) => {
                serde_json::to_string(msg).map_err(|e| FtError::Protocol(e.to_string()))
            }
            Self::Pong => Ok("pong".to_string()),
        }
    }
}

impl From<ServerMessage> for Outbound {
    fn from(msg: ServerMessage) -> Self {
        Self::Message(msg)
    }
}

/// Queue feeding the session writer task.
pub type OutboundSender = UnboundedSender<Outbound>;
