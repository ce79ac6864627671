//! Market-data bus JSON message parser.
//!
//! Every data frame on the bus has the shape
//! `{"conn_id": "...", "channel": "...", "data": {...}}` and is routed by
//! `channel`:
//!
//! - `tick` → [`Tick`]
//! - `order` → [`OrderStatusUpdate`]
//!
//! `conn_id` is optional; frames without it are broadcast to every matching
//! subscriber.

use ft_core::enums::{OrderStatus, TickType};
use ft_core::types::{OrderStatusUpdate, Tick};

use crate::json_util::{parse_f64_field, parse_i64_field, str_field};

/// Payload of one bus frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedPayload {
    Tick(Tick),
    OrderStatus(OrderStatusUpdate),
}

/// A parsed bus frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMsg {
    pub conn_id: Option<String>,
    pub payload: FeedPayload,
}

/// Parse a bus WebSocket message.
///
/// Returns `None` for non-data messages (subscription acks, pong, unknown
/// channels, malformed frames).
pub fn parse_message(text: &str) -> Option<FeedMsg> {
    if text == "pong" {
        return None;
    }

    let v: serde_json::Value = serde_json::from_str(text).ok()?;
    let channel = str_field(&v, "channel")?;
    let data = v.get("data")?;
    let conn_id = str_field(&v, "conn_id").map(str::to_string);

    let payload = match channel {
        "tick" => FeedPayload::Tick(parse_tick(data)?),
        "order" => FeedPayload::OrderStatus(parse_order_status(data)?),
        _ => return None,
    };
    Some(FeedMsg { conn_id, payload })
}

fn parse_tick(d: &serde_json::Value) -> Option<Tick> {
    let close = parse_f64_field(d, "close")?;
    Some(Tick {
        code: str_field(d, "code")?.to_string(),
        time: parse_i64_field(d, "time")?,
        open: parse_f64_field(d, "open").unwrap_or(close),
        close,
        high: parse_f64_field(d, "high").unwrap_or(close),
        low: parse_f64_field(d, "low").unwrap_or(close),
        volume: parse_i64_field(d, "volume").unwrap_or(0),
        total_volume: parse_i64_field(d, "total_volume").unwrap_or(0),
        tick_type: parse_tick_type(d.get("tick_type")),
    })
}

/// Tick direction arrives either as `1`/`2` (outer/inner) or as a word.
fn parse_tick_type(v: Option<&serde_json::Value>) -> TickType {
    match v {
        Some(serde_json::Value::Number(n)) if n.as_i64() == Some(2) => TickType::Sell,
        Some(serde_json::Value::String(s)) if s.eq_ignore_ascii_case("sell") => TickType::Sell,
        _ => TickType::Buy,
    }
}

fn parse_order_status(d: &serde_json::Value) -> Option<OrderStatusUpdate> {
    let order_id = str_field(d, "order_id")?;
    if order_id.is_empty() {
        return None;
    }
    Some(OrderStatusUpdate {
        order_id: order_id.to_string(),
        status: OrderStatus::parse(str_field(d, "status")?),
        order_time: parse_i64_field(d, "order_time").unwrap_or(0),
        price: parse_f64_field(d, "price"),
    })
}

/// Subscribe `conn_id` to the ticks of `code`.
pub fn build_tick_subscribe(conn_id: &str, code: &str) -> String {
    serde_json::json!({
        "op": "subscribe",
        "conn_id": conn_id,
        "channel": "tick",
        "code": code,
    })
    .to_string()
}

/// Subscribe `conn_id` to order-status updates.
pub fn build_order_subscribe(conn_id: &str) -> String {
    serde_json::json!({
        "op": "subscribe",
        "conn_id": conn_id,
        "channel": "order",
    })
    .to_string()
}

/// Release every subscription of `conn_id`.
pub fn build_unsubscribe(conn_id: &str) -> String {
    serde_json::json!({
        "op": "unsubscribe",
        "conn_id": conn_id,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tick_msg() {
        let json = r#"{
            "conn_id": "c1",
            "channel": "tick",
            "data": {
                "code": "MXFL1", "time": 1700000000000,
                "open": "17790", "close": "17800", "high": 17810, "low": 17780,
                "volume": 3, "total_volume": "52011", "tick_type": 2
            }
        }"#;
        let msg = parse_message(json).unwrap();
        assert_eq!(msg.conn_id.as_deref(), Some("c1"));
        match msg.payload {
            FeedPayload::Tick(t) => {
                assert_eq!(t.code, "MXFL1");
                assert!((t.close - 17800.0).abs() < 1e-9);
                assert!((t.high - 17810.0).abs() < 1e-9);
                assert_eq!(t.total_volume, 52011);
                assert_eq!(t.tick_type, TickType::Sell);
            }
            _ => panic!("expected Tick"),
        }
    }

    #[test]
    fn parse_order_msg_without_conn_id() {
        let json = r#"{"channel":"order","data":{"order_id":"o-1","status":"Filled","price":17801}}"#;
        let msg = parse_message(json).unwrap();
        assert!(msg.conn_id.is_none());
        match msg.payload {
            FeedPayload::OrderStatus(u) => {
                assert_eq!(u.order_id, "o-1");
                assert_eq!(u.status, OrderStatus::Filled);
                assert_eq!(u.price, Some(17801.0));
            }
            _ => panic!("expected OrderStatus"),
        }
    }

    #[test]
    fn order_without_id_is_dropped() {
        let json = r#"{"channel":"order","data":{"order_id":"","status":"Filled"}}"#;
        assert!(parse_message(json).is_none());
    }

    #[test]
    fn non_data_frames_return_none() {
        assert!(parse_message("pong").is_none());
        assert!(parse_message(r#"{"op":"subscribe","result":"ok"}"#).is_none());
        assert!(parse_message(r#"{"channel":"depth","data":{}}"#).is_none());
        assert!(parse_message("{not json").is_none());
    }

    #[test]
    fn subscribe_messages() {
        let v: serde_json::Value = serde_json::from_str(&build_tick_subscribe("c1", "MXFL1")).unwrap();
        assert_eq!(v["op"], "subscribe");
        assert_eq!(v["channel"], "tick");
        assert_eq!(v["code"], "MXFL1");
        let v: serde_json::Value = serde_json::from_str(&build_unsubscribe("c1")).unwrap();
        assert_eq!(v["op"], "unsubscribe");
    }
}
