/*
[INPUT]:  Streaming payload schemas and serde requirements
[OUTPUT]: Typed Rust structs for orderbook, candle and instrument info events
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When the streaming payload schema changes
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{CandleInterval, TradeStatus};

/// One `[price, quantity]` level of an orderbook side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderbookLevel(pub Decimal, pub Decimal);

impl OrderbookLevel {
    pub fn price(&self) -> Decimal {
        self.0
    }

    pub fn quantity(&self) -> Decimal {
        self.1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderbookEvent {
    pub figi: String,
    pub depth: u32,
    #[serde(default)]
    pub bids: Vec<OrderbookLevel>,
    #[serde(default)]
    pub asks: Vec<OrderbookLevel>,
}

impl OrderbookEvent {
    pub fn best_bid(&self) -> Option<&OrderbookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&OrderbookLevel> {
        self.asks.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleEvent {
    pub figi: String,
    pub interval: CandleInterval,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "v")]
    pub volume: Decimal,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentInfoEvent {
    pub figi: String,
    pub trade_status: TradeStatus,
    pub min_price_increment: Decimal,
    pub lot: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrued_interest: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_up: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_down: Option<Decimal>,
}

/// Payload of an `error` streaming event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingErrorPayload {
    #[serde(alias = "message")]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}
