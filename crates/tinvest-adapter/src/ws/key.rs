/*
[INPUT]:  Channel kind plus channel parameters (outbound) or event name plus payload (inbound)
[OUTPUT]: SubscriptionKey identifying one logical wire subscription
[POS]:    WebSocket layer - deduplication and routing key
[UPDATE]: When adding new streaming channels
*/

use serde::Serialize;

use crate::error::{Result, TinvestError};
use crate::types::CandleInterval;

pub const ORDERBOOK_KIND: &str = "orderbook";
pub const CANDLE_KIND: &str = "candle";
pub const INSTRUMENT_INFO_KIND: &str = "instrument_info";

/// Orderbook depth used when the caller does not pick one.
pub const DEFAULT_ORDERBOOK_DEPTH: u32 = 3;

/// Identity of one logical channel on the shared connection.
///
/// Serializes to the channel parameters only (`{"figi":..,"depth":..}`),
/// which is what the wire commands carry next to the event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum SubscriptionKey {
    Orderbook { figi: String, depth: u32 },
    Candle { figi: String, interval: CandleInterval },
    InstrumentInfo { figi: String },
}

impl SubscriptionKey {
    pub fn orderbook(figi: impl Into<String>, depth: u32) -> Self {
        SubscriptionKey::Orderbook {
            figi: figi.into(),
            depth,
        }
    }

    pub fn candle(figi: impl Into<String>, interval: CandleInterval) -> Self {
        SubscriptionKey::Candle {
            figi: figi.into(),
            interval,
        }
    }

    pub fn instrument_info(figi: impl Into<String>) -> Self {
        SubscriptionKey::InstrumentInfo { figi: figi.into() }
    }

    /// Channel kind, also the prefix of the wire event names.
    pub fn kind(&self) -> &'static str {
        match self {
            SubscriptionKey::Orderbook { .. } => ORDERBOOK_KIND,
            SubscriptionKey::Candle { .. } => CANDLE_KIND,
            SubscriptionKey::InstrumentInfo { .. } => INSTRUMENT_INFO_KIND,
        }
    }

    pub fn figi(&self) -> &str {
        match self {
            SubscriptionKey::Orderbook { figi, .. }
            | SubscriptionKey::Candle { figi, .. }
            | SubscriptionKey::InstrumentInfo { figi } => figi,
        }
    }

    /// Derive the key an inbound event belongs to.
    ///
    /// Uses the same fields the outbound subscribe command carries, so an
    /// event lands on exactly the callbacks registered for that command.
    /// An event name outside the known channels is a protocol mismatch and
    /// yields [`TinvestError::UnknownEvent`].
    pub fn from_event(event: &str, payload: &serde_json::Value) -> Result<Self> {
        match event {
            ORDERBOOK_KIND => {
                let figi = required_str(event, payload, "figi")?;
                let depth = payload
                    .get("depth")
                    .and_then(depth_value)
                    .ok_or_else(|| missing_field(event, "depth"))?;
                Ok(SubscriptionKey::orderbook(figi, depth))
            }
            CANDLE_KIND => {
                let figi = required_str(event, payload, "figi")?;
                let interval = required_str(event, payload, "interval")?;
                Ok(SubscriptionKey::candle(figi, CandleInterval::from(interval)))
            }
            INSTRUMENT_INFO_KIND => {
                let figi = required_str(event, payload, "figi")?;
                Ok(SubscriptionKey::instrument_info(figi))
            }
            other => Err(TinvestError::UnknownEvent {
                event: other.to_string(),
            }),
        }
    }
}

fn required_str<'a>(event: &str, payload: &'a serde_json::Value, field: &str) -> Result<&'a str> {
    payload
        .get(field)
        .and_then(|value| value.as_str())
        .ok_or_else(|| missing_field(event, field))
}

/// Depth as a number or a numeric string.
fn depth_value(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::String(text) => text.trim().parse().ok(),
        other => other.as_u64().and_then(|depth| u32::try_from(depth).ok()),
    }
}

fn missing_field(event: &str, field: &str) -> TinvestError {
    TinvestError::MalformedEvent(format!("{event} payload has no usable `{field}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("orderbook", json!({ "figi": "F1", "depth": 3, "bids": [] }), SubscriptionKey::orderbook("F1", 3))]
    #[case("orderbook", json!({ "figi": "F1", "depth": "5", "bids": [] }), SubscriptionKey::orderbook("F1", 5))]
    #[case("candle", json!({ "figi": "F1", "interval": "1min", "o": 1 }), SubscriptionKey::candle("F1", CandleInterval::OneMinute))]
    #[case("instrument_info", json!({ "figi": "F1", "lot": 10 }), SubscriptionKey::instrument_info("F1"))]
    fn inbound_derivation_matches_outbound(
        #[case] event: &str,
        #[case] payload: serde_json::Value,
        #[case] expected: SubscriptionKey,
    ) {
        let key = SubscriptionKey::from_event(event, &payload).expect("known event");
        assert_eq!(key, expected);
        assert_eq!(key.kind(), event);
    }

    #[test]
    fn depth_is_part_of_the_key() {
        assert_ne!(
            SubscriptionKey::orderbook("F1", 3),
            SubscriptionKey::orderbook("F1", 10)
        );
        assert_ne!(
            SubscriptionKey::candle("F1", CandleInterval::OneMinute),
            SubscriptionKey::candle("F1", CandleInterval::Hour)
        );
    }

    #[test]
    fn unknown_event_is_rejected() {
        let err = SubscriptionKey::from_event("trades", &json!({ "figi": "F1" })).unwrap_err();
        assert!(matches!(err, TinvestError::UnknownEvent { ref event } if event == "trades"));
    }

    #[test]
    fn missing_field_is_malformed_not_unknown() {
        let err = SubscriptionKey::from_event("orderbook", &json!({ "figi": "F1" })).unwrap_err();
        assert!(matches!(err, TinvestError::MalformedEvent(_)));
        assert!(!err.is_fatal());

        let err = SubscriptionKey::from_event("orderbook", &json!({ "figi": "F1", "depth": "deep" })).unwrap_err();
        assert!(matches!(err, TinvestError::MalformedEvent(_)));
    }

    #[test]
    fn candle_alias_is_the_same_key() {
        let alias = SubscriptionKey::candle("F1", CandleInterval::Other("1min".to_string()));
        let inbound = SubscriptionKey::from_event("candle", &json!({ "figi": "F1", "interval": "1min" })).unwrap();
        assert_eq!(alias, SubscriptionKey::candle("F1", CandleInterval::OneMinute));
        assert_eq!(alias, inbound);
    }
}
