/*
[INPUT]:  Raw inbound text frames
[OUTPUT]: Route to a subscription key or to the streaming-error channel
[POS]:    WebSocket layer - inbound event routing
[UPDATE]: When adding new event types or changing error routing
*/

use super::key::SubscriptionKey;
use super::message::{ERROR_EVENT, EventMeta, InboundMessage};
use crate::error::Result;

/// Where an inbound event must be delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Subscription {
        key: SubscriptionKey,
        payload: serde_json::Value,
        meta: EventMeta,
    },
    StreamingError {
        payload: serde_json::Value,
        meta: EventMeta,
    },
}

/// Decode a frame and decide its destination.
///
/// Errors:
/// - `Serialization` when the frame is not a JSON envelope,
/// - `UnknownEvent` (fatal) for an event type outside the known channels,
/// - `MalformedEvent` when a known event lacks its key fields.
pub fn route(raw: &str) -> Result<Route> {
    let InboundMessage {
        event,
        payload,
        time,
    } = serde_json::from_str(raw)?;
    let meta = EventMeta { server_time: time };

    if event == ERROR_EVENT {
        return Ok(Route::StreamingError { payload, meta });
    }

    let key = SubscriptionKey::from_event(&event, &payload)?;
    Ok(Route::Subscription { key, payload, meta })
}
