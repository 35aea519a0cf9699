/*
[INPUT]:  Raw WebSocket text frames and subscription keys
[OUTPUT]: Inbound event envelopes, outbound wire commands, event metadata
[POS]:    WebSocket layer - message shapes on the wire
[UPDATE]: When adding new message types or changing format
*/

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::key::SubscriptionKey;
use crate::error::Result;

/// Event name the server uses for protocol errors.
pub const ERROR_EVENT: &str = "error";

/// Inbound envelope: `{ "event": ..., "payload": {...}, "time": "..." }`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InboundMessage {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub time: String,
}

/// Extra fields delivered to callbacks next to the payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventMeta {
    /// Server timestamp of the event, ISO-8601 as sent by the server.
    pub server_time: String,
}

impl EventMeta {
    pub fn server_time_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.server_time)
            .ok()
            .map(|time| time.with_timezone(&Utc))
    }
}

/// Decode a raw event payload into one of the typed models.
pub fn decode_payload<T: DeserializeOwned>(payload: &serde_json::Value) -> Result<T> {
    Ok(T::deserialize(payload)?)
}

/// Outbound command: `{ "event": "<kind>:<action>", <kind params> }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireCommand {
    pub event: String,
    #[serde(flatten)]
    pub key: SubscriptionKey,
}

impl WireCommand {
    pub fn subscribe(key: &SubscriptionKey) -> Self {
        Self {
            event: format!("{}:subscribe", key.kind()),
            key: key.clone(),
        }
    }

    pub fn unsubscribe(key: &SubscriptionKey) -> Self {
        Self {
            event: format!("{}:unsubscribe", key.kind()),
            key: key.clone(),
        }
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
