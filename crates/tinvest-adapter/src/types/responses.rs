/*
[INPUT]:  REST response envelope schema and serde requirements
[OUTPUT]: Typed success and error envelopes
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When the REST envelope format changes
*/

use serde::{Deserialize, Serialize};

/// Every REST response wraps its data in `{ trackingId, status, payload }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    #[serde(rename = "trackingId", default)]
    pub tracking_id: String,
    #[serde(default)]
    pub status: String,
    pub payload: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}
