/*
[INPUT]:  Stream endpoint URL and access token
[OUTPUT]: StreamingConfig and the handshake options derived from it
[POS]:    WebSocket layer - connection configuration
[UPDATE]: When adding connection options or changing timing defaults
*/

use std::time::Duration;

use url::Url;

use super::transport::HandshakeOptions;
use crate::error::{Result, TinvestError};

pub const PRODUCTION_STREAM_URL: &str = "wss://api-invest.tinkoff.ru/openapi/md/v1/md-openapi/ws";
pub const SANDBOX_STREAM_URL: &str = PRODUCTION_STREAM_URL;

/// The handshake timeout is fixed at this layer.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(4);
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(30);

pub(crate) const KEEPALIVE_PAYLOAD: &[u8] = b"ping";

/// Streaming connection configuration
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    pub url: Url,
    pub token: String,
    pub keepalive_interval: Duration,
    /// Upper bound of the delay between failed handshake attempts.
    pub reconnect_backoff_max: Duration,
}

impl StreamingConfig {
    pub fn new(url: &str, token: impl Into<String>) -> Result<Self> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TinvestError::Config(format!(
                "stream url must use ws:// or wss://, got {}",
                url.scheme()
            )));
        }

        Ok(Self {
            url,
            token: token.into(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            reconnect_backoff_max: DEFAULT_RECONNECT_BACKOFF_MAX,
        })
    }

    pub fn production(token: impl Into<String>) -> Result<Self> {
        Self::new(PRODUCTION_STREAM_URL, token)
    }

    pub fn handshake_options(&self) -> HandshakeOptions {
        HandshakeOptions {
            url: self.url.to_string(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
            compression: false,
            headers: vec![
                ("Authorization".to_string(), format!("Bearer {}", self.token)),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
        }
    }

    /// Delay before the next attempt after `failures` handshakes in a row
    /// never reached the open state. Zero failures reconnect immediately.
    pub fn reconnect_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exp = failures.saturating_sub(1).min(31);
        let secs = 1u64 << exp;
        Duration::from_secs(secs).min(self.reconnect_backoff_max)
    }
}
