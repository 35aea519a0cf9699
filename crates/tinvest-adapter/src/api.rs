/*
[INPUT]:  API/stream URLs, access token, optional broker account id
[OUTPUT]: One handle bundling the REST client and the streaming multiplexer
[POS]:    Facade - entry point for applications
[UPDATE]: When the REST or streaming surface gains operations
*/

use crate::error::Result;
use crate::http::{OpenApiClient, PRODUCTION_API_URL};
use crate::types::CandleInterval;
use crate::ws::{EventMeta, PRODUCTION_STREAM_URL, StreamingClient, StreamingConfig, Subscription};

/// Connection settings for [`OpenApi`].
#[derive(Debug, Clone)]
pub struct OpenApiConfig {
    pub api_url: String,
    pub stream_url: String,
    pub token: String,
    /// `None` selects the default Tinkoff account.
    pub broker_account_id: Option<String>,
}

impl OpenApiConfig {
    pub fn production(token: impl Into<String>) -> Self {
        Self {
            api_url: PRODUCTION_API_URL.to_string(),
            stream_url: PRODUCTION_STREAM_URL.to_string(),
            token: token.into(),
            broker_account_id: None,
        }
    }
}

/// REST client plus streaming client sharing one token.
#[derive(Debug)]
pub struct OpenApi {
    rest: OpenApiClient,
    streaming: StreamingClient,
    broker_account_id: Option<String>,
}

impl OpenApi {
    /// Must be called inside a Tokio runtime.
    pub fn new(config: OpenApiConfig) -> Result<Self> {
        let rest = OpenApiClient::new(&config.api_url, config.token.clone())?;
        let streaming = StreamingClient::new(StreamingConfig::new(&config.stream_url, config.token)?)?;
        Ok(Self::from_parts(rest, streaming, config.broker_account_id))
    }

    pub fn from_parts(
        rest: OpenApiClient,
        streaming: StreamingClient,
        broker_account_id: Option<String>,
    ) -> Self {
        Self {
            rest,
            streaming,
            broker_account_id,
        }
    }

    pub fn rest(&self) -> &OpenApiClient {
        &self.rest
    }

    pub fn streaming(&self) -> &StreamingClient {
        &self.streaming
    }

    pub fn current_account_id(&self) -> Option<&str> {
        self.broker_account_id.as_deref()
    }

    /// `None` switches back to the default account.
    pub fn set_current_account_id(&mut self, broker_account_id: Option<String>) {
        self.broker_account_id = broker_account_id;
    }

    /// GET an account-scoped endpoint with `brokerAccountId` attached.
    pub async fn get_for_account<T>(&self, endpoint: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let query = [("brokerAccountId", self.broker_account_id.clone())];
        self.rest.get_payload(endpoint, &query).await
    }

    pub fn orderbook<F>(&self, figi: impl Into<String>, depth: Option<u32>, callback: F) -> Result<Subscription>
    where
        F: Fn(&serde_json::Value, &EventMeta) + Send + Sync + 'static,
    {
        self.streaming.subscribe_orderbook(figi, depth, callback)
    }

    pub fn candle<F>(
        &self,
        figi: impl Into<String>,
        interval: Option<CandleInterval>,
        callback: F,
    ) -> Result<Subscription>
    where
        F: Fn(&serde_json::Value, &EventMeta) + Send + Sync + 'static,
    {
        self.streaming.subscribe_candle(figi, interval, callback)
    }

    pub fn instrument_info<F>(&self, figi: impl Into<String>, callback: F) -> Result<Subscription>
    where
        F: Fn(&serde_json::Value, &EventMeta) + Send + Sync + 'static,
    {
        self.streaming.subscribe_instrument_info(figi, callback)
    }

    pub fn on_streaming_error<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(&serde_json::Value, &EventMeta) + Send + Sync + 'static,
    {
        self.streaming.on_streaming_error(callback)
    }

    /// Stop the streaming worker; see [`StreamingClient::shutdown`].
    pub async fn shutdown(self) -> Result<()> {
        self.streaming.shutdown().await
    }
}
