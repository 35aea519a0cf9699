/*
[INPUT]:  HTTP configuration (base URL, timeouts) and access token
[OUTPUT]: Authenticated REST requests unwrapped to their `payload`
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing error mapping
*/

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Result, TinvestError};
use crate::types::{ErrorPayload, ResponseEnvelope};

/// Base URLs for the REST API
pub const PRODUCTION_API_URL: &str = "https://api-invest.tinkoff.ru/openapi";
pub const SANDBOX_API_URL: &str = "https://api-invest.tinkoff.ru/openapi/sandbox";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Query parameters; `None` values are left out of the query string.
pub type Query<'a> = &'a [(&'a str, Option<String>)];

/// REST client. Endpoint wrappers live with the callers.
#[derive(Debug, Clone)]
pub struct OpenApiClient {
    http_client: Client,
    base_url: String,
    token: String,
}

impl OpenApiClient {
    /// Create a new client with default configuration
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self> {
        Self::with_config(ClientConfig::default(), base_url, token)
    }

    /// Create a new client with custom configuration
    pub fn with_config(
        config: ClientConfig,
        base_url: &str,
        token: impl Into<String>,
    ) -> Result<Self> {
        Url::parse(base_url)?;
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build full URL; endpoints are appended to the base path.
    fn url(&self, endpoint: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{}", self.base_url, endpoint))?)
    }

    /// Build an authenticated request builder
    pub fn request(&self, method: Method, endpoint: &str, query: Query<'_>) -> Result<RequestBuilder> {
        let url = self.url(endpoint)?;
        let query: Vec<(&str, &str)> = query
            .iter()
            .filter_map(|(name, value)| value.as_deref().map(|value| (*name, value)))
            .collect();

        Ok(self
            .http_client
            .request(method, url)
            .query(&query)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(CONTENT_TYPE, "application/json"))
    }

    /// GET `endpoint` and return its `payload`
    pub async fn get_payload<T: DeserializeOwned>(&self, endpoint: &str, query: Query<'_>) -> Result<T> {
        let builder = self.request(Method::GET, endpoint, query)?;
        self.send_json(builder).await
    }

    /// POST `endpoint` with an optional JSON body and return its `payload`
    pub async fn post_payload<T, B>(&self, endpoint: &str, query: Query<'_>, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut builder = self.request(Method::POST, endpoint, query)?;
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.send_json(builder).await
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        debug!(%status, url = %response.url(), "rest response");

        match status {
            StatusCode::UNAUTHORIZED => return Err(TinvestError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse().ok());
                return Err(TinvestError::RateLimit { retry_after });
            }
            _ => {}
        }

        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ResponseEnvelope<ErrorPayload>>(&body)
                .ok()
                .and_then(|envelope| envelope.payload.message)
                .unwrap_or(body);
            return Err(TinvestError::api_error(status, message));
        }

        let envelope: ResponseEnvelope<T> = serde_json::from_str(&body)
            .map_err(|err| TinvestError::InvalidResponse(format!("{err}: {body}")))?;
        Ok(envelope.payload)
    }
}
