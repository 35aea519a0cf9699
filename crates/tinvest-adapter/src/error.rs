/*
[INPUT]:  Error sources (HTTP, API envelopes, serialization, WebSocket transport, stream protocol)
[OUTPUT]: Structured error types with retry and severity hints
[POS]:    Error handling layer - unified error type for the entire crate
[UPDATE]: When adding new error sources or changing which errors are fatal
*/

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the Invest OpenAPI adapter
#[derive(Error, Debug)]
pub enum TinvestError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error (code {code}): {message}")]
    Api { code: i32, message: String },

    /// Token was rejected by the REST API
    #[error("Unauthorized, check that the access token is valid")]
    Unauthorized,

    /// Rate limit exceeded
    #[error("Too many requests")]
    RateLimit { retry_after: Option<u64> },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The streaming handshake did not finish in time
    #[error("WebSocket handshake timed out after {}ms", duration.as_millis())]
    HandshakeTimeout { duration: Duration },

    /// Server sent an event type this client does not know how to route
    #[error("Unknown streaming event type: {event}")]
    UnknownEvent { event: String },

    /// A known event arrived without the fields needed to route it
    #[error("Malformed streaming event: {0}")]
    MalformedEvent(String),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The streaming worker is no longer running
    #[error("Streaming worker stopped")]
    WorkerStopped,
}

impl TinvestError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TinvestError::Http(_)
                | TinvestError::RateLimit { .. }
                | TinvestError::HandshakeTimeout { .. }
                | TinvestError::WebSocket(_)
                | TinvestError::InvalidResponse(_)
        )
    }

    /// Errors that mean client and server disagree on the streaming protocol.
    ///
    /// These stop the streaming worker instead of being absorbed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TinvestError::UnknownEvent { .. })
    }

    /// Check if error indicates authentication failure
    pub fn is_auth_error(&self) -> bool {
        matches!(self, TinvestError::Unauthorized)
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        TinvestError::Api {
            code: status.as_u16() as i32,
            message: message.into(),
        }
    }
}

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, TinvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let timeout_err = TinvestError::HandshakeTimeout {
            duration: Duration::from_secs(4),
        };
        assert!(timeout_err.is_retryable());
        assert!(!timeout_err.is_fatal());

        let auth_err = TinvestError::Unauthorized;
        assert!(!auth_err.is_retryable());
        assert!(auth_err.is_auth_error());
    }

    #[test]
    fn test_unknown_event_is_fatal() {
        let err = TinvestError::UnknownEvent {
            event: "trades".to_string(),
        };
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
        assert!(!TinvestError::MalformedEvent("missing figi".into()).is_fatal());
    }

    #[test]
    fn test_api_error_creation() {
        let err = TinvestError::api_error(StatusCode::BAD_REQUEST, "Invalid figi");
        match err {
            TinvestError::Api { code, message } => {
                assert_eq!(code, 400);
                assert_eq!(message, "Invalid figi");
            }
            _ => panic!("Expected Api error variant"),
        }
    }

    #[test]
    fn test_handshake_timeout_message() {
        let err = TinvestError::HandshakeTimeout {
            duration: Duration::from_millis(4000),
        };
        assert_eq!(err.to_string(), "WebSocket handshake timed out after 4000ms");
    }
}
