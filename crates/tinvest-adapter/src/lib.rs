/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public Invest OpenAPI adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod api;
pub mod error;
pub mod http;
pub mod types;
pub mod ws;

pub use api::{OpenApi, OpenApiConfig};
pub use error::{Result, TinvestError};

// Re-export commonly used types from http
pub use http::{ClientConfig, OpenApiClient, PRODUCTION_API_URL, SANDBOX_API_URL};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    ConnectionEvent,
    EventMeta,
    HandshakeOptions,
    ReadyState,
    StreamingClient,
    StreamingConfig,
    Subscription,
    SubscriptionKey,
    WireChannel,
    WireCommand,
    WireConnection,
    WireConnector,
    WireEvent,
    decode_payload,
};
