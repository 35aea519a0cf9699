/*
[INPUT]:  Stream configuration, subscription requests, raw socket frames
[OUTPUT]: Multiplexed market data callbacks over one resilient WebSocket
[POS]:    WebSocket layer - real-time data streams
[UPDATE]: When adding new channels or changing connection logic
*/

pub mod client;
pub mod config;
mod controller;
pub mod key;
mod log;
pub mod message;
pub mod queue;
pub mod registry;
pub mod router;
pub mod transport;
pub mod tungstenite;

pub use client::{StreamingClient, Subscription};
pub use config::{HANDSHAKE_TIMEOUT, PRODUCTION_STREAM_URL, SANDBOX_STREAM_URL, StreamingConfig};
pub use controller::ConnectionEvent;
pub use key::{DEFAULT_ORDERBOOK_DEPTH, SubscriptionKey};
pub use message::{EventMeta, InboundMessage, WireCommand, decode_payload};
pub use registry::{CallbackId, EventCallback};
pub use transport::{
    HandshakeOptions, ReadyState, SendCompletion, WireChannel, WireConnection, WireConnector,
    WireEvent,
};
pub use tungstenite::TungsteniteConnector;
