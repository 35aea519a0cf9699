/*
[INPUT]:  Endpoint URL, handshake timeout, compression flag, auth headers
[OUTPUT]: One full-duplex wire connection plus its notification stream
[POS]:    WebSocket layer - transport seam between the multiplexer and the socket
[UPDATE]: When the multiplexer needs new transport capabilities
*/

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::error::Result;

/// Connection state, mirroring the four WebSocket ready states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }

    /// `Connecting` or `Open`: a connect attempt would be redundant.
    pub fn is_live(self) -> bool {
        matches!(self, ReadyState::Connecting | ReadyState::Open)
    }
}

/// Notifications a wire connection emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Open,
    Message(String),
    Close { code: Option<u16>, reason: String },
    Error(String),
}

/// Parameters for opening a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOptions {
    pub url: String,
    pub handshake_timeout: Duration,
    /// Whether per-message compression may be negotiated.
    pub compression: bool,
    pub headers: Vec<(String, String)>,
}

/// Resolves once a sent frame was handed to the socket (or failed to be).
pub type SendCompletion = oneshot::Receiver<Result<()>>;

/// A single full-duplex connection.
///
/// All methods are non-blocking; frames are written in call order, so a
/// `send` followed by `close` puts the text frame on the wire first.
pub trait WireConnection: Send + Sync + fmt::Debug {
    fn ready_state(&self) -> ReadyState;

    fn send(&self, text: String) -> SendCompletion;

    fn ping(&self, payload: Vec<u8>);

    /// Start a graceful close handshake.
    fn close(&self);

    /// Drop the socket immediately, without a close handshake.
    fn terminate(&self);
}

/// Connection plus the receiver its notifications arrive on.
///
/// Dropping `events` detaches every notification handler at once.
#[derive(Debug)]
pub struct WireChannel {
    pub connection: Arc<dyn WireConnection>,
    pub events: mpsc::UnboundedReceiver<WireEvent>,
}

/// Factory for wire connections.
pub trait WireConnector: Send + Sync + 'static {
    /// Start opening a connection.
    ///
    /// Returns immediately with the connection in `Connecting`; the outcome
    /// of the handshake is reported through `WireChannel::events`.
    fn open(&self, options: &HandshakeOptions) -> WireChannel;
}
