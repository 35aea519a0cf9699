/*
[INPUT]:  Test configuration and scripted transport requirements
[OUTPUT]: Shared test utilities, fixtures, and an in-memory wire transport
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for tinvest-adapter tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tinvest_adapter::{
    EventMeta, HandshakeOptions, ReadyState, StreamingConfig, WireChannel, WireConnection,
    WireConnector, WireEvent,
};
use tokio::sync::{mpsc, oneshot};
use wiremock::MockServer;

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

pub fn test_token() -> String {
    "t.test-token".to_string()
}

pub fn stream_config() -> StreamingConfig {
    StreamingConfig::new("wss://stream.test/ws", test_token()).expect("stream config")
}

/// Let the worker task run until it has nothing left to do.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Everything a callback received, in order.
pub type Received = Arc<Mutex<Vec<(Value, EventMeta)>>>;

pub fn recorder() -> (Received, impl Fn(&Value, &EventMeta) + Send + Sync + 'static) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let callback = move |payload: &Value, meta: &EventMeta| {
        sink.lock().unwrap().push((payload.clone(), meta.clone()));
    };
    (received, callback)
}

/// Scripted connector: every `open` creates a [`MockConnection`] the test drives.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    inner: Arc<ConnectorState>,
}

#[derive(Debug, Default)]
struct ConnectorState {
    connections: Mutex<Vec<Arc<MockConnection>>>,
    options: Mutex<Vec<HandshakeOptions>>,
    hold_sends: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends stay in flight until [`MockConnection::complete_send`].
    pub fn holding_sends() -> Self {
        let connector = Self::default();
        connector.inner.hold_sends.store(true, Ordering::SeqCst);
        connector
    }

    pub fn opened(&self) -> usize {
        self.inner.connections.lock().unwrap().len()
    }

    pub fn connection(&self, index: usize) -> Arc<MockConnection> {
        self.inner.connections.lock().unwrap()[index].clone()
    }

    pub fn last(&self) -> Arc<MockConnection> {
        let connections = self.inner.connections.lock().unwrap();
        connections.last().cloned().expect("no connection opened")
    }

    pub fn handshakes(&self) -> Vec<HandshakeOptions> {
        self.inner.options.lock().unwrap().clone()
    }
}

impl WireConnector for MockConnector {
    fn open(&self, options: &HandshakeOptions) -> WireChannel {
        let (events_tx, events) = mpsc::unbounded_channel();
        let connection = Arc::new(MockConnection {
            state: AtomicU8::new(ReadyState::Connecting as u8),
            events: events_tx,
            hold_sends: self.inner.hold_sends.load(Ordering::SeqCst),
            sent: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            pings: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            terminated: AtomicBool::new(false),
        });

        self.inner.options.lock().unwrap().push(options.clone());
        self.inner.connections.lock().unwrap().push(connection.clone());

        WireChannel { connection, events }
    }
}

#[derive(Debug)]
pub struct MockConnection {
    state: AtomicU8,
    events: mpsc::UnboundedSender<WireEvent>,
    hold_sends: bool,
    sent: Mutex<Vec<String>>,
    held: Mutex<Vec<oneshot::Sender<tinvest_adapter::Result<()>>>>,
    pings: AtomicUsize,
    closes: AtomicUsize,
    terminated: AtomicBool,
}

impl MockConnection {
    /// Complete the handshake.
    pub fn accept(&self) {
        self.set_state(ReadyState::Open);
        self.emit(WireEvent::Open);
    }

    /// Deliver a text frame from the server.
    pub fn push(&self, frame: Value) {
        self.emit(WireEvent::Message(frame.to_string()));
    }

    pub fn push_raw(&self, text: &str) {
        self.emit(WireEvent::Message(text.to_string()));
    }

    /// Server closes the connection.
    pub fn drop_from_server(&self, code: u16) {
        self.set_state(ReadyState::Closed);
        self.emit(WireEvent::Close {
            code: Some(code),
            reason: "server going away".to_string(),
        });
    }

    /// Handshake or transport failure; the socket is gone.
    pub fn fail(&self, message: &str) {
        self.set_state(ReadyState::Closed);
        self.emit(WireEvent::Error(message.to_string()));
        self.emit(WireEvent::Close {
            code: None,
            reason: message.to_string(),
        });
    }

    /// Transport error reported while the socket still looks alive.
    pub fn report_error(&self, message: &str) {
        self.emit(WireEvent::Error(message.to_string()));
    }

    /// Resolve the oldest held send.
    pub fn complete_send(&self) {
        let mut held = self.held.lock().unwrap();
        if !held.is_empty() {
            let _ = held.remove(0).send(Ok(()));
        }
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| serde_json::from_str(text).expect("sent frame is json"))
            .collect()
    }

    pub fn sent_events(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|frame| frame["event"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ReadyState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn emit(&self, event: WireEvent) {
        // Detached receivers are expected after teardown.
        let _ = self.events.send(event);
    }
}

impl WireConnection for MockConnection {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn send(&self, text: String) -> oneshot::Receiver<tinvest_adapter::Result<()>> {
        let (done, completion) = oneshot::channel();
        self.sent.lock().unwrap().push(text);
        if self.hold_sends {
            self.held.lock().unwrap().push(done);
        } else {
            let _ = done.send(Ok(()));
        }
        completion
    }

    fn ping(&self, _payload: Vec<u8>) {
        self.pings.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.ready_state() == ReadyState::Closed {
            return;
        }
        self.set_state(ReadyState::Closed);
        self.emit(WireEvent::Close {
            code: Some(1000),
            reason: String::new(),
        });
    }

    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.set_state(ReadyState::Closed);
    }
}
