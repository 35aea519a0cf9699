/*
[INPUT]:  Client commands, wire notifications, send completions, keepalive/reconnect timers
[OUTPUT]: One managed connection, resubscription after reconnect, callback deliveries
[POS]:    WebSocket layer - connection lifecycle state machine (single worker task)
[UPDATE]: When changing reconnect policy, keepalive or teardown semantics
*/

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::{KEEPALIVE_PAYLOAD, StreamingConfig};
use super::key::SubscriptionKey;
use super::log::{log_message_sample_once, log_parse_fail_once};
use super::message::{EventMeta, WireCommand};
use super::queue::OutboundQueue;
use super::registry::{CallbackId, EventCallback, Removal, SubscriptionRegistry};
use super::router::{self, Route};
use super::transport::{ReadyState, WireChannel, WireConnection, WireConnector, WireEvent};
use crate::error::Result;

/// Connectivity notifications published to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Closed { code: Option<u16>, reason: String },
    Error { message: Option<String> },
}

pub(crate) enum Command {
    Subscribe {
        key: SubscriptionKey,
        id: CallbackId,
        callback: EventCallback,
    },
    Unsubscribe {
        key: SubscriptionKey,
        id: CallbackId,
    },
    AddErrorCallback {
        id: CallbackId,
        callback: EventCallback,
    },
    RemoveErrorCallback {
        id: CallbackId,
    },
    Connect,
    ActiveSubscriptions {
        reply: oneshot::Sender<Vec<WireCommand>>,
    },
    Shutdown,
}

struct Delivery {
    callback: EventCallback,
    payload: Arc<serde_json::Value>,
    meta: Arc<EventMeta>,
}

/// Owns the connection, queue and registry; runs on one task so no state is shared.
pub(crate) struct Multiplexer {
    config: StreamingConfig,
    connector: Box<dyn WireConnector>,
    commands: mpsc::UnboundedReceiver<Command>,
    connectivity: broadcast::Sender<ConnectionEvent>,
    connection: Option<Arc<dyn WireConnection>>,
    events: Option<mpsc::UnboundedReceiver<WireEvent>>,
    reached_open: bool,
    failed_attempts: u32,
    queue: OutboundQueue,
    registry: SubscriptionRegistry,
    pending: VecDeque<Delivery>,
    keepalive_at: Option<Instant>,
    reconnect_at: Option<Instant>,
}

impl Multiplexer {
    pub(crate) fn new(
        config: StreamingConfig,
        connector: Box<dyn WireConnector>,
        commands: mpsc::UnboundedReceiver<Command>,
        connectivity: broadcast::Sender<ConnectionEvent>,
    ) -> Self {
        Self {
            config,
            connector,
            commands,
            connectivity,
            connection: None,
            events: None,
            reached_open: false,
            failed_attempts: 0,
            queue: OutboundQueue::new(),
            registry: SubscriptionRegistry::new(),
            pending: VecDeque::new(),
            keepalive_at: None,
            reconnect_at: None,
        }
    }

    /// Process commands and notifications until shutdown.
    ///
    /// Returns the fatal error that stopped the worker, if any.
    pub(crate) async fn run(mut self) -> Result<()> {
        debug!(url = %self.config.url, "streaming worker started");

        loop {
            // Callbacks from the previous step run before anything else is
            // processed, so their own subscribe/unsubscribe calls queue behind.
            self.flush_deliveries();

            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        self.stop();
                        return Ok(());
                    };
                    if self.handle_command(command).is_break() {
                        self.stop();
                        return Ok(());
                    }
                }
                event = next_event(&mut self.events) => {
                    if let Err(err) = self.handle_wire_event(event) {
                        error!(error = %err, "streaming protocol violation; stopping worker");
                        self.stop();
                        return Err(err);
                    }
                }
                result = self.queue.completion() => self.on_send_complete(result),
                _ = sleep_until_deadline(self.keepalive_at) => self.keepalive(),
                _ = sleep_until_deadline(self.reconnect_at) => self.on_reconnect_timer(),
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Subscribe { key, id, callback } => self.subscribe(key, id, callback),
            Command::Unsubscribe { key, id } => self.unsubscribe(&key, id),
            Command::AddErrorCallback { id, callback } => {
                self.registry.add_error_callback(id, callback);
            }
            Command::RemoveErrorCallback { id } => {
                self.registry.remove_error_callback(id);
            }
            Command::Connect => self.connect(),
            Command::ActiveSubscriptions { reply } => {
                let _ = reply.send(self.registry.records().cloned().collect());
            }
            Command::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn subscribe(&mut self, key: SubscriptionKey, id: CallbackId, callback: EventCallback) {
        if self.connection.is_none() {
            self.connect();
        }

        if let Some(command) = self.registry.register(key, id, callback) {
            self.enqueue(command);
        }
    }

    fn unsubscribe(&mut self, key: &SubscriptionKey, id: CallbackId) {
        match self.registry.remove(key, id) {
            Removal::LastRemoved { unsubscribe } => {
                self.enqueue(unsubscribe);
                if self.registry.is_empty() {
                    if let Some(connection) = &self.connection {
                        info!("no active subscriptions left; closing ws");
                        connection.close();
                    }
                }
            }
            Removal::Remaining(left) => {
                debug!(channel = key.kind(), figi = key.figi(), left, "callback removed");
            }
            Removal::NotFound => {
                debug!(channel = key.kind(), figi = key.figi(), id, "unsubscribe for unknown callback");
            }
        }
    }

    /// Open a new connection unless one is already connecting or open.
    fn connect(&mut self) {
        if let Some(connection) = &self.connection {
            if connection.ready_state().is_live() {
                return;
            }
            connection.terminate();
        }

        self.reconnect_at = None;
        let options = self.config.handshake_options();
        info!(url = %options.url, "ws connecting");

        let WireChannel { connection, events } = self.connector.open(&options);
        self.connection = Some(connection);
        self.events = Some(events);
        self.reached_open = false;
        self.queue.abandon_in_flight();
    }

    fn handle_wire_event(&mut self, event: Option<WireEvent>) -> Result<()> {
        match event {
            Some(WireEvent::Open) => self.on_open(),
            Some(WireEvent::Message(text)) => return self.on_message(&text),
            Some(WireEvent::Close { code, reason }) => self.on_close(code, reason),
            Some(WireEvent::Error(message)) => self.on_error(Some(message)),
            None => self.on_close(None, "event stream ended".to_string()),
        }
        Ok(())
    }

    fn on_open(&mut self) {
        self.reached_open = true;
        self.failed_attempts = 0;

        // Rebuild from the registry: whatever was queued before is stale.
        if self.connection.is_some() {
            let records: Vec<WireCommand> = self.registry.records().cloned().collect();
            self.queue.replace_with(records);
        }

        info!(subscriptions = self.registry.len(), "ws open");
        self.emit(ConnectionEvent::Opened);
        self.drain();
        self.keepalive();
    }

    fn on_close(&mut self, code: Option<u16>, reason: String) {
        info!(?code, %reason, "ws closed");
        self.emit(ConnectionEvent::Closed { code, reason });
        self.on_error(None);
    }

    fn on_error(&mut self, message: Option<String>) {
        self.keepalive_at = None;
        if let Some(message) = &message {
            warn!(error = %message, "ws error");
        }
        self.emit(ConnectionEvent::Error { message });

        let Some(connection) = self.connection.clone() else {
            return;
        };
        self.events = None;

        let state = connection.ready_state();
        if !matches!(state, ReadyState::Closing | ReadyState::Closed) {
            warn!(?state, "ws error on a live connection; notifications detached");
            return;
        }

        connection.terminate();
        self.connection = None;
        self.queue.abandon_in_flight();
        if !self.reached_open {
            self.failed_attempts = self.failed_attempts.saturating_add(1);
        }

        if self.registry.is_empty() {
            info!("ws down with no active subscriptions; staying idle");
        } else {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.config.reconnect_delay(self.failed_attempts);
        if delay.is_zero() {
            self.connect();
            return;
        }
        warn!(failed_attempts = self.failed_attempts, ?delay, "ws reconnect scheduled");
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn on_reconnect_timer(&mut self) {
        self.reconnect_at = None;
        if self.registry.is_empty() {
            return;
        }
        self.connect();
    }

    fn keepalive(&mut self) {
        match &self.connection {
            Some(connection) => {
                connection.ping(KEEPALIVE_PAYLOAD.to_vec());
                self.keepalive_at = Some(Instant::now() + self.config.keepalive_interval);
            }
            None => self.keepalive_at = None,
        }
    }

    fn on_message(&mut self, text: &str) -> Result<()> {
        match router::route(text) {
            Ok(Route::Subscription { key, payload, meta }) => {
                let callbacks = self.registry.callbacks(&key);
                log_message_sample_once(&key, callbacks.len());
                self.schedule(callbacks, payload, meta);
            }
            Ok(Route::StreamingError { payload, meta }) => {
                warn!(%payload, server_time = %meta.server_time, "streaming error from server");
                let callbacks = self.registry.error_callbacks();
                self.schedule(callbacks, payload, meta);
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => log_parse_fail_once(&err, text),
        }
        Ok(())
    }

    fn schedule(&mut self, callbacks: Vec<EventCallback>, payload: serde_json::Value, meta: EventMeta) {
        if callbacks.is_empty() {
            return;
        }
        let payload = Arc::new(payload);
        let meta = Arc::new(meta);
        self.pending.extend(callbacks.into_iter().map(|callback| Delivery {
            callback,
            payload: payload.clone(),
            meta: meta.clone(),
        }));
    }

    fn flush_deliveries(&mut self) {
        while let Some(Delivery {
            callback,
            payload,
            meta,
        }) = self.pending.pop_front()
        {
            callback(&*payload, &*meta);
        }
    }

    fn enqueue(&mut self, command: WireCommand) {
        self.queue.enqueue(command, self.connection.as_deref());
    }

    fn drain(&mut self) {
        self.queue.drain(self.connection.as_deref());
    }

    fn on_send_complete(&mut self, result: Result<()>) {
        if let Err(err) = result {
            debug!(error = %err, "ws send failed");
        }
        self.drain();
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.connectivity.send(event);
    }

    fn stop(&mut self) {
        self.keepalive_at = None;
        self.reconnect_at = None;
        self.events = None;
        self.pending.clear();
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        info!("streaming worker stopped");
    }
}

async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<WireEvent>>) -> Option<WireEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
