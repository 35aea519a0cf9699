/*
[INPUT]:  StreamingConfig (URL + token) and application callbacks
[OUTPUT]: Orderbook/candle/instrument-info/error callbacks over one shared WebSocket
[POS]:    WebSocket layer - public streaming API
[UPDATE]: When adding new channels or changing subscription handles
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

use super::config::StreamingConfig;
use super::controller::{Command, ConnectionEvent, Multiplexer};
use super::key::{DEFAULT_ORDERBOOK_DEPTH, SubscriptionKey};
use super::message::{EventMeta, WireCommand};
use super::registry::{CallbackId, EventCallback};
use super::transport::WireConnector;
use super::tungstenite::TungsteniteConnector;
use crate::error::{Result, TinvestError};
use crate::types::CandleInterval;

const CONNECTION_EVENT_CAPACITY: usize = 64;

/// Streaming client for the Invest OpenAPI market data stream.
///
/// Every subscription shares one WebSocket. The connection is opened by the
/// first subscription, reopened (with all subscriptions replayed) when it
/// drops, and closed once the last subscription is cancelled.
///
/// Must be created inside a Tokio runtime; the connection is managed by a
/// background task that lives until [`StreamingClient::shutdown`] or drop.
#[derive(Debug)]
pub struct StreamingClient {
    commands: mpsc::UnboundedSender<Command>,
    connectivity: broadcast::Sender<ConnectionEvent>,
    next_id: Arc<AtomicU64>,
    worker: Option<JoinHandle<Result<()>>>,
}

impl StreamingClient {
    /// Create a client that connects with tokio-tungstenite.
    pub fn new(config: StreamingConfig) -> Result<Self> {
        Self::with_connector(config, TungsteniteConnector)
    }

    /// Create a client over a custom transport.
    pub fn with_connector(config: StreamingConfig, connector: impl WireConnector) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            TinvestError::Config("StreamingClient requires a Tokio runtime".to_string())
        })?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (connectivity, _rx) = broadcast::channel(CONNECTION_EVENT_CAPACITY);
        let multiplexer = Multiplexer::new(
            config,
            Box::new(connector),
            command_rx,
            connectivity.clone(),
        );

        Ok(Self {
            commands,
            connectivity,
            next_id: Arc::new(AtomicU64::new(1)),
            worker: Some(runtime.spawn(multiplexer.run())),
        })
    }

    /// Subscribe to orderbook updates; `depth` defaults to 3.
    pub fn subscribe_orderbook<F>(
        &self,
        figi: impl Into<String>,
        depth: Option<u32>,
        callback: F,
    ) -> Result<Subscription>
    where
        F: Fn(&serde_json::Value, &EventMeta) + Send + Sync + 'static,
    {
        let key = SubscriptionKey::orderbook(figi, depth.unwrap_or(DEFAULT_ORDERBOOK_DEPTH));
        self.subscribe(key, callback)
    }

    /// Subscribe to candles; `interval` defaults to one minute.
    pub fn subscribe_candle<F>(
        &self,
        figi: impl Into<String>,
        interval: Option<CandleInterval>,
        callback: F,
    ) -> Result<Subscription>
    where
        F: Fn(&serde_json::Value, &EventMeta) + Send + Sync + 'static,
    {
        let key = SubscriptionKey::candle(figi, interval.unwrap_or_default());
        self.subscribe(key, callback)
    }

    /// Subscribe to instrument metadata updates.
    pub fn subscribe_instrument_info<F>(
        &self,
        figi: impl Into<String>,
        callback: F,
    ) -> Result<Subscription>
    where
        F: Fn(&serde_json::Value, &EventMeta) + Send + Sync + 'static,
    {
        self.subscribe(SubscriptionKey::instrument_info(figi), callback)
    }

    /// Subscribe to any channel by key.
    pub fn subscribe<F>(&self, key: SubscriptionKey, callback: F) -> Result<Subscription>
    where
        F: Fn(&serde_json::Value, &EventMeta) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        let callback: EventCallback = Arc::new(callback);
        self.send(Command::Subscribe {
            key: key.clone(),
            id,
            callback,
        })?;

        Ok(Subscription {
            commands: self.commands.clone(),
            target: Target::Channel { key, id },
        })
    }

    /// Register a callback for errors reported by the streaming service.
    pub fn on_streaming_error<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(&serde_json::Value, &EventMeta) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.send(Command::AddErrorCallback {
            id,
            callback: Arc::new(callback),
        })?;

        Ok(Subscription {
            commands: self.commands.clone(),
            target: Target::StreamingError { id },
        })
    }

    /// Connectivity notifications (open, close, transport errors).
    pub fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connectivity.subscribe()
    }

    /// Open the connection now instead of on the first subscription.
    pub fn connect(&self) -> Result<()> {
        self.send(Command::Connect)
    }

    /// Subscribe commands that would be replayed on reconnect, in order.
    pub async fn active_subscriptions(&self) -> Result<Vec<WireCommand>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ActiveSubscriptions { reply })?;
        rx.await.map_err(|_| TinvestError::WorkerStopped)
    }

    /// Close the connection and stop the background task.
    ///
    /// Returns the protocol error that stopped the task earlier, if any.
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.commands.send(Command::Shutdown);
        match self.worker.take() {
            Some(worker) => worker.await.map_err(|err| {
                warn!(error = %err, "streaming worker panicked");
                TinvestError::WorkerStopped
            })?,
            None => Ok(()),
        }
    }

    fn allocate_id(&self) -> CallbackId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| TinvestError::WorkerStopped)
    }
}

impl Drop for StreamingClient {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

#[derive(Debug, Clone)]
enum Target {
    Channel { key: SubscriptionKey, id: CallbackId },
    StreamingError { id: CallbackId },
}

/// Handle returned by every subscribe call.
///
/// Dropping it keeps the callback registered; call
/// [`Subscription::unsubscribe`] to cancel. A callback already scheduled
/// for delivery may still fire once after cancelling.
#[derive(Debug)]
#[must_use = "dropping the handle leaves the subscription active with no way to cancel it"]
pub struct Subscription {
    commands: mpsc::UnboundedSender<Command>,
    target: Target,
}

impl Subscription {
    /// Key of the channel, `None` for streaming-error callbacks.
    pub fn key(&self) -> Option<&SubscriptionKey> {
        match &self.target {
            Target::Channel { key, .. } => Some(key),
            Target::StreamingError { .. } => None,
        }
    }

    /// Remove the callback. The last callback of a channel unsubscribes it
    /// on the wire; the last channel overall closes the connection.
    pub fn unsubscribe(self) {
        let command = match self.target {
            Target::Channel { key, id } => Command::Unsubscribe { key, id },
            Target::StreamingError { id } => Command::RemoveErrorCallback { id },
        };
        // A stopped worker has nothing left to unsubscribe.
        let _ = self.commands.send(command);
    }
}
