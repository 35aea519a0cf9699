/*
[INPUT]:  StreamingClient + configured channel subscriptions.
[OUTPUT]: Latest-per-FIGI typed snapshots via `watch` + connection state notifications.
[POS]:    Data layer - shared market data distribution (no trading logic).
[UPDATE]: When changing subscribed channels, snapshot types, or shutdown semantics.
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tinvest_adapter::{
    CandleEvent, ConnectionEvent, EventMeta, InstrumentInfoEvent, OrderbookEvent, StreamingClient,
    StreamingErrorPayload, Subscription, SubscriptionKey, decode_payload,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SubscriptionConfig;
use crate::metrics::{StreamMetrics, StreamMetricsSnapshot, channel_label};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected { code: Option<u16>, reason: String },
}

type Slot<T> = watch::Sender<Option<T>>;

/// Market data hub that keeps the latest event of every tracked channel.
///
/// This is intentionally data-only: it subscribes, decodes and publishes.
#[derive(Debug)]
pub struct MarketDataHub {
    client: StreamingClient,
    orderbooks: HashMap<String, Slot<OrderbookEvent>>,
    candles: HashMap<String, Slot<CandleEvent>>,
    instruments: HashMap<String, Slot<InstrumentInfoEvent>>,
    handles: Vec<Subscription>,
    metrics: Arc<Mutex<StreamMetrics>>,
    connection_state: watch::Sender<ConnectionState>,
    state_worker: JoinHandle<()>,
}

impl MarketDataHub {
    /// Create a hub over `client`. Must be called inside a Tokio runtime.
    pub fn new(client: StreamingClient) -> anyhow::Result<Self> {
        let metrics = Arc::new(Mutex::new(StreamMetrics::default()));
        let (connection_state, _rx) = watch::channel(ConnectionState::Connecting);

        let state_worker = tokio::spawn(track_connection(
            client.connection_events(),
            connection_state.clone(),
            metrics.clone(),
        ));

        let errors_metrics = metrics.clone();
        let errors = client.on_streaming_error(move |payload, meta| {
            match decode_payload::<StreamingErrorPayload>(payload) {
                Ok(error) => warn!(error = %error.error, request_id = ?error.request_id, server_time = %meta.server_time, "streaming error"),
                Err(_) => warn!(%payload, "streaming error"),
            }
            if let Ok(mut metrics) = errors_metrics.lock() {
                metrics.record_streaming_error();
            }
        })?;

        Ok(Self {
            client,
            orderbooks: HashMap::new(),
            candles: HashMap::new(),
            instruments: HashMap::new(),
            handles: vec![errors],
            metrics,
            connection_state,
            state_worker,
        })
    }

    /// Subscribe to one configured channel and start publishing its events.
    pub fn track(&mut self, subscription: &SubscriptionConfig) -> anyhow::Result<()> {
        let key = subscription.key();
        let label = channel_label(&key);
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.track(&label);
        }

        let handle = match &key {
            SubscriptionKey::Orderbook { figi, .. } => {
                let slot = slot_for(&mut self.orderbooks, figi);
                let on_event = publisher(label.clone(), slot, self.metrics.clone(), |book: &OrderbookEvent| {
                    book.best_bid().map(|level| level.price())
                });
                self.client.subscribe(key.clone(), on_event)?
            }
            SubscriptionKey::Candle { figi, .. } => {
                let slot = slot_for(&mut self.candles, figi);
                let on_event = publisher(label.clone(), slot, self.metrics.clone(), |candle: &CandleEvent| {
                    Some(candle.close)
                });
                self.client.subscribe(key.clone(), on_event)?
            }
            SubscriptionKey::InstrumentInfo { figi } => {
                let slot = slot_for(&mut self.instruments, figi);
                let on_event = publisher(label.clone(), slot, self.metrics.clone(), |_: &InstrumentInfoEvent| None);
                self.client.subscribe(key.clone(), on_event)?
            }
        };

        info!(channel = %label, "tracking channel");
        self.handles.push(handle);
        Ok(())
    }

    pub fn orderbook(&self, figi: &str) -> Option<watch::Receiver<Option<OrderbookEvent>>> {
        self.orderbooks.get(figi).map(watch::Sender::subscribe)
    }

    pub fn candle(&self, figi: &str) -> Option<watch::Receiver<Option<CandleEvent>>> {
        self.candles.get(figi).map(watch::Sender::subscribe)
    }

    pub fn instrument_info(&self, figi: &str) -> Option<watch::Receiver<Option<InstrumentInfoEvent>>> {
        self.instruments.get(figi).map(watch::Sender::subscribe)
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection_state.subscribe()
    }

    pub fn metrics(&self) -> StreamMetricsSnapshot {
        self.metrics
            .lock()
            .map(|metrics| metrics.snapshot())
            .unwrap_or_default()
    }

    pub fn stale_channels(&self, idle: std::time::Duration) -> Vec<String> {
        self.metrics
            .lock()
            .map(|metrics| metrics.stale_channels(idle))
            .unwrap_or_default()
    }

    /// Unsubscribe everything and stop the streaming worker.
    pub async fn shutdown(self) -> anyhow::Result<StreamMetricsSnapshot> {
        let snapshot = self.metrics();
        for handle in self.handles {
            handle.unsubscribe();
        }
        let result = self.client.shutdown().await;
        self.state_worker.abort();
        result?;
        Ok(snapshot)
    }
}

fn slot_for<T>(slots: &mut HashMap<String, Slot<T>>, figi: &str) -> Slot<T> {
    slots
        .entry(figi.to_string())
        .or_insert_with(|| watch::channel(None).0)
        .clone()
}

/// Callback that decodes `T`, publishes it and records metrics.
fn publisher<T, P>(
    label: String,
    slot: Slot<T>,
    metrics: Arc<Mutex<StreamMetrics>>,
    price_of: P,
) -> impl Fn(&serde_json::Value, &EventMeta) + Send + Sync + 'static
where
    T: serde::de::DeserializeOwned + Send + Sync + 'static,
    P: Fn(&T) -> Option<Decimal> + Send + Sync + 'static,
{
    move |payload: &serde_json::Value, meta: &EventMeta| match decode_payload::<T>(payload) {
        Ok(event) => {
            if let Ok(mut metrics) = metrics.lock() {
                metrics.record_event(&label, meta.server_time_utc(), price_of(&event));
            }
            slot.send_replace(Some(event));
        }
        Err(err) => debug!(channel = %label, error = %err, "undecodable event skipped"),
    }
}

async fn track_connection(
    mut events: broadcast::Receiver<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
    metrics: Arc<Mutex<StreamMetrics>>,
) {
    let mut opened_before = false;
    loop {
        match events.recv().await {
            Ok(ConnectionEvent::Opened) => {
                if opened_before {
                    if let Ok(mut metrics) = metrics.lock() {
                        metrics.record_reconnect();
                    }
                }
                opened_before = true;
                state.send_replace(ConnectionState::Connected);
            }
            Ok(ConnectionEvent::Closed { code, reason }) => {
                state.send_replace(ConnectionState::Disconnected { code, reason });
            }
            Ok(ConnectionEvent::Error { message }) => {
                if let Some(message) = message {
                    debug!(error = %message, "connection error");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "connection events lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
