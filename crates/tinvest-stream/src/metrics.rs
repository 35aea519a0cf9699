/*
[INPUT]:  Per-channel event updates (counts, server timestamps, prices)
[OUTPUT]: Snapshot-friendly channel metrics for periodic summaries
[POS]:    Shared runtime metrics between streaming callbacks and the runner
[UPDATE]: When adding/removing channel-level runtime signals
*/

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tinvest_adapter::SubscriptionKey;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelMetricsSnapshot {
    pub events: u64,
    pub last_price: Option<Decimal>,
    pub last_server_time: Option<DateTime<Utc>>,
    /// Receive time minus server time of the last event, in milliseconds
    pub last_lag_ms: Option<i64>,
}

#[derive(Debug, Default)]
struct ChannelMetrics {
    events: u64,
    last_price: Option<Decimal>,
    last_server_time: Option<DateTime<Utc>>,
    last_lag_ms: Option<i64>,
    last_update: Option<Instant>,
}

/// Metrics for every tracked channel, keyed by a readable label.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    channels: BTreeMap<String, ChannelMetrics>,
    streaming_errors: u64,
    reconnects: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMetricsSnapshot {
    pub channels: BTreeMap<String, ChannelMetricsSnapshot>,
    pub streaming_errors: u64,
    pub reconnects: u64,
}

impl StreamMetricsSnapshot {
    pub fn total_events(&self) -> u64 {
        self.channels.values().map(|channel| channel.events).sum()
    }
}

/// `orderbook:FIGI:depth`, `candle:FIGI:interval`, `instrument_info:FIGI`
pub fn channel_label(key: &SubscriptionKey) -> String {
    match key {
        SubscriptionKey::Orderbook { figi, depth } => format!("{}:{figi}:{depth}", key.kind()),
        SubscriptionKey::Candle { figi, interval } => format!("{}:{figi}:{interval}", key.kind()),
        SubscriptionKey::InstrumentInfo { figi } => format!("{}:{figi}", key.kind()),
    }
}

impl StreamMetrics {
    pub fn track(&mut self, label: &str) {
        self.channels.entry(label.to_string()).or_default();
    }

    pub fn record_event(&mut self, label: &str, server_time: Option<DateTime<Utc>>, price: Option<Decimal>) {
        let channel = self.channels.entry(label.to_string()).or_default();
        channel.events = channel.events.saturating_add(1);
        channel.last_update = Some(Instant::now());
        if price.is_some() {
            channel.last_price = price;
        }
        if let Some(server_time) = server_time {
            channel.last_server_time = Some(server_time);
            channel.last_lag_ms = Some((Utc::now() - server_time).num_milliseconds());
        }
    }

    pub fn record_streaming_error(&mut self) {
        self.streaming_errors = self.streaming_errors.saturating_add(1);
    }

    pub fn record_reconnect(&mut self) {
        self.reconnects = self.reconnects.saturating_add(1);
    }

    /// Labels of channels with no event for at least `idle`.
    pub fn stale_channels(&self, idle: std::time::Duration) -> Vec<String> {
        self.channels
            .iter()
            .filter(|(_, channel)| channel.last_update.is_none_or(|at| at.elapsed() >= idle))
            .map(|(label, _)| label.clone())
            .collect()
    }

    pub fn snapshot(&self) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot {
            channels: self
                .channels
                .iter()
                .map(|(label, channel)| {
                    (
                        label.clone(),
                        ChannelMetricsSnapshot {
                            events: channel.events,
                            last_price: channel.last_price,
                            last_server_time: channel.last_server_time,
                            last_lag_ms: channel.last_lag_ms,
                        },
                    )
                })
                .collect(),
            streaming_errors: self.streaming_errors,
            reconnects: self.reconnects,
        }
    }
}
