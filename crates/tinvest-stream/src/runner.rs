/*
[INPUT]:  StreamConfig and a shutdown token
[OUTPUT]: Running market data hub with periodic metrics summaries
[POS]:    Orchestration - wires configuration, streaming client and hub
[UPDATE]: When changing startup order, reporting, or shutdown handling
*/

use std::time::Duration;

use anyhow::Context;
use tinvest_adapter::{StreamingClient, WireConnector};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::StreamConfig;
use crate::market_data::{ConnectionState, MarketDataHub};
use crate::metrics::StreamMetricsSnapshot;

/// Stream until `shutdown` is cancelled; returns the final metrics.
pub async fn run(config: StreamConfig, shutdown: CancellationToken) -> anyhow::Result<StreamMetricsSnapshot> {
    let client = StreamingClient::new(config.streaming_config()?).context("create streaming client")?;
    run_with_client(config, client, shutdown).await
}

/// Same as [`run`] over a custom transport.
pub async fn run_with_connector(
    config: StreamConfig,
    connector: impl WireConnector,
    shutdown: CancellationToken,
) -> anyhow::Result<StreamMetricsSnapshot> {
    let client = StreamingClient::with_connector(config.streaming_config()?, connector)
        .context("create streaming client")?;
    run_with_client(config, client, shutdown).await
}

async fn run_with_client(
    config: StreamConfig,
    client: StreamingClient,
    shutdown: CancellationToken,
) -> anyhow::Result<StreamMetricsSnapshot> {
    let mut hub = MarketDataHub::new(client)?;
    for subscription in &config.subscriptions {
        hub.track(subscription)
            .with_context(|| format!("subscribe {subscription:?}"))?;
    }
    info!(channels = config.subscriptions.len(), url = %config.stream_url, "streaming started");

    let report_every = Duration::from_secs(config.report_interval_secs);
    let mut report = tokio::time::interval(report_every);
    report.tick().await;
    let mut connection = hub.subscribe_connection_state();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = report.tick() => log_summary(&hub, report_every),
            changed = connection.changed() => {
                if changed.is_err() {
                    warn!("connection state tracker stopped");
                    break;
                }
                match &*connection.borrow_and_update() {
                    ConnectionState::Connected => info!("stream connected"),
                    ConnectionState::Disconnected { code, reason } => warn!(?code, %reason, "stream disconnected"),
                    ConnectionState::Connecting => {}
                }
            }
        }
    }

    info!("stopping stream");
    let snapshot = hub.shutdown().await.context("stop streaming client")?;
    info!(
        events = snapshot.total_events(),
        streaming_errors = snapshot.streaming_errors,
        reconnects = snapshot.reconnects,
        "stream stopped"
    );
    Ok(snapshot)
}

fn log_summary(hub: &MarketDataHub, window: Duration) {
    let snapshot = hub.metrics();
    for (channel, metrics) in &snapshot.channels {
        info!(
            %channel,
            events = metrics.events,
            last_price = ?metrics.last_price,
            lag_ms = ?metrics.last_lag_ms,
            "channel summary"
        );
    }
    let stale = hub.stale_channels(window);
    if !stale.is_empty() {
        warn!(?stale, "channels without events in the last window");
    }
}
