/*
[INPUT]:  TINVEST_TOKEN environment variable and a FIGI argument
[OUTPUT]: Orderbook and candle updates printed to stdout
[POS]:    Examples - streaming subscriptions
[UPDATE]: When the streaming API changes
*/

use tinvest_adapter::*;
use tokio::time::{Duration, sleep};

/// Example: stream an orderbook and one-minute candles for one instrument.
///
/// Usage: `TINVEST_TOKEN=... cargo run --example websocket_example -- BBG000B9XRY4`
#[tokio::main]
async fn main() -> Result<()> {
    let token = std::env::var("TINVEST_TOKEN")
        .map_err(|_| TinvestError::Config("TINVEST_TOKEN is not set".to_string()))?;
    let figi = std::env::args().nth(1).unwrap_or_else(|| "BBG000B9XRY4".to_string());

    let client = StreamingClient::new(StreamingConfig::production(token)?)?;
    let mut connectivity = client.connection_events();
    tokio::spawn(async move {
        while let Ok(event) = connectivity.recv().await {
            println!("connection: {event:?}");
        }
    });

    let errors = client.on_streaming_error(|payload, meta| {
        println!("[{}] streaming error: {payload}", meta.server_time);
    })?;

    let book = client.subscribe_orderbook(figi.clone(), Some(5), |payload, meta| {
        match decode_payload::<OrderbookEvent>(payload) {
            Ok(book) => println!(
                "[{}] {} bid={:?} ask={:?}",
                meta.server_time,
                book.figi,
                book.best_bid().map(|level| level.price()),
                book.best_ask().map(|level| level.price()),
            ),
            Err(err) => println!("undecodable orderbook: {err}"),
        }
    })?;

    let candles = client.subscribe_candle(figi, None, |payload, _meta| {
        if let Ok(candle) = decode_payload::<CandleEvent>(payload) {
            println!("{} {} o={} c={} v={}", candle.time, candle.figi, candle.open, candle.close, candle.volume);
        }
    })?;

    sleep(Duration::from_secs(30)).await;

    book.unsubscribe();
    candles.unsubscribe();
    errors.unsubscribe();
    client.shutdown().await
}
