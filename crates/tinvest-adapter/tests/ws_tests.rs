/*
[INPUT]:  Scripted wire transport and streaming scenarios
[OUTPUT]: Test results for the streaming multiplexer
[POS]:    Integration tests - WebSocket
[UPDATE]: When connection lifecycle, queueing or routing changes
*/

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{MockConnector, recorder, settle, stream_config, test_token};
use serde_json::json;
use tinvest_adapter::{
    CandleInterval, ConnectionEvent, OrderbookEvent, StreamingClient, Subscription, SubscriptionKey,
    TinvestError, decode_payload,
};
use tokio_test::assert_ok;

fn client_with(connector: &MockConnector) -> StreamingClient {
    assert_ok!(StreamingClient::with_connector(stream_config(), connector.clone()))
}

fn orderbook_frame(figi: &str, depth: u32) -> serde_json::Value {
    json!({
        "event": "orderbook",
        "payload": {
            "figi": figi,
            "depth": depth,
            "bids": [[101.5, 10]],
            "asks": [[101.7, 4]]
        },
        "time": "2023-01-01T00:00:00Z"
    })
}

#[tokio::test]
async fn test_first_subscription_opens_connection_with_auth() {
    let connector = MockConnector::new();
    let client = client_with(&connector);
    settle().await;
    assert_eq!(connector.opened(), 0);

    let _handle = assert_ok!(client.subscribe_orderbook("AAPL-FIGI", None, |_, _| {}));
    settle().await;

    assert_eq!(connector.opened(), 1);
    let options = &connector.handshakes()[0];
    assert_eq!(options.url, "wss://stream.test/ws");
    assert_eq!(options.handshake_timeout, Duration::from_secs(4));
    assert!(!options.compression);
    assert!(
        options
            .headers
            .contains(&("Authorization".to_string(), format!("Bearer {}", test_token())))
    );
}

#[tokio::test]
async fn test_commands_wait_for_open_and_go_out_in_order() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let _book = assert_ok!(client.subscribe_orderbook("AAPL-FIGI", None, |_, _| {}));
    let _candle = assert_ok!(client.subscribe_candle("AAPL-FIGI", Some(CandleInterval::Hour), |_, _| {}));
    settle().await;

    let connection = connector.last();
    assert!(connection.sent().is_empty());

    connection.accept();
    settle().await;

    assert_eq!(
        connection.sent(),
        vec![
            json!({ "event": "orderbook:subscribe", "figi": "AAPL-FIGI", "depth": 3 }),
            json!({ "event": "candle:subscribe", "figi": "AAPL-FIGI", "interval": "hour" }),
        ]
    );
}

#[tokio::test]
async fn test_only_one_command_in_flight() {
    let connector = MockConnector::holding_sends();
    let client = client_with(&connector);

    let _a = assert_ok!(client.subscribe_instrument_info("A", |_, _| {}));
    let _b = assert_ok!(client.subscribe_instrument_info("B", |_, _| {}));
    settle().await;
    let connection = connector.last();
    connection.accept();
    settle().await;

    assert_eq!(connection.sent().len(), 1);
    assert_eq!(connection.sent()[0]["figi"], "A");

    connection.complete_send();
    settle().await;
    assert_eq!(connection.sent().len(), 2);
    assert_eq!(connection.sent()[1]["figi"], "B");
}

#[tokio::test]
async fn test_duplicate_subscriptions_share_one_wire_subscription() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let (first_seen, first) = recorder();
    let (second_seen, second) = recorder();
    let a = assert_ok!(client.subscribe_orderbook("AAPL-FIGI", Some(3), first));
    let b = assert_ok!(client.subscribe_orderbook("AAPL-FIGI", None, second));
    settle().await;
    let connection = connector.last();
    connection.accept();
    settle().await;

    assert_eq!(connection.sent_events(), vec!["orderbook:subscribe"]);

    connection.push(orderbook_frame("AAPL-FIGI", 3));
    settle().await;
    assert_eq!(first_seen.lock().unwrap().len(), 1);
    assert_eq!(second_seen.lock().unwrap().len(), 1);

    a.unsubscribe();
    settle().await;
    assert_eq!(connection.sent_events(), vec!["orderbook:subscribe"]);
    assert_eq!(connection.closes(), 0);

    connection.push(orderbook_frame("AAPL-FIGI", 3));
    settle().await;
    assert_eq!(first_seen.lock().unwrap().len(), 1);
    assert_eq!(second_seen.lock().unwrap().len(), 2);

    b.unsubscribe();
    settle().await;
    assert_eq!(
        connection.sent().last(),
        Some(&json!({ "event": "orderbook:unsubscribe", "figi": "AAPL-FIGI", "depth": 3 }))
    );
    assert_eq!(connection.closes(), 1);
}

#[tokio::test]
async fn test_different_depths_are_different_channels() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let _three = assert_ok!(client.subscribe_orderbook("F", Some(3), |_, _| {}));
    let _ten = assert_ok!(client.subscribe_orderbook("F", Some(10), |_, _| {}));
    settle().await;
    let connection = connector.last();
    connection.accept();
    settle().await;

    let depths: Vec<_> = connection.sent().iter().map(|frame| frame["depth"].clone()).collect();
    assert_eq!(depths, vec![json!(3), json!(10)]);
}

#[tokio::test]
async fn test_candle_interval_alias_shares_one_wire_subscription() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let (alias_seen, alias) = recorder();
    let (default_seen, default) = recorder();
    let _alias = assert_ok!(client.subscribe_candle(
        "X",
        Some(CandleInterval::Other("1min".to_string())),
        alias
    ));
    let _default = assert_ok!(client.subscribe_candle("X", None, default));
    settle().await;
    let connection = connector.last();
    connection.accept();
    settle().await;

    assert_eq!(
        connection.sent(),
        vec![json!({ "event": "candle:subscribe", "figi": "X", "interval": "1min" })]
    );

    connection.push(json!({
        "event": "candle",
        "payload": { "figi": "X", "interval": "1min", "o": 1.5 },
        "time": "2023-01-01T00:00:00Z"
    }));
    settle().await;
    assert_eq!(alias_seen.lock().unwrap().len(), 1);
    assert_eq!(default_seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unsubscribe_inside_callback_is_safe() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let sibling: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let first_calls = Arc::new(AtomicUsize::new(0));
    let (sibling_seen, sibling_callback) = recorder();

    let slot = sibling.clone();
    let calls = first_calls.clone();
    let _first = assert_ok!(client.subscribe_instrument_info("F", move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = slot.lock().unwrap().take() {
            handle.unsubscribe();
        }
    }));
    let second = assert_ok!(client.subscribe_instrument_info("F", sibling_callback));
    *sibling.lock().unwrap() = Some(second);
    settle().await;
    let connection = connector.last();
    connection.accept();
    settle().await;

    let frame = json!({ "event": "instrument_info", "payload": { "figi": "F", "lot": 1 }, "time": "" });
    connection.push(frame.clone());
    settle().await;
    assert!(sibling_seen.lock().unwrap().len() <= 1);
    let seen_for_first_event = sibling_seen.lock().unwrap().len();

    connection.push(frame);
    settle().await;
    assert_eq!(first_calls.load(Ordering::SeqCst), 2);
    assert_eq!(sibling_seen.lock().unwrap().len(), seen_for_first_event);
    assert_eq!(connection.sent_events(), vec!["instrument_info:subscribe"]);
    assert_eq!(connection.closes(), 0);
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    assert_ok!(client.connect());
    assert_ok!(client.connect());
    settle().await;
    assert_eq!(connector.opened(), 1);

    connector.last().accept();
    settle().await;
    assert_ok!(client.connect());
    let _handle = assert_ok!(client.subscribe_instrument_info("F", |_, _| {}));
    settle().await;
    assert_eq!(connector.opened(), 1);
}

#[tokio::test]
async fn test_subscribe_unsubscribe_leaves_no_state() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let handle = assert_ok!(client.subscribe_candle("F", None, |_, _| {}));
    assert_eq!(handle.key(), Some(&SubscriptionKey::candle("F", CandleInterval::OneMinute)));
    settle().await;
    let connection = connector.last();
    connection.accept();
    settle().await;

    handle.unsubscribe();
    settle().await;

    assert!(assert_ok!(client.active_subscriptions().await).is_empty());
    assert_eq!(
        connection.sent(),
        vec![
            json!({ "event": "candle:subscribe", "figi": "F", "interval": "1min" }),
            json!({ "event": "candle:unsubscribe", "figi": "F", "interval": "1min" }),
        ]
    );
    assert!(connection.is_terminated());
    assert_eq!(connector.opened(), 1);
}

#[tokio::test]
async fn test_reconnect_replays_active_subscriptions_only() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let _book = assert_ok!(client.subscribe_orderbook("A", None, |_, _| {}));
    let _info = assert_ok!(client.subscribe_instrument_info("B", |_, _| {}));
    settle().await;
    let first = connector.connection(0);
    first.accept();
    settle().await;
    assert_eq!(first.sent().len(), 2);

    first.drop_from_server(1006);
    settle().await;
    assert_eq!(connector.opened(), 2);

    // Queued while the new connection is still connecting; stale by the time it opens.
    let transient = assert_ok!(client.subscribe_candle("C", None, |_, _| {}));
    settle().await;
    transient.unsubscribe();
    settle().await;

    let second = connector.connection(1);
    second.accept();
    settle().await;

    assert_eq!(
        second.sent(),
        vec![
            json!({ "event": "orderbook:subscribe", "figi": "A", "depth": 3 }),
            json!({ "event": "instrument_info:subscribe", "figi": "B" }),
        ]
    );

    let active = assert_ok!(client.active_subscriptions().await);
    assert_eq!(active.len(), 2);
    assert_eq!(active[0].event, "orderbook:subscribe");
}

#[tokio::test(start_paused = true)]
async fn test_no_reconnect_when_idle() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    assert_ok!(client.connect());
    settle().await;
    let connection = connector.last();
    connection.accept();
    settle().await;

    connection.drop_from_server(1001);
    settle().await;
    tokio::time::advance(Duration::from_secs(120)).await;
    settle().await;

    assert_eq!(connector.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_pings_until_teardown() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let handle = assert_ok!(client.subscribe_instrument_info("F", |_, _| {}));
    settle().await;
    let connection = connector.last();
    connection.accept();
    settle().await;
    assert_eq!(connection.pings(), 1);

    tokio::time::advance(Duration::from_secs(15)).await;
    settle().await;
    assert_eq!(connection.pings(), 2);

    tokio::time::advance(Duration::from_secs(15)).await;
    settle().await;
    assert_eq!(connection.pings(), 3);

    handle.unsubscribe();
    settle().await;
    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;

    assert_eq!(connection.pings(), 3);
    assert_eq!(connector.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_handshakes_back_off() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let _handle = assert_ok!(client.subscribe_instrument_info("F", |_, _| {}));
    settle().await;
    connector.connection(0).fail("connection refused");
    settle().await;
    assert_eq!(connector.opened(), 1);

    tokio::time::advance(Duration::from_millis(999)).await;
    settle().await;
    assert_eq!(connector.opened(), 1);

    tokio::time::advance(Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(connector.opened(), 2);

    connector.connection(1).fail("connection refused");
    settle().await;
    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(connector.opened(), 2);

    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(connector.opened(), 3);

    // A successful open resets the backoff; the next drop reconnects at once.
    let third = connector.connection(2);
    third.accept();
    settle().await;
    third.drop_from_server(1006);
    settle().await;
    assert_eq!(connector.opened(), 4);
}

#[tokio::test]
async fn test_orderbook_event_delivered_once_with_server_time() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let (seen, callback) = recorder();
    let _handle = assert_ok!(client.subscribe_orderbook("AAPL-FIGI", Some(3), callback));
    settle().await;
    let connection = connector.last();
    connection.accept();
    settle().await;

    connection.push(orderbook_frame("AAPL-FIGI", 3));
    connection.push(orderbook_frame("OTHER-FIGI", 3));
    settle().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (payload, meta) = &seen[0];
    assert_eq!(meta.server_time, "2023-01-01T00:00:00Z");
    assert!(meta.server_time_utc().is_some());

    let book: OrderbookEvent = assert_ok!(decode_payload(payload));
    assert_eq!(book.figi, "AAPL-FIGI");
    assert_eq!(book.best_bid().map(|level| level.price().to_string()), Some("101.5".to_string()));
}

#[tokio::test]
async fn test_streaming_error_reaches_only_error_callbacks() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let (book_seen, book_callback) = recorder();
    let (errors_seen, error_callback) = recorder();
    let _book = assert_ok!(client.subscribe_orderbook("AAPL-FIGI", None, book_callback));
    let errors = assert_ok!(client.on_streaming_error(error_callback));
    settle().await;
    let connection = connector.last();
    connection.accept();
    settle().await;

    connection.push(json!({
        "event": "error",
        "payload": { "error": "bad figi", "request_id": null },
        "time": "2023-01-01T00:00:01Z"
    }));
    settle().await;

    assert!(book_seen.lock().unwrap().is_empty());
    {
        let errors_seen = errors_seen.lock().unwrap();
        assert_eq!(errors_seen.len(), 1);
        assert_eq!(errors_seen[0].0["error"], "bad figi");
    }

    errors.unsubscribe();
    settle().await;
    connection.push(json!({ "event": "error", "payload": { "error": "again" }, "time": "" }));
    settle().await;
    assert_eq!(errors_seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let (seen, callback) = recorder();
    let _handle = assert_ok!(client.subscribe_instrument_info("F", callback));
    settle().await;
    let connection = connector.last();
    connection.accept();
    settle().await;

    connection.push_raw("not json at all");
    connection.push(json!({ "event": "instrument_info", "payload": {}, "time": "" }));
    connection.push(json!({
        "event": "instrument_info",
        "payload": { "figi": "F", "trade_status": "normal_trading" },
        "time": ""
    }));
    settle().await;

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_ok!(client.shutdown().await);
}

#[tokio::test]
async fn test_unknown_event_stops_the_worker() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let _handle = assert_ok!(client.subscribe_instrument_info("F", |_, _| {}));
    settle().await;
    let connection = connector.last();
    connection.accept();
    settle().await;

    connection.push(json!({ "event": "trades", "payload": { "figi": "F" }, "time": "" }));
    settle().await;

    assert!(connection.closes() >= 1);
    assert!(matches!(
        client.subscribe_instrument_info("G", |_, _| {}),
        Err(TinvestError::WorkerStopped)
    ));
    assert!(matches!(
        client.shutdown().await,
        Err(TinvestError::UnknownEvent { event }) if event == "trades"
    ));
}

#[tokio::test]
async fn test_connection_events_are_broadcast() {
    let connector = MockConnector::new();
    let client = client_with(&connector);
    let mut events = client.connection_events();

    let _handle = assert_ok!(client.subscribe_instrument_info("F", |_, _| {}));
    settle().await;
    let first = connector.connection(0);
    first.accept();
    settle().await;
    first.drop_from_server(1001);
    settle().await;

    assert_eq!(assert_ok!(events.try_recv()), ConnectionEvent::Opened);
    assert_eq!(
        assert_ok!(events.try_recv()),
        ConnectionEvent::Closed {
            code: Some(1001),
            reason: "server going away".to_string(),
        }
    );
    assert_eq!(assert_ok!(events.try_recv()), ConnectionEvent::Error { message: None });
    assert_eq!(connector.opened(), 2);
}

#[tokio::test]
async fn test_error_on_live_connection_detaches_without_reconnect() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let (seen, callback) = recorder();
    let _handle = assert_ok!(client.subscribe_instrument_info("F", callback));
    settle().await;
    let connection = connector.last();
    connection.accept();
    settle().await;

    connection.report_error("protocol hiccup");
    settle().await;
    connection.push(json!({ "event": "instrument_info", "payload": { "figi": "F" }, "time": "" }));
    settle().await;

    assert!(seen.lock().unwrap().is_empty());
    assert!(!connection.is_terminated());
    assert_eq!(connector.opened(), 1);
}

#[tokio::test]
async fn test_shutdown_closes_connection() {
    let connector = MockConnector::new();
    let client = client_with(&connector);

    let _handle = assert_ok!(client.subscribe_instrument_info("F", |_, _| {}));
    settle().await;
    let connection = connector.last();
    connection.accept();
    settle().await;

    assert_ok!(client.shutdown().await);
    assert_eq!(connection.closes(), 1);
}
