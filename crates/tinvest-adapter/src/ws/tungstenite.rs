/*
[INPUT]:  HandshakeOptions (URL, timeout, auth headers)
[OUTPUT]: WireConnection backed by tokio-tungstenite + WireEvent notifications
[POS]:    WebSocket layer - production socket adapter
[UPDATE]: When changing socket I/O, handshake or close handling
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, Request};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::transport::{
    HandshakeOptions, ReadyState, SendCompletion, WireChannel, WireConnection, WireConnector,
    WireEvent,
};
use crate::error::{Result, TinvestError};

/// Opens real WebSocket connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl WireConnector for TungsteniteConnector {
    fn open(&self, options: &HandshakeOptions) -> WireChannel {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));
        let cancel = CancellationToken::new();

        let connection = Arc::new(TungsteniteConnection {
            state: state.clone(),
            outbound: outbound_tx,
            cancel: cancel.clone(),
        });

        tokio::spawn(run_socket(
            options.clone(),
            state,
            outbound_rx,
            event_tx,
            cancel,
        ));

        WireChannel {
            connection,
            events: event_rx,
        }
    }
}

#[derive(Debug)]
enum Outbound {
    Text(String, oneshot::Sender<Result<()>>),
    Ping(Vec<u8>),
    Close,
}

#[derive(Debug)]
pub struct TungsteniteConnection {
    state: Arc<AtomicU8>,
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

impl WireConnection for TungsteniteConnection {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn send(&self, text: String) -> SendCompletion {
        let (done_tx, done_rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(Outbound::Text(_, done_tx))) =
            self.outbound.send(Outbound::Text(text, done_tx))
        {
            let _ = done_tx.send(Err(TinvestError::WebSocket(
                "socket task has exited".to_string(),
            )));
        }
        done_rx
    }

    fn ping(&self, payload: Vec<u8>) {
        let _ = self.outbound.send(Outbound::Ping(payload));
    }

    fn close(&self) {
        if self.ready_state().is_live() {
            self.state
                .store(ReadyState::Closing as u8, Ordering::Release);
        }
        let _ = self.outbound.send(Outbound::Close);
    }

    fn terminate(&self) {
        self.state.store(ReadyState::Closed as u8, Ordering::Release);
        self.cancel.cancel();
    }
}

fn build_request(options: &HandshakeOptions) -> Result<Request<()>> {
    let mut request = options
        .url
        .as_str()
        .into_client_request()
        .map_err(|err| TinvestError::WebSocket(err.to_string()))?;

    for (name, value) in &options.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| TinvestError::Config(format!("invalid header name: {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| TinvestError::Config(format!("invalid header value: {err}")))?;
        request.headers_mut().insert(name, value);
    }

    Ok(request)
}

async fn run_socket(
    options: HandshakeOptions,
    state: Arc<AtomicU8>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    event_tx: mpsc::UnboundedSender<WireEvent>,
    cancel: CancellationToken,
) {
    let set_state = |value: ReadyState| state.store(value as u8, Ordering::Release);

    let request = match build_request(&options) {
        Ok(request) => request,
        Err(err) => {
            set_state(ReadyState::Closed);
            let _ = event_tx.send(WireEvent::Error(err.to_string()));
            return;
        }
    };

    // tungstenite never negotiates permessage-deflate, which is what
    // `compression: false` asks for.
    debug!(url = %options.url, compression = options.compression, "ws handshake starting");

    let handshake = tokio::select! {
        _ = cancel.cancelled() => return,
        result = tokio::time::timeout(options.handshake_timeout, connect_async(request)) => result,
    };

    let ws_stream = match handshake {
        Ok(Ok((ws_stream, _response))) => ws_stream,
        Ok(Err(err)) => {
            set_state(ReadyState::Closed);
            warn!(url = %options.url, error = %err, "ws handshake failed");
            let _ = event_tx.send(WireEvent::Error(err.to_string()));
            return;
        }
        Err(_) => {
            set_state(ReadyState::Closed);
            let err = TinvestError::HandshakeTimeout {
                duration: options.handshake_timeout,
            };
            warn!(url = %options.url, error = %err, "ws handshake failed");
            let _ = event_tx.send(WireEvent::Error(err.to_string()));
            return;
        }
    };

    // `close()` may have been requested while the handshake was running.
    if state
        .compare_exchange(
            ReadyState::Connecting as u8,
            ReadyState::Open as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .is_ok()
    {
        info!(url = %options.url, "ws connected");
        let _ = event_tx.send(WireEvent::Open);
    }

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("ws socket terminated");
                break;
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Text(text, done_tx)) => {
                        let result = write
                            .send(WsMessage::Text(text.into()))
                            .await
                            .map_err(|err| TinvestError::WebSocket(err.to_string()));
                        let failed = result.as_ref().err().map(|err| err.to_string());
                        let _ = done_tx.send(result);
                        if let Some(message) = failed {
                            set_state(ReadyState::Closed);
                            let _ = event_tx.send(WireEvent::Error(message));
                            break;
                        }
                    }
                    Some(Outbound::Ping(payload)) => {
                        if let Err(err) = write.send(WsMessage::Ping(payload.into())).await {
                            debug!(error = %err, "ws ping failed");
                        }
                    }
                    Some(Outbound::Close) => {
                        set_state(ReadyState::Closing);
                        let _ = write.send(WsMessage::Close(None)).await;
                    }
                    None => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(WsMessage::Close(frame))) => {
                        set_state(ReadyState::Closed);
                        let (code, reason) = frame
                            .map(|frame| (Some(u16::from(frame.code)), frame.reason.as_str().to_owned()))
                            .unwrap_or((None, String::new()));
                        let _ = event_tx.send(WireEvent::Close { code, reason });
                        break;
                    }
                    Some(Ok(WsMessage::Text(text))) => {
                        let _ = event_tx.send(WireEvent::Message(text.as_str().to_owned()));
                    }
                    Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => {
                            let _ = event_tx.send(WireEvent::Message(text));
                        }
                        Err(err) => debug!(error = %err, "ws binary frame is not utf-8"),
                    },
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        set_state(ReadyState::Closed);
                        let _ = event_tx.send(WireEvent::Error(err.to_string()));
                        let _ = event_tx.send(WireEvent::Close { code: None, reason: String::new() });
                        break;
                    }
                    None => {
                        set_state(ReadyState::Closed);
                        let _ = event_tx.send(WireEvent::Close { code: None, reason: String::new() });
                        break;
                    }
                }
            }
        }
    }

    set_state(ReadyState::Closed);
}
