/*
[INPUT]:  Wire commands from subscribe/unsubscribe and reconnect replay
[OUTPUT]: Frames handed to the open connection, one at a time, in FIFO order
[POS]:    WebSocket layer - outbound sequencing
[UPDATE]: When changing send ordering or in-flight tracking
*/

use std::collections::VecDeque;

use tracing::{debug, warn};

use super::log::log_subscription_sent;
use super::message::WireCommand;
use super::transport::{ReadyState, SendCompletion, WireConnection};
use crate::error::{Result, TinvestError};

#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<WireCommand>,
    in_flight: Option<SendCompletion>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail and try to send.
    pub fn enqueue(&mut self, command: WireCommand, connection: Option<&dyn WireConnection>) {
        self.pending.push_back(command);
        self.drain(connection);
    }

    /// Send the head command if the connection is open and nothing is in flight.
    ///
    /// With no open connection the queue is left untouched.
    pub fn drain(&mut self, connection: Option<&dyn WireConnection>) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(connection) = connection else {
            return;
        };
        if connection.ready_state() != ReadyState::Open {
            return;
        }

        while let Some(command) = self.pending.pop_front() {
            match command.to_text() {
                Ok(text) => {
                    debug!(event = %command.event, queued = self.pending.len(), "ws command sending");
                    self.in_flight = Some(connection.send(text));
                    log_subscription_sent(&command);
                    return;
                }
                Err(err) => {
                    warn!(event = %command.event, error = %err, "ws command dropped: serialization failed");
                }
            }
        }
    }

    /// Replace everything queued with `commands`, forgetting any in-flight send.
    pub fn replace_with(&mut self, commands: impl IntoIterator<Item = WireCommand>) {
        self.pending.clear();
        self.pending.extend(commands);
        self.in_flight = None;
    }

    /// Forget the in-flight send of a connection that is going away.
    pub fn abandon_in_flight(&mut self) {
        self.in_flight = None;
    }

    /// Wait for the in-flight send to complete; pending forever when idle.
    ///
    /// The caller must run [`OutboundQueue::drain`] afterwards to send the next command.
    pub async fn completion(&mut self) -> Result<()> {
        let result = match self.in_flight.as_mut() {
            Some(done) => done
                .await
                .unwrap_or_else(|_| Err(TinvestError::WebSocket("send completion dropped".into()))),
            None => std::future::pending().await,
        };
        self.in_flight = None;
        result
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WireCommand> {
        self.pending.iter()
    }
}
