/*
[INPUT]:  Callback registrations and removals keyed by SubscriptionKey
[OUTPUT]: Wire subscribe/unsubscribe decisions, replay records, callback snapshots
[POS]:    WebSocket layer - subscription bookkeeping
[UPDATE]: When changing deduplication or resubscription rules
*/

use std::fmt;
use std::sync::Arc;

use super::key::SubscriptionKey;
use super::message::{EventMeta, WireCommand};

/// Callback invoked with an event payload and its metadata.
pub type EventCallback = Arc<dyn Fn(&serde_json::Value, &EventMeta) + Send + Sync>;

/// Identifies one registered callback.
pub type CallbackId = u64;

struct Entry {
    key: SubscriptionKey,
    record: WireCommand,
    callbacks: Vec<(CallbackId, EventCallback)>,
}

/// Outcome of removing a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// No such callback was registered.
    NotFound,
    /// Other callbacks still listen on the key.
    Remaining(usize),
    /// The key has no listeners left; its record is gone.
    LastRemoved { unsubscribe: WireCommand },
}

/// Subscription records and local callback sets, in registration order.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Vec<Entry>,
    error_callbacks: Vec<(CallbackId, EventCallback)>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `key`.
    ///
    /// Returns the subscribe command to put on the wire when this is the
    /// first callback for the key; that command is also kept as the record.
    pub fn register(
        &mut self,
        key: SubscriptionKey,
        id: CallbackId,
        callback: EventCallback,
    ) -> Option<WireCommand> {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.key == key) {
            entry.callbacks.push((id, callback));
            return None;
        }

        let record = WireCommand::subscribe(&key);
        self.entries.push(Entry {
            key,
            record: record.clone(),
            callbacks: vec![(id, callback)],
        });
        Some(record)
    }

    pub fn remove(&mut self, key: &SubscriptionKey, id: CallbackId) -> Removal {
        let Some(index) = self.entries.iter().position(|entry| &entry.key == key) else {
            return Removal::NotFound;
        };

        let entry = &mut self.entries[index];
        let before = entry.callbacks.len();
        entry.callbacks.retain(|(existing, _)| *existing != id);
        if entry.callbacks.len() == before {
            return Removal::NotFound;
        }
        if !entry.callbacks.is_empty() {
            return Removal::Remaining(entry.callbacks.len());
        }

        let entry = self.entries.remove(index);
        Removal::LastRemoved {
            unsubscribe: WireCommand::unsubscribe(&entry.key),
        }
    }

    /// Subscribe commands to replay after a reconnect, in registration order.
    pub fn records(&self) -> impl Iterator<Item = &WireCommand> {
        self.entries.iter().map(|entry| &entry.record)
    }

    /// Snapshot of the callbacks listening on `key`.
    pub fn callbacks(&self, key: &SubscriptionKey) -> Vec<EventCallback> {
        self.entries
            .iter()
            .find(|entry| &entry.key == key)
            .map(|entry| entry.callbacks.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default()
    }

    pub fn callback_count(&self, key: &SubscriptionKey) -> usize {
        self.entries
            .iter()
            .find(|entry| &entry.key == key)
            .map_or(0, |entry| entry.callbacks.len())
    }

    /// Number of keys with at least one callback.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add_error_callback(&mut self, id: CallbackId, callback: EventCallback) {
        self.error_callbacks.push((id, callback));
    }

    pub fn remove_error_callback(&mut self, id: CallbackId) -> bool {
        let before = self.error_callbacks.len();
        self.error_callbacks.retain(|(existing, _)| *existing != id);
        self.error_callbacks.len() != before
    }

    pub fn error_callbacks(&self) -> Vec<EventCallback> {
        self.error_callbacks.iter().map(|(_, cb)| cb.clone()).collect()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field(
                "keys",
                &self
                    .entries
                    .iter()
                    .map(|entry| (&entry.key, entry.callbacks.len()))
                    .collect::<Vec<_>>(),
            )
            .field("error_callbacks", &self.error_callbacks.len())
            .finish()
    }
}
