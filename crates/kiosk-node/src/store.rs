//! State store: string keys, JSON values, and named broadcast topics.
//!
//! Every running instance (kiosk display, admin console, report viewer)
//! talks to the same [`StateStore`]. Values are whole JSON documents per
//! key; notifications are best-effort and fire-and-forget.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};
use tokio::sync::broadcast;

/// Capacity of each topic's broadcast buffer.
pub const TOPIC_CAPACITY: usize = 1024;

/// A notification on a broadcast topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Instance that published the update
    pub origin: String,
    /// JSON object whose keys are the updated state fields
    pub payload: String,
}

/// Durable keyed storage plus a notification channel.
pub trait StateStore: Send + Sync {
    /// Read a raw value.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a raw value, replacing any previous one.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a value.
    fn delete(&self, key: &str) -> Result<()>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Subscribe to a topic. Only notifications sent after this call arrive.
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Notification>;

    /// Send a notification to every current subscriber of a topic.
    fn notify(&self, topic: &str, notification: Notification);
}

/// Named broadcast channels, created on first use.
#[derive(Debug, Default)]
pub struct Topics {
    senders: Mutex<HashMap<String, broadcast::Sender<Notification>>>,
}

impl Topics {
    fn sender(&self, topic: &str) -> broadcast::Sender<Notification> {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    /// Subscribe to a topic.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Notification> {
        self.sender(topic).subscribe()
    }

    /// Send to a topic. Having no subscribers is not an error.
    pub fn notify(&self, topic: &str, notification: Notification) {
        let _ = self.sender(topic).send(notification);
    }
}

/// In-process store, used by tests and single-process demos.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    topics: Topics,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Storage("memory store lock poisoned".into())
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Notification> {
        self.topics.subscribe(topic)
    }

    fn notify(&self, topic: &str, notification: Notification) {
        self.topics.notify(topic, notification);
    }
}
