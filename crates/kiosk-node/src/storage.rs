//! Persistent state store using RocksDB.

use crate::error::Result;
use crate::store::{Notification, StateStore, Topics};
use rocksdb::{Options, DB};
use std::path::Path;
use tokio::sync::broadcast;

/// RocksDB-backed [`StateStore`].
///
/// Notifications travel over in-process topics, so every instance that
/// wants them must share this value (typically behind an `Arc`).
pub struct RocksStore {
    db: DB,
    topics: Topics,
}

impl RocksStore {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self {
            db,
            topics: Topics::default(),
        })
    }
}

impl StateStore for RocksStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key.as_bytes())?)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db.put(key.as_bytes(), value)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.db.delete(key.as_bytes())?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let prefix_bytes = prefix.as_bytes();
        let mut entries = Vec::new();

        let iter = self.db.prefix_iterator(prefix_bytes);
        for item in iter {
            let (key, value) = item?;
            if key.starts_with(prefix_bytes) {
                entries.push((String::from_utf8_lossy(&key).into_owned(), value.to_vec()));
            } else {
                break;
            }
        }

        Ok(entries)
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Notification> {
        self.topics.subscribe(topic)
    }

    fn notify(&self, topic: &str, notification: Notification) {
        self.topics.notify(topic, notification);
    }
}
