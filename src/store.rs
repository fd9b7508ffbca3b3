//! Per-topic progress persistence.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

use crate::types::{TopicFilter, TopicKey};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to persist {field} for {key}: {reason}")]
pub struct StoreError {
    pub key: String,
    pub field: &'static str,
    pub reason: String,
}

impl StoreError {
    #[must_use]
    pub fn new(key: &TopicKey, field: &'static str, reason: impl Into<String>) -> Self {
        Self { key: key.to_string(), field, reason: reason.into() }
    }
}

/// Key-value store remembering how far each topic has been synced.
///
/// Reads are infallible: a missing or unreadable value is reported as absent, which makes the
/// subscriber fall back to the topic's default. Writes must be durable before they return `Ok`,
/// since the subscriber forwards a snapshot page only after its checkpoint was written.
pub trait ProgressStore: Send + Sync + 'static {
    /// Filter used to resolve the subscriber's topics.
    fn topic_filter(&self) -> TopicFilter;

    /// Last synced block timestamp of `key`.
    fn checkpoint(&self, key: &TopicKey) -> Option<u64>;

    fn set_checkpoint(&self, key: &TopicKey, timestamp: u64) -> Result<(), StoreError>;

    fn topic_string(&self, key: &TopicKey) -> Option<String>;

    fn set_topic_string(&self, key: &TopicKey, topic_string: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct Entry {
    checkpoint: Option<u64>,
    topic_string: Option<String>,
}

/// In-memory [`ProgressStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    filter: TopicFilter,
    entries: RwLock<HashMap<TopicKey, Entry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(filter: TopicFilter) -> Self {
        Self { filter, entries: RwLock::default() }
    }

    /// Pre-populates the checkpoint of `key`, e.g. from a previous run.
    #[must_use]
    pub fn with_checkpoint(self, key: TopicKey, timestamp: u64) -> Self {
        self.entries.write().entry(key).or_default().checkpoint = Some(timestamp);
        self
    }
}

impl ProgressStore for MemoryStore {
    fn topic_filter(&self) -> TopicFilter {
        self.filter.clone()
    }

    fn checkpoint(&self, key: &TopicKey) -> Option<u64> {
        self.entries.read().get(key).and_then(|entry| entry.checkpoint)
    }

    fn set_checkpoint(&self, key: &TopicKey, timestamp: u64) -> Result<(), StoreError> {
        self.entries.write().entry(key.clone()).or_default().checkpoint = Some(timestamp);
        Ok(())
    }

    fn topic_string(&self, key: &TopicKey) -> Option<String> {
        self.entries.read().get(key).and_then(|entry| entry.topic_string.clone())
    }

    fn set_topic_string(&self, key: &TopicKey, topic_string: &str) -> Result<(), StoreError> {
        self.entries.write().entry(key.clone()).or_default().topic_string =
            Some(topic_string.to_owned());
        Ok(())
    }
}

impl<S: ProgressStore> ProgressStore for std::sync::Arc<S> {
    fn topic_filter(&self) -> TopicFilter {
        (**self).topic_filter()
    }

    fn checkpoint(&self, key: &TopicKey) -> Option<u64> {
        (**self).checkpoint(key)
    }

    fn set_checkpoint(&self, key: &TopicKey, timestamp: u64) -> Result<(), StoreError> {
        (**self).set_checkpoint(key, timestamp)
    }

    fn topic_string(&self, key: &TopicKey) -> Option<String> {
        (**self).topic_string(key)
    }

    fn set_topic_string(&self, key: &TopicKey, topic_string: &str) -> Result<(), StoreError> {
        (**self).set_topic_string(key, topic_string)
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;

    use super::*;

    #[test]
    fn memory_store_tracks_fields_per_key() {
        let a = TopicKey::new("1", Address::with_last_byte(1));
        let b = TopicKey::new("1", Address::with_last_byte(2));
        let store =
            MemoryStore::new(TopicFilter::new().network_id("1")).with_checkpoint(a.clone(), 5);

        assert_eq!(store.checkpoint(&a), Some(5));
        assert_eq!(store.checkpoint(&b), None);

        store.set_checkpoint(&b, 9).unwrap();
        store.set_topic_string(&b, "n:1;s:token").unwrap();

        assert_eq!(store.checkpoint(&b), Some(9));
        assert_eq!(store.topic_string(&b).as_deref(), Some("n:1;s:token"));
        assert_eq!(store.topic_string(&a), None);
        assert_eq!(store.topic_filter().network_ids, vec!["1".to_owned()]);
    }
}
