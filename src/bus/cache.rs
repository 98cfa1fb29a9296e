//! # Last-value cache.
//!
//! Remembers, per key, the most recent envelope a late listener can act on.
//! `Started` is transient and never stored: a listener arriving after processing
//! began cannot do anything useful with "it started".
//!
//! The cache is optionally bounded; when full, the key holding the oldest
//! envelope (lowest `seq`) is evicted.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::events::{Envelope, EventKey};

pub(crate) struct LastValueCache<K, T> {
    entries: Mutex<HashMap<K, Envelope<T>>>,
    limit: Option<usize>,
}

impl<K: EventKey, T: Clone> LastValueCache<K, T> {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            limit,
        }
    }

    /// Stores `env` under `key` unless its status is `Started`. Returns whether it was stored.
    pub(crate) fn record_if_replayable(&self, key: K, env: &Envelope<T>) -> bool {
        if !env.status().is_replayable() {
            return false;
        }
        let mut entries = self.entries.lock();
        if let Some(limit) = self.limit {
            if entries.len() >= limit && !entries.contains_key(&key) {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, cached)| cached.seq())
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(key, env.clone());
        true
    }

    pub(crate) fn get(&self, key: &K) -> Option<Envelope<T>> {
        self.entries.lock().get(key).cloned()
    }

    pub(crate) fn clear(&self, key: &K) {
        self.entries.lock().remove(key);
    }

    pub(crate) fn clear_all(&self) {
        self.entries.lock().clear();
    }
}
