//! # Dedup window.
//!
//! Suppresses back-to-back identical emissions (same key, payload and status;
//! optionally the same error text) that arrive within a short window.
//!
//! ## Internal scheme
//! ```text
//! should_suppress(key, env):
//!   ├─ identity registered and not expired  → true  (state unchanged)
//!   └─ otherwise → register(identity, now + window)
//!                  spawn eviction: sleep(window) ─► remove if expired
//!                                  (cancelled with the bus token; no-op once
//!                                   the window state is gone)
//!                  → false
//! ```
//!
//! Expiry is also checked on lookup, so a late or missing eviction only delays
//! reclaiming memory, never suppresses for longer than the window. Outside a
//! tokio runtime no timer is spawned and expired entries are purged on access.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::EqualityPolicy;
use crate::events::{Envelope, EventKey, Status};

#[derive(Clone, PartialEq, Eq, Hash)]
struct Identity<K, T> {
    key: K,
    payload: T,
    status: Status,
    error: Option<String>,
}

type Recent<K, T> = Mutex<HashMap<Identity<K, T>, Instant>>;

pub(crate) struct DedupWindow<K, T> {
    window: Option<Duration>,
    equality: EqualityPolicy,
    recent: Arc<Recent<K, T>>,
}

impl<K, T> DedupWindow<K, T>
where
    K: EventKey,
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub(crate) fn new(window: Option<Duration>, equality: EqualityPolicy) -> Self {
        Self {
            window,
            equality,
            recent: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns `true` when `env` duplicates a recent emission under `key`.
    ///
    /// Otherwise registers it for the length of the window and returns `false`.
    pub(crate) fn should_suppress(
        &self,
        key: &K,
        env: &Envelope<T>,
        token: &CancellationToken,
    ) -> bool {
        let Some(window) = self.window else {
            return false;
        };
        let identity = self.identity(key, env);
        let now = Instant::now();
        let expires = now + window;

        {
            let mut recent = self.recent.lock();
            if recent.get(&identity).is_some_and(|exp| *exp > now) {
                return true;
            }
            recent.insert(identity.clone(), expires);
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let recent = Arc::downgrade(&self.recent);
                let token = token.clone();
                handle.spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep_until(expires) => evict(&recent, &identity),
                        _ = token.cancelled() => {}
                    }
                });
            }
            Err(_) => self.recent.lock().retain(|_, exp| *exp > now),
        }
        false
    }

    pub(crate) fn clear(&self) {
        self.recent.lock().clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.recent.lock().len()
    }

    fn identity(&self, key: &K, env: &Envelope<T>) -> Identity<K, T> {
        let error = match self.equality {
            EqualityPolicy::PayloadStatus => None,
            EqualityPolicy::PayloadStatusError => env.error_ref().map(|e| e.to_string()),
        };
        Identity {
            key: key.clone(),
            payload: env.payload().clone(),
            status: env.status(),
            error,
        }
    }
}

/// Drops `identity` if its registration has expired (a newer one may have replaced it).
fn evict<K: EventKey, T: Eq + Hash>(recent: &Weak<Recent<K, T>>, identity: &Identity<K, T>) {
    let Some(recent) = recent.upgrade() else {
        return;
    };
    let mut recent = recent.lock();
    if recent
        .get(identity)
        .is_some_and(|exp| *exp <= Instant::now())
    {
        recent.remove(identity);
    }
}
