//! Subscription handle returned by `listen`/`subscribe`.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::bus::registry::{Registry, Subscriber};
use crate::events::EventKey;

/// Handle to one listener registration.
///
/// Dropping the handle does **not** unsubscribe; the listener stays registered
/// until [`unsubscribe`](Subscription::unsubscribe), `remove_listeners` for its
/// key, or bus disposal. A handle obtained from a disposed bus is inert.
pub struct Subscription<K, T> {
    key: K,
    subscriber: Option<Arc<Subscriber<T>>>,
    registry: Weak<Registry<K, T>>,
}

impl<K: EventKey, T: Clone + Send + Sync + 'static> Subscription<K, T> {
    pub(crate) fn new(key: K, subscriber: Arc<Subscriber<T>>, registry: &Arc<Registry<K, T>>) -> Self {
        Self {
            key,
            subscriber: Some(subscriber),
            registry: Arc::downgrade(registry),
        }
    }

    pub(crate) fn inert(key: K) -> Self {
        Self {
            key,
            subscriber: None,
            registry: Weak::new(),
        }
    }

    /// Key this subscription listens on.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Whether the listener can still be called.
    pub fn is_active(&self) -> bool {
        self.subscriber.as_ref().is_some_and(|s| s.is_active())
    }

    /// Removes the listener. Calling it again (or on an inert handle) is a no-op.
    pub fn unsubscribe(&self) {
        let Some(sub) = &self.subscriber else {
            return;
        };
        sub.deactivate();
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(&self.key, sub.id());
        }
    }
}

impl<K: fmt::Debug, T: 'static> fmt::Debug for Subscription<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.subscriber.as_ref().map(|s| s.id()))
            .finish()
    }
}
