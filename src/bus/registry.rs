//! # Per-key subscription registry.
//!
//! Keeps, for every key, the ordered list of active subscribers and delivers
//! envelopes to them.
//!
//! ## Architecture
//! ```text
//! notify(key, env)
//!     │
//!     ├─ lock entries ─► clone Vec<Arc<Subscriber>> ─► unlock     (snapshot)
//!     │
//!     ├──► subscriber1.deliver(env) ──► [pending replay] ──► on_envelope()
//!     │                                      └─ Err / panic ─► on_error()
//!     ├──► subscriber2.deliver(env)
//!     └──► subscriberN.deliver(env)
//! ```
//!
//! ## Rules
//! - **Snapshot iteration**: subscribers added during a pass are not called in it
//! - **Deactivate on removal**: a removed subscriber is skipped from that moment on,
//!   even if it is still in a snapshot being iterated
//! - **Isolation**: a failing or panicking listener does not affect the others
//! - **Per-subscriber serial**: calls into one subscriber never overlap; a pending
//!   replay is always delivered before the next live envelope
//! - **No lock held across callbacks**: callbacks may re-enter the registry
//!
//! ## Panic handling
//! Callbacks run inside `catch_unwind` with `AssertUnwindSafe`, so a listener that
//! panics while holding its own locks may leave its own state inconsistent.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, ReentrantMutex};

use crate::error::{ListenerError, panic_message};
use crate::events::{Envelope, EventKey};
use crate::listeners::Subscribe;

/// One registered listener.
pub(crate) struct Subscriber<T> {
    id: u64,
    listener: Arc<dyn Subscribe<T>>,
    active: AtomicBool,
    /// Serialises calls into this listener (re-entrant for nested emits).
    serial: ReentrantMutex<()>,
    pending_replay: Mutex<Option<Envelope<T>>>,
}

impl<T: 'static> Subscriber<T> {
    fn new(id: u64, listener: Arc<dyn Subscribe<T>>) -> Self {
        Self {
            id,
            listener,
            active: AtomicBool::new(true),
            serial: ReentrantMutex::new(()),
            pending_replay: Mutex::new(None),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        self.pending_replay.lock().take();
    }

    pub(crate) fn has_pending_replay(&self) -> bool {
        self.pending_replay.lock().is_some()
    }

    /// Delivers the pending replay, if it is still there.
    pub(crate) fn flush_replay(&self) {
        if !self.is_active() {
            return;
        }
        let _serial = self.serial.lock();
        let pending = self.pending_replay.lock().take();
        if let Some(env) = pending {
            if self.is_active() {
                invoke(self.listener.as_ref(), &env);
            }
        }
    }

    /// Delivers a live envelope, preceded by the pending replay if any.
    fn deliver(&self, env: &Envelope<T>) {
        if !self.is_active() {
            return;
        }
        let _serial = self.serial.lock();
        let pending = self.pending_replay.lock().take();
        if let Some(replay) = pending {
            // The live envelope is the very one that was cached: deliver it once.
            if replay.seq() != env.seq() && self.is_active() {
                invoke(self.listener.as_ref(), &replay);
            }
        }
        if self.is_active() {
            invoke(self.listener.as_ref(), env);
        }
    }
}

/// Calls the listener, routing a returned error or a panic to its `on_error`.
fn invoke<T: 'static>(listener: &dyn Subscribe<T>, env: &Envelope<T>) {
    let err = match catch_unwind(AssertUnwindSafe(|| listener.on_envelope(env))) {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err,
        Err(panic) => ListenerError::Panicked {
            info: panic_message(panic.as_ref()),
        },
    };

    tracing::debug!(
        listener = listener.name(),
        status = %env.status(),
        error = %err,
        "listener failed"
    );

    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener.on_error(&err))) {
        tracing::warn!(
            listener = listener.name(),
            info = %panic_message(panic.as_ref()),
            "listener error handler panicked"
        );
    }
}

struct Entries<K, T> {
    by_key: HashMap<K, Vec<Arc<Subscriber<T>>>>,
    closed: bool,
}

/// Key → ordered subscribers.
pub(crate) struct Registry<K, T> {
    entries: Mutex<Entries<K, T>>,
    next_id: AtomicU64,
}

impl<K: EventKey, T: Clone + Send + Sync + 'static> Registry<K, T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Entries {
                by_key: HashMap::new(),
                closed: false,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends a subscriber for `key`.
    ///
    /// `replay` runs under the registry lock right after the subscriber is
    /// linked; whatever it returns becomes the subscriber's pending replay.
    /// Returns `None` once the registry has been closed by [`dispose_all`](Self::dispose_all).
    pub(crate) fn subscribe(
        &self,
        key: K,
        listener: Arc<dyn Subscribe<T>>,
        replay: impl FnOnce() -> Option<Envelope<T>>,
    ) -> Option<Arc<Subscriber<T>>> {
        let mut entries = self.entries.lock();
        if entries.closed {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sub = Arc::new(Subscriber::new(id, listener));
        entries.by_key.entry(key).or_default().push(Arc::clone(&sub));
        if let Some(env) = replay() {
            *sub.pending_replay.lock() = Some(env);
        }
        Some(sub)
    }

    /// Removes one subscriber. Idempotent: unknown ids are ignored.
    pub(crate) fn unsubscribe(&self, key: &K, id: u64) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            let Some(list) = entries.by_key.get_mut(key) else {
                return false;
            };
            let removed = list
                .iter()
                .position(|s| s.id() == id)
                .map(|idx| list.remove(idx));
            if list.is_empty() {
                entries.by_key.remove(key);
            }
            removed
        };
        match removed {
            Some(sub) => {
                sub.deactivate();
                true
            }
            None => false,
        }
    }

    /// Delivers `env` to a snapshot of `key`'s subscribers, in subscription order.
    pub(crate) fn notify(&self, key: &K, env: &Envelope<T>) {
        let snapshot = {
            let entries = self.entries.lock();
            match entries.by_key.get(key) {
                Some(list) => list.clone(),
                None => return,
            }
        };
        for sub in &snapshot {
            sub.deliver(env);
        }
    }

    /// Removes and deactivates every subscriber of `key`. Returns how many were removed.
    pub(crate) fn dispose_key(&self, key: &K) -> usize {
        let removed = self.entries.lock().by_key.remove(key).unwrap_or_default();
        for sub in &removed {
            sub.deactivate();
        }
        removed.len()
    }

    /// Removes every subscriber and refuses further subscriptions.
    pub(crate) fn dispose_all(&self) {
        let drained: Vec<Arc<Subscriber<T>>> = {
            let mut entries = self.entries.lock();
            entries.closed = true;
            entries.by_key.drain().flat_map(|(_, list)| list).collect()
        };
        for sub in &drained {
            sub.deactivate();
        }
    }

    /// Number of active subscribers for `key`.
    pub(crate) fn len(&self, key: &K) -> usize {
        self.entries
            .lock()
            .by_key
            .get(key)
            .map_or(0, |list| list.len())
    }
}
