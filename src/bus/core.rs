//! # Lifecycle event bus.
//!
//! [`LifecycleBus`] combines the subscription registry, the last-value cache and
//! the dedup window behind one façade.
//!
//! ## Architecture
//! ```text
//! emit(key, payload, status, error?)
//!     │
//!     ├─ disposed? ───────────────► EmitOutcome::Disposed   (debug log)
//!     ├─ dedup.should_suppress ───► EmitOutcome::Suppressed (no cache, no notify)
//!     └─ cache.record_if_replayable(key, env)               (Started is skipped)
//!        registry.notify(key, env) ───► EmitOutcome::Delivered
//!
//! listen(key, on_data)
//!     │
//!     ├─ registry.subscribe(key, listener, || cache.get(key))
//!     │        └─ cached envelope → subscriber's pending replay
//!     └─ spawn(flush_replay)  (inline when there is no tokio runtime)
//! ```
//!
//! ## Rules
//! - A pending replay reaches its subscriber exactly once, and before any live
//!   envelope emitted after the subscription.
//! - A subscriber never sees `Started` as a replay.
//! - After [`dispose`](LifecycleBus::dispose) returns no callback begins; later
//!   `emit`/`listen` calls are no-ops.
//! - Background work (dedup eviction, replay delivery) holds only weak state or
//!   observes the bus token, so it is safe to fire after disposal.
//!
//! ## Example
//! ```rust
//! use eventvisor::{LifecycleBus, EmitOutcome, Status};
//!
//! let bus: LifecycleBus<&str, u32> = LifecycleBus::default();
//! let sub = bus.listen("answer", |env| {
//!     println!("{} is {}", env.payload(), env.status());
//!     Ok(())
//! });
//!
//! assert_eq!(bus.emit("answer", 42, Status::Success, None), EmitOutcome::Delivered);
//! assert_eq!(bus.emit("answer", 42, Status::Success, None), EmitOutcome::Suppressed);
//!
//! sub.unsubscribe();
//! bus.dispose();
//! assert_eq!(bus.emit("answer", 7, Status::Success, None), EmitOutcome::Disposed);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

use super::cache::LastValueCache;
use super::dedup::DedupWindow;
use super::registry::{Registry, Subscriber};
use super::subscription::Subscription;
use crate::config::{BusConfig, CachePolicy};
use crate::error::ListenerError;
use crate::events::{Envelope, ErrorRef, EventKey, EventPayload, Status};
use crate::listeners::{ListenerFn, Subscribe};

/// Result of an emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Cached (unless `Started`) and delivered to the key's current listeners.
    Delivered,
    /// Dropped by the dedup window: nothing cached, nobody notified.
    Suppressed,
    /// The bus was disposed; nothing happened.
    Disposed,
}

struct Shared<K, T> {
    cfg: BusConfig,
    registry: Arc<Registry<K, T>>,
    cache: LastValueCache<K, T>,
    dedup: DedupWindow<K, T>,
    disposed: AtomicBool,
    token: CancellationToken,
}

impl<K, T> Drop for Shared<K, T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Keyed publish/subscribe bus carrying lifecycle envelopes.
///
/// Cheap to clone: clones share the same registry, cache and dedup state.
pub struct LifecycleBus<K, T> {
    inner: Arc<Shared<K, T>>,
}

impl<K, T> Clone for LifecycleBus<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: EventKey, T: EventPayload> Default for LifecycleBus<K, T> {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl<K: EventKey, T: EventPayload> LifecycleBus<K, T> {
    /// Creates a bus with the given configuration.
    pub fn new(cfg: BusConfig) -> Self {
        let cache = LastValueCache::new(cfg.cache_limit());
        let dedup = DedupWindow::new(cfg.dedup_window(), cfg.equality);
        Self {
            inner: Arc::new(Shared {
                cfg,
                registry: Arc::new(Registry::new()),
                cache,
                dedup,
                disposed: AtomicBool::new(false),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Returns the bus configuration.
    pub fn config(&self) -> &BusConfig {
        &self.inner.cfg
    }

    /// Builds an envelope and emits it under `key`.
    pub fn emit(&self, key: K, payload: T, status: Status, error: Option<ErrorRef>) -> EmitOutcome {
        let env = Envelope::new(payload, status);
        let env = match error {
            Some(err) => env.with_error(err),
            None => env,
        };
        self.emit_envelope(key, env)
    }

    /// Emits a prepared envelope under `key`.
    pub fn emit_envelope(&self, key: K, env: Envelope<T>) -> EmitOutcome {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::Acquire) {
            tracing::debug!(status = %env.status(), "emit on disposed bus ignored");
            return EmitOutcome::Disposed;
        }
        if inner.dedup.should_suppress(&key, &env, &inner.token) {
            tracing::debug!(status = %env.status(), seq = env.seq(), "duplicate emission suppressed");
            return EmitOutcome::Suppressed;
        }
        inner.cache.record_if_replayable(key.clone(), &env);
        inner.registry.notify(&key, &env);
        EmitOutcome::Delivered
    }

    /// Registers a closure listener for `key`.
    ///
    /// If an envelope is cached for `key` it is replayed to this listener
    /// alone, asynchronously, before any envelope emitted afterwards.
    pub fn listen<F>(&self, key: K, on_data: F) -> Subscription<K, T>
    where
        F: Fn(&Envelope<T>) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.subscribe(key, ListenerFn::arc::<T>("listen", on_data))
    }

    /// Like [`listen`](Self::listen), routing listener failures to `on_error`.
    pub fn listen_with_error<F, E>(&self, key: K, on_data: F, on_error: E) -> Subscription<K, T>
    where
        F: Fn(&Envelope<T>) -> Result<(), ListenerError> + Send + Sync + 'static,
        E: Fn(&ListenerError) + Send + Sync + 'static,
    {
        let listener = ListenerFn::new::<T>("listen", on_data).with_error_handler(on_error);
        self.subscribe(key, Arc::new(listener))
    }

    /// Registers a [`Subscribe`] implementation for `key`.
    pub fn subscribe(&self, key: K, listener: Arc<dyn Subscribe<T>>) -> Subscription<K, T> {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::Acquire) {
            tracing::debug!(listener = listener.name(), "listen on disposed bus ignored");
            return Subscription::inert(key);
        }

        let cache = &inner.cache;
        let replay_key = key.clone();
        let Some(sub) = inner
            .registry
            .subscribe(key.clone(), listener, || cache.get(&replay_key))
        else {
            tracing::debug!("listen raced with dispose, subscription is inert");
            return Subscription::inert(key);
        };

        if sub.has_pending_replay() {
            self.schedule_replay(Arc::clone(&sub));
        }
        Subscription::new(key, sub, &inner.registry)
    }

    fn schedule_replay(&self, sub: Arc<Subscriber<T>>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let token = self.inner.token.clone();
                handle.spawn(async move {
                    if !token.is_cancelled() {
                        sub.flush_replay();
                    }
                });
            }
            Err(_) => sub.flush_replay(),
        }
    }

    /// Removes every listener of `key`. Returns how many were removed.
    ///
    /// The cached envelope is kept or dropped according to
    /// [`BusConfig::cache_on_remove`].
    pub fn remove_listeners(&self, key: &K) -> usize {
        let removed = self.inner.registry.dispose_key(key);
        if self.inner.cfg.cache_on_remove == CachePolicy::Clear {
            self.inner.cache.clear(key);
        }
        removed
    }

    /// Drops the cached envelope of `key`.
    pub fn clear_cache(&self, key: &K) {
        self.inner.cache.clear(key);
    }

    /// Returns the envelope a new listener of `key` would be replayed.
    pub fn cached(&self, key: &K) -> Option<Envelope<T>> {
        self.inner.cache.get(key)
    }

    /// Number of listeners currently registered for `key`.
    pub fn listener_count(&self, key: &K) -> usize {
        self.inner.registry.len(key)
    }

    /// Tears the bus down: cancels background work and drops every listener,
    /// cached envelope and dedup entry. Idempotent.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        inner.token.cancel();
        inner.registry.dispose_all();
        inner.cache.clear_all();
        inner.dedup.clear();
        tracing::debug!("lifecycle bus disposed");
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl<K, T> fmt::Debug for LifecycleBus<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleBus")
            .field("config", &self.inner.cfg)
            .field("disposed", &self.inner.disposed.load(Ordering::Relaxed))
            .finish()
    }
}
