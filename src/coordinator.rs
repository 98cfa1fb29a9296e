//! # Cross-processor coordinator.
//!
//! A [`Coordinator`] lets one processor drive another: it submits an event to a
//! target [`Processor`], watches the target's bus for that event's `Completed`
//! envelope and then calls back exactly once.
//!
//! ## Architecture
//! ```text
//! drive(target, event, on_completed)
//!   ├─ closed? ──────────────────────────► Err(SubmitError::Closed)
//!   ├─ stale registration for id? ───────► cancel it, clear target cache for id
//!   ├─ register pending[id] = ticket
//!   ├─ target.bus().listen(id, watch)
//!   │        ├─ Success / Error ──► remember as terminal
//!   │        └─ Completed ───────► unsubscribe, release pending[id]
//!   │                               └─ not closed ──► on_completed(Completion)
//!   └─ target.submit_tracked(id, event)
//!            └─ Err ──► release pending[id], unsubscribe, return error
//! ```
//!
//! ## Rules
//! - One registration per correlation id: a reused id replaces the stale
//!   registration instead of adding a second one.
//! - `close()` cancels every pending registration; no callback starts afterwards.
//! - `on_completed` runs inside the target's bus notification. Keep it short
//!   and hand async work to a task or a [`ProcessorHandle`](crate::ProcessorHandle).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::bus::Subscription;
use crate::error::SubmitError;
use crate::events::{CorrelationId, Envelope, ErrorRef, EventPayload, Status, Tracked};
use crate::processor::Processor;

/// Outcome of a driven event, handed to the `on_completed` callback.
#[derive(Clone, Debug)]
pub struct Completion<E> {
    id: CorrelationId,
    terminal: Option<Envelope<E>>,
    completed: Envelope<E>,
}

impl<E> Completion<E> {
    /// Correlation id of the driven event.
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// The driven event.
    pub fn event(&self) -> &E {
        self.completed.payload()
    }

    /// The `Success` or `Error` envelope seen before `Completed`, if any.
    pub fn terminal(&self) -> Option<&Envelope<E>> {
        self.terminal.as_ref()
    }

    /// The `Completed` envelope.
    pub fn completed(&self) -> &Envelope<E> {
        &self.completed
    }

    /// Whether the event finished with `Success`.
    pub fn is_success(&self) -> bool {
        self.terminal
            .as_ref()
            .is_some_and(|env| env.status() == Status::Success)
    }

    /// Error carried by the terminal envelope, if it was an `Error`.
    pub fn error(&self) -> Option<&ErrorRef> {
        self.terminal.as_ref().and_then(|env| env.error_ref())
    }

    /// Consumes the completion and returns the driven event.
    pub fn into_event(self) -> E {
        self.completed.into_payload()
    }
}

/// One pending drive.
struct Pending {
    ticket: u64,
    cancel: Box<dyn FnOnce() + Send>,
}

struct Shared {
    name: Arc<str>,
    token: CancellationToken,
    pending: Mutex<HashMap<CorrelationId, Pending>>,
    tickets: AtomicU64,
}

impl Shared {
    /// Removes the registration for `id` if it still belongs to `ticket`.
    fn release(&self, id: CorrelationId, ticket: u64) -> Option<Pending> {
        let mut pending = self.pending.lock();
        match pending.get(&id) {
            Some(p) if p.ticket == ticket => pending.remove(&id),
            _ => None,
        }
    }
}

/// Per-drive state shared by the bus listener and the cancel hook.
struct Watch<E, F> {
    on_completed: Mutex<Option<F>>,
    terminal: Mutex<Option<Envelope<E>>>,
    subscription: Mutex<Option<Subscription<CorrelationId, E>>>,
}

impl<E: EventPayload, F> Watch<E, F> {
    fn disarm(&self) {
        self.on_completed.lock().take();
        self.unsubscribe();
    }

    fn unsubscribe(&self) {
        let sub = self.subscription.lock().take();
        if let Some(sub) = sub {
            sub.unsubscribe();
        }
    }
}

/// Drives events into other processors and reacts to their completion.
///
/// Cheap to clone; clones share the same pending registrations.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Shared>,
}

impl Coordinator {
    /// Creates a coordinator; `name` is used in logs.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            inner: Arc::new(Shared {
                name: name.into(),
                token: CancellationToken::new(),
                pending: Mutex::new(HashMap::new()),
                tickets: AtomicU64::new(1),
            }),
        }
    }

    /// Coordinator name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Submits `event` to `target` and calls `on_completed` once it completes.
    pub async fn drive<E, S, F>(
        &self,
        target: &Processor<E, S>,
        event: E,
        on_completed: F,
    ) -> Result<CorrelationId, SubmitError>
    where
        E: EventPayload,
        S: Clone + Send + Sync + 'static,
        F: FnOnce(Completion<E>) + Send + 'static,
    {
        self.drive_tracked(target, Tracked::new(event), on_completed)
            .await
    }

    /// Like [`drive`](Self::drive), under a caller-chosen correlation id.
    ///
    /// If a drive for the same id is still pending it is cancelled first and
    /// the target's cached envelope for the id is cleared.
    pub async fn drive_tracked<E, S, F>(
        &self,
        target: &Processor<E, S>,
        tracked: Tracked<E>,
        on_completed: F,
    ) -> Result<CorrelationId, SubmitError>
    where
        E: EventPayload,
        S: Clone + Send + Sync + 'static,
        F: FnOnce(Completion<E>) + Send + 'static,
    {
        if self.is_closed() {
            return Err(SubmitError::Closed);
        }
        let id = tracked.id();

        let stale = self.inner.pending.lock().remove(&id);
        if let Some(stale) = stale {
            tracing::debug!(coordinator = %self.inner.name, event = %id, "replacing stale registration");
            (stale.cancel)();
        }
        target.bus().clear_cache(&id);

        let ticket = self.inner.tickets.fetch_add(1, Ordering::Relaxed);
        let watch = Arc::new(Watch {
            on_completed: Mutex::new(Some(on_completed)),
            terminal: Mutex::new(None),
            subscription: Mutex::new(None),
        });

        let cancel_watch = Arc::clone(&watch);
        self.inner.pending.lock().insert(
            id,
            Pending {
                ticket,
                cancel: Box::new(move || cancel_watch.disarm()),
            },
        );

        let shared = Arc::downgrade(&self.inner);
        let listener_watch = Arc::clone(&watch);
        let sub = target.bus().listen(id, move |env| {
            let watch = &listener_watch;
            if env.status().is_terminal() {
                *watch.terminal.lock() = Some(env.clone());
            }
            if env.status() != Status::Completed {
                return Ok(());
            }
            let Some(callback) = watch.on_completed.lock().take() else {
                return Ok(());
            };
            watch.unsubscribe();

            let Some(shared) = shared.upgrade() else {
                return Ok(());
            };
            shared.release(id, ticket);
            if shared.token.is_cancelled() {
                return Ok(());
            }
            let terminal = watch.terminal.lock().take();
            callback(Completion {
                id,
                terminal,
                completed: env.clone(),
            });
            Ok(())
        });

        {
            let mut slot = watch.subscription.lock();
            if watch.on_completed.lock().is_some() {
                *slot = Some(sub);
            } else {
                drop(slot);
                sub.unsubscribe();
            }
        }

        // `close` may have drained the map before this registration landed.
        if self.is_closed() {
            if let Some(p) = self.inner.release(id, ticket) {
                (p.cancel)();
            }
            return Err(SubmitError::Closed);
        }

        match target.submit_tracked(tracked).await {
            Ok(id) => Ok(id),
            Err(err) => {
                if let Some(p) = self.inner.release(id, ticket) {
                    (p.cancel)();
                }
                tracing::debug!(
                    coordinator = %self.inner.name,
                    event = %id,
                    error = err.as_label(),
                    "drive rejected by target"
                );
                Err(err)
            }
        }
    }

    /// Cancels every pending drive. Idempotent.
    pub fn close(&self) {
        self.inner.token.cancel();
        let drained: Vec<Pending> = self
            .inner
            .pending
            .lock()
            .drain()
            .map(|(_, p)| p)
            .collect();
        if !drained.is_empty() {
            tracing::debug!(
                coordinator = %self.inner.name,
                cancelled = drained.len(),
                "pending drives cancelled"
            );
        }
        for p in drained {
            (p.cancel)();
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Number of drives waiting for `Completed`.
    pub fn in_flight(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("name", &self.inner.name)
            .field("in_flight", &self.in_flight())
            .field("closed", &self.is_closed())
            .finish()
    }
}
