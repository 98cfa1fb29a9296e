//! # Processor: the bus-owning processing unit.
//!
//! A [`Processor`] accepts events, runs a [`Handler`](crate::Handler) for each
//! of them under the configured [`Strategy`], and publishes every handled
//! event's lifecycle on its own [`LifecycleBus`], keyed by the event's
//! [`CorrelationId`].
//!
//! ## Architecture
//! ```text
//! submit(event) ──► Tracked{id, event} ──► mpsc queue ──► run loop
//!                                                          │
//!        ┌─────────────────────────────────────────────────┘
//!        ▼
//!   strategy ── Sequential  : start, wait for it to finish
//!            ├─ Concurrent  : start in its own task
//!            ├─ Restartable : abort running tasks, start
//!            └─ Droppable   : start only if nothing is running,
//!                             otherwise Started + Error(Canceled) + Completed
//!
//!   start(id, event):
//!     interceptor.wrap(id, event, || handler.handle(event, state) [+ deadline])
//!        ├─ Ok(state) ──► StateChannel::set ──► states() receivers
//!        └─ Err(e)    ──► on_error(id, &e)
//! ```
//!
//! ## Teardown
//! ```text
//! close():
//!   coordinator.close()  (no drive callback fires from here on)
//!   cancel token ──► run loop exits
//!                    ├─ in-flight tasks aborted  ──► Error(Canceled) + Completed
//!                    └─ queued submissions       ──► Started + Error(Canceled) + Completed
//!   bus.dispose()
//! ```

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::bus::LifecycleBus;
use crate::config::ProcessorConfig;
use crate::coordinator::Coordinator;
use crate::error::{HandlerError, SubmitError};
use crate::events::{CorrelationId, EventPayload, Tracked};
use crate::processor::handler::{HandlerRef, StateStream};
use crate::processor::interceptor::LifecycleInterceptor;
use crate::processor::states::StateChannel;
use crate::processor::strategy::Strategy;

type ErrorHook = Arc<dyn Fn(CorrelationId, &HandlerError) + Send + Sync>;

/// Handle for submitting events to a processor.
pub struct ProcessorHandle<E> {
    tx: mpsc::Sender<Tracked<E>>,
}

impl<E> Clone for ProcessorHandle<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E> ProcessorHandle<E> {
    /// Submits an event (async, waits if the queue is full).
    pub async fn submit(&self, event: E) -> Result<CorrelationId, SubmitError> {
        self.submit_tracked(Tracked::new(event)).await
    }

    /// Submits an event without waiting (fails if the queue is full).
    pub fn try_submit(&self, event: E) -> Result<CorrelationId, SubmitError> {
        self.try_submit_tracked(Tracked::new(event))
    }

    /// Submits an event under a caller-chosen correlation id.
    pub async fn submit_tracked(&self, tracked: Tracked<E>) -> Result<CorrelationId, SubmitError> {
        let id = tracked.id();
        self.tx
            .send(tracked)
            .await
            .map_err(|_| SubmitError::Closed)?;
        Ok(id)
    }

    /// Non-waiting variant of [`submit_tracked`](Self::submit_tracked).
    pub fn try_submit_tracked(&self, tracked: Tracked<E>) -> Result<CorrelationId, SubmitError> {
        let id = tracked.id();
        self.tx.try_send(tracked).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })?;
        Ok(id)
    }

    /// Whether the processor stopped accepting events.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Builder for [`Processor`].
pub struct ProcessorBuilder<E, S> {
    name: Cow<'static, str>,
    initial: S,
    handler: HandlerRef<E, S>,
    cfg: ProcessorConfig,
    on_error: Option<ErrorHook>,
}

impl<E: EventPayload, S: Clone + Send + Sync + 'static> ProcessorBuilder<E, S> {
    /// Replaces the whole configuration.
    pub fn config(mut self, cfg: ProcessorConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the processing strategy.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.cfg.strategy = strategy;
        self
    }

    /// Sets the per-event timeout (`Duration::ZERO` = none).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.cfg.timeout = timeout;
        self
    }

    /// Hook called with every handler failure (timeouts included).
    ///
    /// Defaults to a `tracing::warn!` line.
    pub fn on_error(
        mut self,
        hook: impl Fn(CorrelationId, &HandlerError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Builds the processor and spawns its run loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Processor<E, S> {
        let name: Arc<str> = Arc::from(self.name.as_ref());
        let cfg = self.cfg;
        let (tx, rx) = mpsc::channel(cfg.queue_capacity_clamped());
        let bus = LifecycleBus::new(cfg.bus.clone());
        let state = Arc::new(StateChannel::new(self.initial, cfg.state_capacity_clamped()));
        let token = CancellationToken::new();

        let on_error: ErrorHook = match self.on_error {
            Some(hook) => hook,
            None => {
                let name = Arc::clone(&name);
                Arc::new(move |id: CorrelationId, err: &HandlerError| {
                    tracing::warn!(
                        processor = %name,
                        event = %id,
                        label = err.as_label(),
                        error = %err,
                        "handler failed"
                    );
                })
            }
        };

        let run_loop = RunLoop {
            name: Arc::clone(&name),
            strategy: cfg.strategy,
            token: token.clone(),
            worker: Worker {
                handler: self.handler,
                interceptor: LifecycleInterceptor::new(bus.clone()),
                state: Arc::clone(&state),
                timeout: cfg.event_timeout(),
                on_error,
            },
        };
        let join = tokio::spawn(run_loop.run(rx));

        Processor {
            inner: Arc::new(Inner {
                coordinator: Coordinator::new(Arc::clone(&name)),
                name,
                cfg,
                handle: ProcessorHandle { tx },
                state,
                bus,
                token,
                join: Mutex::new(Some(join)),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

struct Inner<E, S> {
    name: Arc<str>,
    cfg: ProcessorConfig,
    handle: ProcessorHandle<E>,
    state: Arc<StateChannel<S>>,
    bus: LifecycleBus<CorrelationId, E>,
    coordinator: Coordinator,
    token: CancellationToken,
    join: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<E, S> Drop for Inner<E, S> {
    fn drop(&mut self) {
        self.coordinator.close();
        self.token.cancel();
    }
}

/// Event-processing unit owning a lifecycle bus, a state channel and a coordinator.
///
/// Cheap to clone; clones drive the same run loop and any of them may
/// [`close`](Processor::close) it.
pub struct Processor<E, S> {
    inner: Arc<Inner<E, S>>,
}

impl<E, S> Clone for Processor<E, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: EventPayload, S: Clone + Send + Sync + 'static> Processor<E, S> {
    /// Starts building a processor named `name` with `initial` state.
    pub fn builder(
        name: impl Into<Cow<'static, str>>,
        initial: S,
        handler: HandlerRef<E, S>,
    ) -> ProcessorBuilder<E, S> {
        ProcessorBuilder {
            name: name.into(),
            initial,
            handler,
            cfg: ProcessorConfig::default(),
            on_error: None,
        }
    }

    /// Processor name (used in logs).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Effective configuration.
    pub fn config(&self) -> &ProcessorConfig {
        &self.inner.cfg
    }

    /// Returns a cloneable submission handle.
    pub fn handle(&self) -> ProcessorHandle<E> {
        self.inner.handle.clone()
    }

    /// Submits an event (async, waits if the queue is full).
    pub async fn submit(&self, event: E) -> Result<CorrelationId, SubmitError> {
        self.submit_tracked(Tracked::new(event)).await
    }

    /// Submits an event without waiting.
    pub fn try_submit(&self, event: E) -> Result<CorrelationId, SubmitError> {
        self.try_submit_tracked(Tracked::new(event))
    }

    /// Submits an event under a caller-chosen correlation id.
    pub async fn submit_tracked(&self, tracked: Tracked<E>) -> Result<CorrelationId, SubmitError> {
        if self.is_closed() {
            return Err(SubmitError::Closed);
        }
        self.inner.handle.submit_tracked(tracked).await
    }

    /// Non-waiting variant of [`submit_tracked`](Self::submit_tracked).
    pub fn try_submit_tracked(&self, tracked: Tracked<E>) -> Result<CorrelationId, SubmitError> {
        if self.is_closed() {
            return Err(SubmitError::Closed);
        }
        self.inner.handle.try_submit_tracked(tracked)
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> S {
        self.inner.state.get()
    }

    /// Receiver of states produced from now on.
    pub fn states(&self) -> broadcast::Receiver<S> {
        self.inner.state.subscribe()
    }

    /// Bus carrying the lifecycle of every handled event.
    pub fn bus(&self) -> &LifecycleBus<CorrelationId, E> {
        &self.inner.bus
    }

    /// Coordinator for driving other processors; closed together with this one.
    pub fn coordinator(&self) -> &Coordinator {
        &self.inner.coordinator
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Tears the processor down. Idempotent.
    ///
    /// Closes the coordinator first, so no drive callback runs against a
    /// closing processor. Then cancels in-flight and queued events (each still
    /// reports `Error(Canceled)` and `Completed`) and disposes the bus.
    /// Must not be awaited from inside this processor's own handler.
    pub async fn close(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        inner.coordinator.close();
        inner.token.cancel();

        let join = inner.join.lock().take();
        if let Some(join) = join {
            if let Err(err) = join.await {
                tracing::warn!(processor = %inner.name, error = %err, "run loop ended abnormally");
            }
        }

        inner.bus.dispose();
        tracing::debug!(processor = %inner.name, "processor closed");
    }
}

impl<E, S> fmt::Debug for Processor<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("name", &self.inner.name)
            .field("strategy", &self.inner.cfg.strategy)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Everything needed to run one event; cloned into every spawned task.
struct Worker<E, S> {
    handler: HandlerRef<E, S>,
    interceptor: LifecycleInterceptor<CorrelationId, E>,
    state: Arc<StateChannel<S>>,
    timeout: Option<Duration>,
    on_error: ErrorHook,
}

impl<E, S> Clone for Worker<E, S> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            interceptor: self.interceptor.clone(),
            state: Arc::clone(&self.state),
            timeout: self.timeout,
            on_error: Arc::clone(&self.on_error),
        }
    }
}

impl<E: EventPayload, S: Clone + Send + Sync + 'static> Worker<E, S> {
    /// Emits `Started` right away and returns the future driving the handler.
    fn start(&self, tracked: Tracked<E>) -> impl Future<Output = ()> + Send + use<E, S> {
        let (id, event) = tracked.into_parts();
        let handler = Arc::clone(&self.handler);
        let state = Arc::clone(&self.state);
        let timeout = self.timeout;

        let mut stream = self.interceptor.wrap(id, event.clone(), move || {
            let states = handler.handle(event, state.get());
            match timeout {
                Some(timeout) => with_deadline(states, timeout),
                None => states,
            }
        });

        let state = Arc::clone(&self.state);
        let on_error = Arc::clone(&self.on_error);
        async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(next) => state.set(next),
                    Err(err) => on_error(id, &err),
                }
            }
        }
    }

    /// Brackets an event that will never run (`Started`, `Error(Canceled)`, `Completed`).
    ///
    /// Used for submissions still queued at teardown and for events a busy
    /// `Droppable` processor turns away.
    fn abandon(&self, tracked: Tracked<E>) {
        drop(self.start(tracked));
    }
}

/// Yields `HandlerError::Timeout` and stops if `states` does not finish within `timeout`.
fn with_deadline<S: Send + 'static>(states: StateStream<S>, timeout: Duration) -> StateStream<S> {
    enum Step<S> {
        Item(Option<Result<S, HandlerError>>),
        Elapsed,
    }

    Box::pin(async_stream::stream! {
        let mut states = states;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            let step = tokio::select! {
                item = states.next() => Step::Item(item),
                _ = &mut deadline => Step::Elapsed,
            };
            match step {
                Step::Item(Some(item)) => yield item,
                Step::Item(None) => break,
                Step::Elapsed => {
                    yield Err(HandlerError::Timeout { timeout });
                    break;
                }
            }
        }
    })
}

struct RunLoop<E, S> {
    name: Arc<str>,
    strategy: Strategy,
    token: CancellationToken,
    worker: Worker<E, S>,
}

impl<E: EventPayload, S: Clone + Send + Sync + 'static> RunLoop<E, S> {
    async fn run(self, mut rx: mpsc::Receiver<Tracked<E>>) {
        let mut running: JoinSet<()> = JoinSet::new();
        tracing::debug!(
            processor = %self.name,
            strategy = self.strategy.as_label(),
            "processor started"
        );

        let senders_gone = loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break false,
                Some(res) = running.join_next(), if !running.is_empty() => self.reap(res),
                msg = rx.recv() => match msg {
                    Some(tracked) => self.dispatch(tracked, &mut running).await,
                    None => break true,
                },
            }
        };

        if senders_gone {
            // Nobody can submit anymore: let the running events finish.
            tokio::select! {
                _ = self.token.cancelled() => {}
                _ = self.drain(&mut running) => {}
            }
        }
        running.shutdown().await;

        rx.close();
        while let Ok(tracked) = rx.try_recv() {
            self.worker.abandon(tracked);
        }
        tracing::debug!(processor = %self.name, "processor stopped");
    }

    async fn dispatch(&self, tracked: Tracked<E>, running: &mut JoinSet<()>) {
        match self.strategy {
            Strategy::Concurrent => {
                running.spawn(self.worker.start(tracked));
            }
            Strategy::Sequential => {
                running.spawn(self.worker.start(tracked));
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = self.drain(running) => {}
                }
            }
            Strategy::Restartable => {
                if !running.is_empty() {
                    tracing::debug!(processor = %self.name, event = %tracked.id(), "restarting");
                    running.abort_all();
                }
                running.spawn(self.worker.start(tracked));
            }
            Strategy::Droppable => {
                while let Some(res) = running.try_join_next() {
                    self.reap(res);
                }
                if running.is_empty() {
                    running.spawn(self.worker.start(tracked));
                } else {
                    tracing::debug!(processor = %self.name, event = %tracked.id(), "busy, event dropped");
                    self.worker.abandon(tracked);
                }
            }
        }
    }

    async fn drain(&self, running: &mut JoinSet<()>) {
        while let Some(res) = running.join_next().await {
            self.reap(res);
        }
    }

    fn reap(&self, res: Result<(), JoinError>) {
        if let Err(err) = res {
            if err.is_panic() {
                tracing::warn!(processor = %self.name, error = %err, "handler panicked");
            }
        }
    }
}
