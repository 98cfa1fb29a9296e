//! # eventvisor
//!
//! **Eventvisor** is a lifecycle-aware event bus for async Rust.
//!
//! Every event handled by a [`Processor`] is wrapped in status envelopes
//! (`Started → Success | Error → Completed`) and broadcast, keyed by the event's
//! [`CorrelationId`], to the listeners of the processor's [`LifecycleBus`].
//! Late listeners receive the most recent replayable envelope, identical
//! back-to-back emissions are suppressed, and a [`Coordinator`] lets one
//! processor drive another and react when its event completes.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   submit(event)                                   drive(target, event, on_completed)
//!        │                                                         │
//!        ▼                                                         ▼
//! ┌──────────────────────────────────────┐        ┌──────────────────────────────┐
//! │  Processor                           │        │  Coordinator (of another     │
//! │  - mpsc queue ─► run loop (Strategy) │◄───────┤  processor)                  │
//! │  - Handler ─► StateStream ─► state   │ submit │  listens on target bus by id │
//! │  - LifecycleInterceptor              │        └──────────────▲───────────────┘
//! └──────────────┬───────────────────────┘                       │ Completed
//!                │ Started / Success | Error / Completed         │
//!                ▼                                               │
//! ┌──────────────────────────────────────────────────────────────┴───────────────┐
//! │  LifecycleBus<CorrelationId, E>                                              │
//! │  - DedupWindow     (suppress identical emissions within the window)          │
//! │  - LastValueCache  (latest non-Started envelope per key, replayed on listen) │
//! │  - Registry        (key → ordered subscribers, snapshot notify)              │
//! └──────────────┬─────────────────────┬─────────────────────┬───────────────────┘
//!                ▼                     ▼                     ▼
//!          listener1.on_envelope  listener2.on_envelope  listenerN.on_envelope
//! ```
//!
//! ### Lifecycle of one event
//! ```text
//! Idle ──► Started ──► Success ──► Completed
//!              │                      ▲
//!              ├──► Error(e) ─────────┤
//!              └──► (dropped) ──► Error(Canceled)
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Envelopes**     | Immutable payload + status values, routing identities.       | [`Envelope`], [`Status`], [`CorrelationId`] |
//! | **Bus**           | Keyed pub/sub with replay, dedup and disposal.               | [`LifecycleBus`], [`Subscription`]          |
//! | **Listeners**     | Closure or trait-object listeners with error routing.        | [`Subscribe`], [`ListenerFn`]               |
//! | **Processing**    | Strategy-driven handler pipeline with observable state.      | [`Processor`], [`Handler`], [`Strategy`]    |
//! | **Coordination**  | Drive another processor and react to its completion.         | [`Coordinator`], [`Completion`]             |
//! | **Errors**        | Typed errors for listeners, handlers and submission.         | [`ListenerError`], [`HandlerError`]         |
//! | **Configuration** | Dedup window, cache and queue settings.                      | [`BusConfig`], [`ProcessorConfig`]          |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] listener _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use eventvisor::{HandlerError, HandlerFn, Processor, Status, Strategy};
//! use futures::stream;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let counter = Processor::builder(
//!         "counter",
//!         0u64,
//!         HandlerFn::arc("add", |by: u64, total: u64| {
//!             stream::iter([Ok::<_, HandlerError>(total + by)])
//!         }),
//!     )
//!     .strategy(Strategy::Sequential)
//!     .build();
//!
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     let id = eventvisor::CorrelationId::next();
//!     counter.bus().listen(id, move |env| {
//!         let _ = tx.send(env.status());
//!         Ok(())
//!     });
//!     counter.submit_tracked(eventvisor::Tracked::with_id(id, 5)).await?;
//!
//!     assert_eq!(rx.recv().await, Some(Status::Started));
//!     assert_eq!(rx.recv().await, Some(Status::Success));
//!     assert_eq!(rx.recv().await, Some(Status::Completed));
//!     assert_eq!(counter.state(), 5);
//!
//!     counter.close().await;
//!     Ok(())
//! }
//! ```
mod bus;
mod config;
mod coordinator;
mod error;
mod events;
mod listeners;
mod processor;

// ---- Public re-exports ----

pub use bus::{EmitOutcome, LifecycleBus, Subscription};
pub use config::{BusConfig, CachePolicy, EqualityPolicy, ProcessorConfig};
pub use coordinator::{Completion, Coordinator};
pub use error::{HandlerError, ListenerError, SubmitError};
pub use events::{CorrelationId, Envelope, ErrorRef, EventKey, EventPayload, Status, Tracked};
pub use listeners::{ListenerFn, Subscribe};
pub use processor::{
    Handler, HandlerFn, HandlerRef, LifecycleInterceptor, Processor, ProcessorBuilder,
    ProcessorHandle, StateStream, Strategy,
};

// Optional: expose a simple built-in logger listener (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use listeners::LogWriter;
