//! # Envelope listeners.
//!
//! This module provides the [`Subscribe`] trait and its closure adapter
//! [`ListenerFn`].
//!
//! ## Architecture
//! ```text
//! emit(key, env) ──► LifecycleBus ──► registry entry for key
//!                                         │  (snapshot, subscription order)
//!                                         ├──► listener1.on_envelope(&env)
//!                                         │        └─ Err / panic ─► listener1.on_error()
//!                                         ├──► listener2.on_envelope(&env)
//!                                         └──► listenerN.on_envelope(&env)
//! ```
//!
//! ## Optional
//! - `logging` feature: [`LogWriter`] writes envelopes through `tracing`.

mod listener_fn;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

pub use listener_fn::ListenerFn;
pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
