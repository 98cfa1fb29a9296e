//! # Lifecycle event bus.
//!
//! - [`LifecycleBus`] the public façade (`emit`, `listen`, `remove_listeners`, `dispose`)
//! - [`Subscription`] handle returned by `listen`/`subscribe`
//! - [`EmitOutcome`] what happened to an emission
//!
//! Internal building blocks: the subscription registry, the last-value cache
//! and the dedup window. None of them is shared between bus instances.

mod cache;
mod core;
mod dedup;
mod registry;
mod subscription;

pub use self::core::{EmitOutcome, LifecycleBus};
pub use subscription::Subscription;
