//! Lifecycle envelopes and routing identities.
//!
//! ## Contents
//! - [`Status`], [`Envelope`] lifecycle status and the immutable envelope value
//! - [`EventKey`], [`EventPayload`] bounds; [`CorrelationId`], [`Tracked`] routing keys
//!
//! Envelopes are produced by the lifecycle interceptor (or by direct `emit`
//! calls) and routed by key through the [`LifecycleBus`](crate::LifecycleBus).

mod envelope;
mod key;

pub use envelope::{Envelope, ErrorRef, Status};
pub use key::{CorrelationId, EventKey, EventPayload, Tracked};
